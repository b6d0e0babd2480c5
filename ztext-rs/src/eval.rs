//! The evaluator.
//!
//! Walks an element chain and renders it to a string.  Text elements render
//! after escape removal, Command elements dispatch to the registry, and
//! Variable elements follow the two-phase rule: an element with an
//! assignment body evaluates the body, deep-copies it into the cache, and
//! yields the evaluated value; a bare reference re-evaluates whatever the
//! cache currently holds.  Because the cached body is re-evaluated on every
//! reference, a variable whose body mentions another variable resolves
//! against that variable's value at expansion time, not at assignment time.
//!
//! Evaluation never fails: unknown commands and unknown variables render as
//! the empty string.

use crate::context::VariableEntry;
use crate::element::{ElementId, ElementKind};
use crate::scan;
use crate::ZText;

/// Variable expansion nested deeper than this yields the empty string.
/// Bounds self-referential and mutually recursive bodies, which are
/// syntactically valid.
const MAX_EVAL_DEPTH: usize = 64;

impl ZText {
    /// Render the chain starting at `head` through its last sibling.
    pub fn eval(&mut self, head: ElementId) -> String {
        self.eval_chain(head, true)
    }

    /// Render a single element, ignoring its siblings.
    pub fn eval_one(&mut self, element: ElementId) -> String {
        self.eval_chain(element, false)
    }

    fn eval_chain(&mut self, head: ElementId, to_end: bool) -> String {
        let mut output = String::new();
        let mut current = Some(head);
        while let Some(id) = current {
            let kind = match self.pool.get(id) {
                Some(element) => element.kind,
                None => break,
            };
            match kind {
                ElementKind::Text => {
                    if let Some(element) = self.pool.get(id) {
                        output.push_str(&scan::unescape(&element.text));
                    }
                }
                ElementKind::Variable => output.push_str(&self.eval_variable(id)),
                ElementKind::Command => output.push_str(&self.eval_command(id)),
            }
            if !to_end {
                break;
            }
            current = self.pool.next(id);
        }
        output
    }

    fn eval_variable(&mut self, element: ElementId) -> String {
        let (name, body) = match self.pool.get(element) {
            Some(e) => (e.text.clone(), e.child),
            None => return String::new(),
        };
        if self.eval_depth >= MAX_EVAL_DEPTH {
            return String::new();
        }
        self.eval_depth += 1;

        let value = match body {
            // Inline assignment: evaluate, then cache a copy of the body.
            Some(body) => {
                let value = self.eval_chain(body, true);
                if let Ok(copy) = self.pool.copy_chain(body) {
                    let old = self.variables.insert(
                        name,
                        VariableEntry {
                            chain: copy,
                            read_only: false,
                        },
                    );
                    if let Some(entry) = old {
                        let _ = self.pool.destroy_all(entry.chain);
                    }
                }
                value
            }
            // Bare reference: re-evaluate the cached body.
            None => match self.variables.get(&name) {
                Some(entry) => {
                    let chain = entry.chain;
                    self.eval_chain(chain, true)
                }
                None => String::new(),
            },
        };

        self.eval_depth -= 1;
        value
    }

    fn eval_command(&mut self, element: ElementId) -> String {
        let name = match self.pool.get(element) {
            Some(e) => e.text.clone(),
            None => return String::new(),
        };
        match self.commands.get(&name) {
            Some(callback) => {
                let callback = callback.clone();
                callback(self, element)
            }
            None => {
                tracing::debug!(command = %name, "command not registered, rendering empty");
                String::new()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn render(ctx: &mut ZText, source: &str) -> String {
        let head = ctx.parse(source).unwrap();
        ctx.eval(head)
    }

    #[test]
    fn text_renders_cleaned() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "X\tY  Z"), "X Y Z");
    }

    #[test]
    fn text_renders_unescaped() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, r"foo \{{token\}} bar"), "foo {{token}} bar");
    }

    #[test]
    fn assignment_yields_value_and_caches() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "{{var$ foo}}"), "foo");
        let cached = ctx.variable("var").unwrap();
        assert_eq!(ctx.eval(cached), "foo");
    }

    #[test]
    fn reference_reads_cache() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "{{var$ abc}}{{var$}}{{var$}}"), "abcabcabc");
    }

    #[test]
    fn missing_variable_is_empty() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "a{{nothing$}}b"), "ab");
    }

    #[test]
    fn chained_variable_bodies() {
        let mut ctx = ZText::new();
        assert_eq!(
            render(&mut ctx, "{{var$ abc}}{{foo$ {{var$}} }}{{bar$ {{foo$}} }}"),
            "abcabcabc"
        );
    }

    #[test]
    fn cached_bodies_resolve_dynamically() {
        let mut ctx = ZText::new();
        let source = "{{ name$ Billy Bob }} lives at {{ place$ {{name$}}'s House }}. \
                      {{ name$ Johnny Ray }} lives at {{ place$ }}.";
        assert_eq!(
            render(&mut ctx, source),
            "Billy Bob lives at Billy Bob's House. \
             Johnny Ray lives at Johnny Ray's House."
        );
    }

    #[test]
    fn command_receives_properties_and_content() {
        let mut ctx = ZText::new();
        ctx.command_set("cmd", |ctx, element| {
            let foo = ctx
                .element_command_property(element)
                .ok()
                .and_then(|map| map.get("foo").cloned())
                .unwrap_or_default();
            let content = match ctx.element_command_content(element) {
                Ok(Some(child)) => ctx.eval(child),
                _ => String::new(),
            };
            format!("|{foo}|--{content}--")
        });
        assert_eq!(render(&mut ctx, "{{cmd(foo=bar) hi}}"), "|bar|--hi--");
    }

    #[test]
    fn missing_command_is_empty() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "a{{ghost}}b"), "ab");
    }

    #[test]
    fn erased_command_renders_empty() {
        let mut ctx = ZText::new();
        ctx.command_set("mark", |_, _| "X".to_owned());
        assert_eq!(render(&mut ctx, "a{{mark}}b"), "aXb");
        ctx.command_erase("mark");
        assert_eq!(render(&mut ctx, "a{{mark}}b"), "ab");
        ctx.command_erase("mark");
    }

    #[test]
    fn eval_one_stops_at_first_element() {
        let mut ctx = ZText::new();
        let head = ctx.parse("one {{var$ two}}").unwrap();
        assert_eq!(ctx.eval_one(head), "one ");
        assert_eq!(ctx.eval(head), "one two");
    }

    #[test]
    fn recursive_variable_terminates_empty() {
        let mut ctx = ZText::new();
        assert_eq!(render(&mut ctx, "{{a$ {{a$}}}}"), "");
        assert_eq!(render(&mut ctx, "{{a$}}"), "");
    }

    #[test]
    fn mutually_recursive_variables_terminate() {
        let mut ctx = ZText::new();
        render(&mut ctx, "{{a$ {{b$}}}}");
        render(&mut ctx, "{{b$ {{a$}}}}");
        assert_eq!(render(&mut ctx, "x{{a$}}y"), "xy");
    }

    #[test]
    fn builder_trees_evaluate() {
        let mut ctx = ZText::new();
        let head = ctx.element_text_create("Hello, ");
        let var = ctx.element_variable_create("who").unwrap();
        ctx.element_append(head, var).unwrap();
        let body = ctx.element_text_create("World");
        ctx.variable_set("who", body, false).unwrap();
        assert_eq!(ctx.eval(head), "Hello, World");
    }

    #[test]
    fn reassignment_replaces_cached_body() {
        let mut ctx = ZText::new();
        render(&mut ctx, "{{v$ first}}");
        render(&mut ctx, "{{v$ second}}");
        assert_eq!(render(&mut ctx, "{{v$}}"), "second");
    }
}
