//! The evaluation context.
//!
//! [`ZText`] owns everything a document needs: the element arena, the
//! variable cache (name to owned body chain), and the command registry
//! (name to host callback).  Parsed and builder-built trees live in the
//! arena and stay valid until destroyed or until the `ZText` value is
//! dropped; [`ZText::clear`] resets the cache and registry without touching
//! host-owned trees.
//!
//! A `ZText` is single-threaded.  Distinct contexts are independent and may
//! be used from different threads as long as no element id crosses between
//! them.

use std::collections::HashMap;
use std::rc::Rc;

use crate::element::{ElementId, ElementKind, ElementPool, PropertyMap};
use crate::error::{ParseError, ZTextError};
use crate::parse;

/// A registered command callback.
///
/// Invoked with the context and the Command element being rendered; the
/// callback may read the element's properties and content, evaluate the
/// content with [`ZText::eval`], and return the text to substitute.
pub type CommandFn = Rc<dyn Fn(&mut ZText, ElementId) -> String>;

pub(crate) struct VariableEntry {
    pub(crate) chain: ElementId,
    /// Accepted and recorded; reserved for a future revision.
    #[allow(dead_code)]
    pub(crate) read_only: bool,
}

/// A parsing and evaluation context.
#[derive(Default)]
pub struct ZText {
    pub(crate) pool: ElementPool,
    pub(crate) variables: HashMap<String, VariableEntry>,
    pub(crate) commands: HashMap<String, CommandFn>,
    pub(crate) eval_depth: usize,
}

impl ZText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroy every cached variable body and drop every registered
    /// command.  Trees owned by the host are untouched.
    pub fn clear(&mut self) {
        let chains: Vec<ElementId> = self.variables.drain().map(|(_, e)| e.chain).collect();
        for chain in chains {
            let _ = self.pool.destroy_all(chain);
        }
        self.commands.clear();
    }

    /// Number of live elements in this context's arena.  Tests use this as
    /// a leak check; it is also a cheap health metric for long-lived hosts.
    pub fn live_elements(&self) -> usize {
        self.pool.live_count()
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    /// Parse a document into an element chain owned by this context and
    /// return the head.  The caller owns the chain and is responsible for
    /// destroying it (or for handing it to the cache via
    /// [`ZText::variable_set`]).
    pub fn parse(&mut self, source: &str) -> Result<ElementId, ParseError> {
        if source.is_empty() {
            return Ok(self.pool.create_text(""));
        }
        parse::parse_chain(&mut self.pool, source, 0, source.len() - 1)
    }

    /// [`ZText::parse`] over the inclusive byte range `[begin, end]`.
    pub fn parse_range(
        &mut self,
        source: &str,
        begin: usize,
        end: usize,
    ) -> Result<ElementId, ParseError> {
        if source.is_empty() || begin > end || begin >= source.len() {
            return Ok(self.pool.create_text(""));
        }
        parse::parse_chain(&mut self.pool, source, begin, end.min(source.len() - 1))
    }

    // ── Variable cache ────────────────────────────────────────────────────────

    /// Head of the cached body chain for `name`, if any.
    pub fn variable(&self, name: &str) -> Option<ElementId> {
        self.variables.get(name).map(|entry| entry.chain)
    }

    /// Install `chain` as the canonical body for `name`, taking ownership.
    /// Any previous body is destroyed.  The chain must be unlinked; the
    /// `read_only` flag is recorded but currently has no semantics.
    pub fn variable_set(
        &mut self,
        name: &str,
        chain: ElementId,
        read_only: bool,
    ) -> Result<(), ZTextError> {
        self.pool.get(chain).ok_or(ZTextError::InvalidParameter)?;
        self.check_unlinked(chain)?;

        if let Some(old) = self.variables.remove(name) {
            let _ = self.pool.destroy_all(old.chain);
        }
        self.variables
            .insert(name.to_owned(), VariableEntry { chain, read_only });
        Ok(())
    }

    /// Remove and destroy the cached body for `name`.  Unknown names are a
    /// no-op.
    pub fn variable_erase(&mut self, name: &str) {
        if let Some(entry) = self.variables.remove(name) {
            let _ = self.pool.destroy_all(entry.chain);
        }
    }

    /// Destroy every cached variable body.
    pub fn variable_clear(&mut self) {
        let chains: Vec<ElementId> = self.variables.drain().map(|(_, e)| e.chain).collect();
        for chain in chains {
            let _ = self.pool.destroy_all(chain);
        }
    }

    /// Names of all cached variables, in no particular order.
    pub fn variable_list(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn check_unlinked(&self, chain: ElementId) -> Result<(), ZTextError> {
        if self.pool.prev(chain).is_some() {
            return Err(ZTextError::ElementInUse);
        }
        let mut current = Some(chain);
        while let Some(id) = current {
            if self.element_parent(id).is_some() {
                return Err(ZTextError::ElementInUse);
            }
            current = self.pool.next(id);
        }
        Ok(())
    }

    // ── Command registry ──────────────────────────────────────────────────────

    /// Register `callback` under `name`, replacing any previous
    /// registration.
    pub fn command_set<F>(&mut self, name: &str, callback: F)
    where
        F: Fn(&mut ZText, ElementId) -> String + 'static,
    {
        self.commands.insert(name.to_owned(), Rc::new(callback));
    }

    pub fn command_erase(&mut self, name: &str) {
        self.commands.remove(name);
    }

    pub fn command_clear(&mut self) {
        self.commands.clear();
    }

    // ── Element builders ──────────────────────────────────────────────────────

    pub fn element_text_create(&mut self, text: &str) -> ElementId {
        self.pool.create_text(text)
    }

    pub fn element_variable_create(&mut self, name: &str) -> Result<ElementId, ZTextError> {
        self.pool.create_variable(name)
    }

    pub fn element_command_create(&mut self, name: &str) -> Result<ElementId, ZTextError> {
        self.pool.create_command(name)
    }

    // ── Element linking ───────────────────────────────────────────────────────

    /// Splice `element` and anything chained after it in after `position`.
    pub fn element_append(
        &mut self,
        position: ElementId,
        element: ElementId,
    ) -> Result<(), ZTextError> {
        self.pool.append(position, element)
    }

    /// Splice `element` and anything chained after it in before `position`.
    pub fn element_insert(
        &mut self,
        position: ElementId,
        element: ElementId,
    ) -> Result<(), ZTextError> {
        self.pool.insert(position, element)
    }

    /// Detach `element` from its chain; its children travel with it.
    pub fn element_remove(&mut self, element: ElementId) -> Result<(), ZTextError> {
        self.pool.remove(element)
    }

    /// Destroy `element` and its whole subtree; returns the sibling that
    /// followed it so callers can keep iterating.
    pub fn element_destroy(&mut self, element: ElementId) -> Result<Option<ElementId>, ZTextError> {
        self.pool.destroy(element)
    }

    /// Destroy `head`, every sibling after it, and all their subtrees.
    pub fn element_destroy_all(&mut self, head: ElementId) -> Result<(), ZTextError> {
        self.pool.destroy_all(head)
    }

    // ── Element accessors ─────────────────────────────────────────────────────

    pub fn element_next(&self, element: ElementId) -> Option<ElementId> {
        self.pool.next(element)
    }

    pub fn element_prev(&self, element: ElementId) -> Option<ElementId> {
        self.pool.prev(element)
    }

    pub fn element_find_head(&self, element: ElementId) -> Option<ElementId> {
        self.pool.find_head(element)
    }

    pub fn element_find_tail(&self, element: ElementId) -> Option<ElementId> {
        self.pool.find_tail(element)
    }

    pub fn element_kind(&self, element: ElementId) -> Option<ElementKind> {
        self.pool.get(element).map(|e| e.kind)
    }

    /// The literal payload of a Text element, or the name of a Variable or
    /// Command element.
    pub fn element_text(&self, element: ElementId) -> Option<&str> {
        self.pool.get(element).map(|e| e.text.as_str())
    }

    pub fn element_child(&self, element: ElementId) -> Option<ElementId> {
        self.pool.get(element).and_then(|e| e.child)
    }

    pub fn element_parent(&self, element: ElementId) -> Option<ElementId> {
        self.pool.get(element).and_then(|e| e.parent)
    }

    /// Replace a Text element's payload.
    pub fn element_text_set(&mut self, element: ElementId, text: &str) -> Result<(), ZTextError> {
        let e = self
            .pool
            .get_mut(element)
            .ok_or(ZTextError::InvalidParameter)?;
        if e.kind != ElementKind::Text {
            return Err(ZTextError::ElementTypeNotText);
        }
        e.text = text.to_owned();
        Ok(())
    }

    // ── Command elements ──────────────────────────────────────────────────────

    /// Head of a Command element's content chain.
    pub fn element_command_content(
        &self,
        element: ElementId,
    ) -> Result<Option<ElementId>, ZTextError> {
        let e = self.pool.get(element).ok_or(ZTextError::InvalidParameter)?;
        if e.kind != ElementKind::Command {
            return Err(ZTextError::ElementTypeNotCommand);
        }
        Ok(e.child)
    }

    /// Install `content` as a Command element's content, taking ownership of
    /// the unlinked chain and destroying any previous content.
    pub fn element_command_content_set(
        &mut self,
        element: ElementId,
        content: ElementId,
    ) -> Result<(), ZTextError> {
        self.require_kind(element, ElementKind::Command, ZTextError::ElementTypeNotCommand)?;
        self.pool.set_child(element, content)
    }

    /// Parse `source` and install the result as a Command element's
    /// content.
    pub fn element_command_content_parse(
        &mut self,
        element: ElementId,
        source: &str,
    ) -> Result<(), ParseError> {
        self.require_kind(element, ElementKind::Command, ZTextError::ElementTypeNotCommand)?;
        let chain = self.parse(source)?;
        self.pool.set_child(element, chain).map_err(ParseError::from)
    }

    /// A Command element's properties.
    pub fn element_command_property(
        &self,
        element: ElementId,
    ) -> Result<&PropertyMap, ZTextError> {
        let e = self.pool.get(element).ok_or(ZTextError::InvalidParameter)?;
        if e.kind != ElementKind::Command {
            return Err(ZTextError::ElementTypeNotCommand);
        }
        Ok(&e.property)
    }

    /// Replace a Command element's properties.
    pub fn element_command_property_set(
        &mut self,
        element: ElementId,
        property: PropertyMap,
    ) -> Result<(), ZTextError> {
        self.require_kind(element, ElementKind::Command, ZTextError::ElementTypeNotCommand)?;
        if let Some(e) = self.pool.get_mut(element) {
            e.property = property;
        }
        Ok(())
    }

    // ── Variable elements ─────────────────────────────────────────────────────

    /// Install `body` as a Variable element's assignment body, taking
    /// ownership of the unlinked chain.
    pub fn element_variable_set(
        &mut self,
        element: ElementId,
        body: ElementId,
    ) -> Result<(), ZTextError> {
        self.require_kind(element, ElementKind::Variable, ZTextError::ElementTypeNotVariable)?;
        self.pool.set_child(element, body)
    }

    /// Parse `source` and install the result as a Variable element's
    /// assignment body.
    pub fn element_variable_parse(
        &mut self,
        element: ElementId,
        source: &str,
    ) -> Result<(), ParseError> {
        self.require_kind(element, ElementKind::Variable, ZTextError::ElementTypeNotVariable)?;
        let chain = self.parse(source)?;
        self.pool.set_child(element, chain).map_err(ParseError::from)
    }

    fn require_kind(
        &self,
        element: ElementId,
        kind: ElementKind,
        mismatch: ZTextError,
    ) -> Result<(), ZTextError> {
        let e = self.pool.get(element).ok_or(ZTextError::InvalidParameter)?;
        if e.kind != kind {
            return Err(mismatch);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
