//! The element tree.
//!
//! A parsed document is a chain of *elements* linked as siblings
//! (`prev`/`next`) with optional children (`child`/`parent`).  Elements live
//! in an [`ElementPool`] arena and are addressed by copyable [`ElementId`]
//! handles; the link fields hold `Option<ElementId>` instead of pointers.
//!
//! Link invariants maintained by every operation:
//!
//! - `a.next == b` iff `b.prev == a`; chains are acyclic and end in a node
//!   whose `next` is `None`.
//! - every node of a chain shares the same `parent`; when `p.child == c`,
//!   `c.prev` is `None` and the chain starting at `c` is `p`'s children.
//! - a node with a `prev` or a `parent` is "linked" and cannot be attached
//!   anywhere else until removed.

use std::collections::HashMap;
use std::fmt;

use crate::error::ZTextError;

/// A command's key/value properties.
pub type PropertyMap = HashMap<String, String>;

/// What an element represents; determines how [`crate::ZText::eval`]
/// renders it and which operations apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Literal text; rendered after escape removal.
    Text,
    /// A named variable reference, optionally carrying an assignment body
    /// as its child chain.
    Variable,
    /// A host-registered command with optional properties and body.
    Command,
}

/// Handle to an element in an [`ElementPool`].
///
/// Ids carry no generation tag: after an element is destroyed its slot may
/// be reused, and a held id for the destroyed element then refers to the
/// new occupant.  Operations on an id whose slot is currently free fail
/// with `InvalidParameter`; do not retain ids across a destroy.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ElementId(u32);

impl ElementId {
    #[inline]
    fn new(index: u32) -> Self {
        ElementId(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

/// `true` when `name` is a legal variable/command name: `[A-Za-z0-9_]+`.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) kind: ElementKind,
    /// Literal payload for Text; the name for Variable and Command.
    pub(crate) text: String,
    /// Key/value properties; populated for Command only.
    pub(crate) property: PropertyMap,
    pub(crate) next: Option<ElementId>,
    pub(crate) prev: Option<ElementId>,
    pub(crate) child: Option<ElementId>,
    pub(crate) parent: Option<ElementId>,
}

impl Element {
    fn new(kind: ElementKind, text: String) -> Self {
        Self {
            kind,
            text,
            property: PropertyMap::new(),
            next: None,
            prev: None,
            child: None,
            parent: None,
        }
    }
}

enum Slot {
    Occupied(Element),
    Free(Option<u32>),
}

/// Arena holding every element of one [`crate::ZText`] context.
///
/// Freed slots go on a free list and are reused by later allocations, so a
/// long-lived context does not grow without bound.  [`ElementPool::live_count`]
/// reports the number of occupied slots; tests use it as a leak check.
#[derive(Default)]
pub(crate) struct ElementPool {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live: usize,
}

impl ElementPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    fn alloc(&mut self, element: Element) -> ElementId {
        self.live += 1;
        match self.free_head {
            Some(index) => {
                self.free_head = match self.slots[index as usize] {
                    Slot::Free(next) => next,
                    Slot::Occupied(_) => unreachable!("free list points at a live slot"),
                };
                self.slots[index as usize] = Slot::Occupied(element);
                ElementId::new(index)
            }
            None => {
                self.slots.push(Slot::Occupied(element));
                ElementId::new((self.slots.len() - 1) as u32)
            }
        }
    }

    fn free_slot(&mut self, id: ElementId) {
        debug_assert!(matches!(self.slots[id.index()], Slot::Occupied(_)));
        self.slots[id.index()] = Slot::Free(self.free_head);
        self.free_head = Some(id.index() as u32);
        self.live -= 1;
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&Element> {
        match self.slots.get(id.index()) {
            Some(Slot::Occupied(element)) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Occupied(element)) => Some(element),
            _ => None,
        }
    }

    /// Infallible accessor for ids already validated by the public entry
    /// point.  A stale id here is a library bug, not a caller error.
    fn node(&self, id: ElementId) -> &Element {
        match &self.slots[id.index()] {
            Slot::Occupied(element) => element,
            Slot::Free(_) => panic!("stale {id:?}"),
        }
    }

    fn node_mut(&mut self, id: ElementId) -> &mut Element {
        match &mut self.slots[id.index()] {
            Slot::Occupied(element) => element,
            Slot::Free(_) => panic!("stale {id:?}"),
        }
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    pub(crate) fn create_text(&mut self, text: &str) -> ElementId {
        self.alloc(Element::new(ElementKind::Text, text.to_owned()))
    }

    pub(crate) fn create_variable(&mut self, name: &str) -> Result<ElementId, ZTextError> {
        if !is_valid_name(name) {
            return Err(ZTextError::TokenNameInvalid);
        }
        Ok(self.alloc(Element::new(ElementKind::Variable, name.to_owned())))
    }

    pub(crate) fn create_command(&mut self, name: &str) -> Result<ElementId, ZTextError> {
        if !is_valid_name(name) {
            return Err(ZTextError::TokenNameInvalid);
        }
        Ok(self.alloc(Element::new(ElementKind::Command, name.to_owned())))
    }

    // ── Chain navigation ──────────────────────────────────────────────────────

    pub(crate) fn next(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(|e| e.next)
    }

    pub(crate) fn prev(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(|e| e.prev)
    }

    pub(crate) fn find_head(&self, id: ElementId) -> Option<ElementId> {
        self.get(id)?;
        let mut head = id;
        while let Some(prev) = self.node(head).prev {
            head = prev;
        }
        Some(head)
    }

    pub(crate) fn find_tail(&self, id: ElementId) -> Option<ElementId> {
        self.get(id)?;
        let mut tail = id;
        while let Some(next) = self.node(tail).next {
            tail = next;
        }
        Some(tail)
    }

    // ── Linking ───────────────────────────────────────────────────────────────

    /// Splice `element` (and everything chained after it) in after
    /// `position`.
    pub(crate) fn append(
        &mut self,
        position: ElementId,
        element: ElementId,
    ) -> Result<(), ZTextError> {
        self.link_checks(position, element)?;

        let parent = self.node(position).parent;
        let tail = self.adopt_chain(element, parent);

        let position_next = self.node(position).next;
        self.node_mut(element).prev = Some(position);
        self.node_mut(tail).next = position_next;
        self.node_mut(position).next = Some(element);
        if let Some(after) = position_next {
            self.node_mut(after).prev = Some(tail);
        }
        Ok(())
    }

    /// Splice `element` (and everything chained after it) in before
    /// `position`.
    pub(crate) fn insert(
        &mut self,
        position: ElementId,
        element: ElementId,
    ) -> Result<(), ZTextError> {
        self.link_checks(position, element)?;

        let parent = self.node(position).parent;
        let tail = self.adopt_chain(element, parent);

        let position_prev = self.node(position).prev;
        self.node_mut(element).prev = position_prev;
        self.node_mut(tail).next = Some(position);
        self.node_mut(position).prev = Some(tail);
        if let Some(before) = position_prev {
            self.node_mut(before).next = Some(element);
        }

        // When `position` was the head of its parent's children, the parent
        // must now point at the new head.
        if let Some(p) = parent {
            if self.node(p).child == Some(position) {
                self.node_mut(p).child = Some(element);
            }
        }
        Ok(())
    }

    fn link_checks(&self, position: ElementId, element: ElementId) -> Result<(), ZTextError> {
        if self.get(position).is_none() || self.get(element).is_none() || position == element {
            return Err(ZTextError::InvalidParameter);
        }
        if self.node(element).prev.is_some() {
            return Err(ZTextError::ElementInUse);
        }
        Ok(())
    }

    /// Set `parent` on every node from `element` to its tail; returns the
    /// tail.
    fn adopt_chain(&mut self, element: ElementId, parent: Option<ElementId>) -> ElementId {
        let mut tail = element;
        loop {
            self.node_mut(tail).parent = parent;
            match self.node(tail).next {
                Some(next) => tail = next,
                None => break,
            }
        }
        tail
    }

    /// Detach `element` from its chain.  Its children travel with it.
    pub(crate) fn remove(&mut self, element: ElementId) -> Result<(), ZTextError> {
        self.get(element).ok_or(ZTextError::InvalidParameter)?;

        let (prev, next, parent) = {
            let e = self.node(element);
            (e.prev, e.next, e.parent)
        };
        if let Some(p) = parent {
            if self.node(p).child == Some(element) {
                self.node_mut(p).child = next;
            }
        }
        if let Some(n) = next {
            self.node_mut(n).prev = prev;
        }
        if let Some(p) = prev {
            self.node_mut(p).next = next;
        }

        let e = self.node_mut(element);
        e.prev = None;
        e.next = None;
        e.parent = None;
        Ok(())
    }

    /// Remove `element` from its chain and free it together with its whole
    /// subtree.  Returns the sibling that followed it, for iteration.
    ///
    /// Children are collected on an explicit work stack and each sibling
    /// chain is freed iteratively, so deeply nested bodies cannot overflow
    /// the call stack.
    pub(crate) fn destroy(&mut self, element: ElementId) -> Result<Option<ElementId>, ZTextError> {
        self.get(element).ok_or(ZTextError::InvalidParameter)?;

        let following = self.node(element).next;
        self.remove(element)?;

        let mut stack: Vec<ElementId> = Vec::new();
        if let Some(child) = self.node(element).child {
            stack.push(child);
        }
        self.free_slot(element);

        while let Some(head) = stack.pop() {
            let mut current = Some(head);
            while let Some(id) = current {
                if let Some(child) = self.node(id).child {
                    stack.push(child);
                }
                current = self.node(id).next;
                self.free_slot(id);
            }
        }
        Ok(following)
    }

    /// Destroy `head` and every sibling after it, with all their subtrees.
    pub(crate) fn destroy_all(&mut self, head: ElementId) -> Result<(), ZTextError> {
        let mut current = Some(head);
        while let Some(id) = current {
            current = self.destroy(id)?;
        }
        Ok(())
    }

    // ── Children ──────────────────────────────────────────────────────────────

    /// Install `chain` as `owner`'s child chain, destroying any previous
    /// children.  The chain must be fully unlinked: a head with a `prev`, or
    /// any node with a `parent`, is in use elsewhere.
    pub(crate) fn set_child(
        &mut self,
        owner: ElementId,
        chain: ElementId,
    ) -> Result<(), ZTextError> {
        if self.get(owner).is_none() || self.get(chain).is_none() {
            return Err(ZTextError::InvalidParameter);
        }
        if self.node(chain).prev.is_some() {
            return Err(ZTextError::ElementInUse);
        }
        let mut current = Some(chain);
        while let Some(id) = current {
            if id == owner {
                return Err(ZTextError::InvalidParameter);
            }
            if self.node(id).parent.is_some() {
                return Err(ZTextError::ElementInUse);
            }
            current = self.node(id).next;
        }

        if let Some(old) = self.node(owner).child {
            self.destroy_all(old)?;
        }

        let mut current = Some(chain);
        while let Some(id) = current {
            self.node_mut(id).parent = Some(owner);
            current = self.node(id).next;
        }
        self.node_mut(owner).child = Some(chain);
        Ok(())
    }

    // ── Copying ───────────────────────────────────────────────────────────────

    /// Deep-copy the chain starting at `head`: every sibling, every child,
    /// text, kind, and properties.  The copy is fully unlinked from the
    /// original tree.
    pub(crate) fn copy_chain(&mut self, head: ElementId) -> Result<ElementId, ZTextError> {
        self.get(head).ok_or(ZTextError::InvalidParameter)?;

        let new_head = self.copy_element(head);
        let mut new_tail = new_head;
        let mut current = self.node(head).next;
        while let Some(id) = current {
            let copy = self.copy_element(id);
            self.append(new_tail, copy)?;
            new_tail = copy;
            current = self.node(id).next;
        }
        Ok(new_head)
    }

    fn copy_element(&mut self, source: ElementId) -> ElementId {
        let (kind, text, property, child) = {
            let e = self.node(source);
            (e.kind, e.text.clone(), e.property.clone(), e.child)
        };
        let copied_child = child.map(|c| {
            self.copy_chain(c)
                .unwrap_or_else(|_| unreachable!("child of a live element is live"))
        });
        let id = self.alloc(Element {
            kind,
            text,
            property,
            next: None,
            prev: None,
            child: copied_child,
            parent: None,
        });
        if let Some(head) = copied_child {
            self.adopt_chain(head, Some(id));
        }
        id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
