//! Program representation: an index-addressed arena of items.
//!
//! Insertion order is program order. The sequence itself is acyclic; loops
//! only arise from jumps redirecting the instruction pointer. Alongside the
//! sequence the program keeps name indices for uids, labels, variable
//! declarations and author tags.

use std::collections::BTreeMap;

use crate::item::{Item, ItemKind, ItemUid, Pc};

/// Name clash detected while appending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duplicate {
    /// Uid already present.
    Uid(ItemUid),
    /// Label already declared.
    Label(String),
    /// Variable already declared.
    Variable(String),
    /// Tag already used.
    Tag(String),
}

/// Ordered items plus lookup indices.
#[derive(Debug, Clone, Default)]
pub struct Program {
    items: Vec<Item>,
    by_uid: BTreeMap<ItemUid, Pc>,
    labels: BTreeMap<String, Pc>,
    variables: BTreeMap<String, Pc>,
    tags: BTreeMap<String, Pc>,
}

impl Program {
    /// Create an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item at the end of the sequence. Loading only.
    ///
    /// # Errors
    ///
    /// Returns the clashing name; the program is unchanged on error.
    pub(crate) fn append(&mut self, item: Item) -> Result<Pc, Duplicate> {
        if self.by_uid.contains_key(&item.uid) {
            return Err(Duplicate::Uid(item.uid));
        }
        if let Some(tag) = &item.tag {
            if self.tags.contains_key(tag) {
                return Err(Duplicate::Tag(tag.clone()));
            }
        }
        match &item.kind {
            ItemKind::Label(name) if self.labels.contains_key(name) => {
                return Err(Duplicate::Label(name.clone()));
            }
            ItemKind::Variable(name) if self.variables.contains_key(name) => {
                return Err(Duplicate::Variable(name.clone()));
            }
            _ => {}
        }

        let pc = self.items.len();
        self.by_uid.insert(item.uid, pc);
        if let Some(tag) = &item.tag {
            self.tags.insert(tag.clone(), pc);
        }
        match &item.kind {
            ItemKind::Label(name) => {
                self.labels.insert(name.clone(), pc);
            }
            ItemKind::Variable(name) => {
                self.variables.insert(name.clone(), pc);
            }
            _ => {}
        }
        self.items.push(item);
        Ok(pc)
    }

    /// Position of the first item.
    #[must_use]
    pub fn first(&self) -> Option<Pc> {
        (!self.items.is_empty()).then_some(0)
    }

    /// Position following `pc`.
    #[must_use]
    pub fn next(&self, pc: Pc) -> Option<Pc> {
        let next = pc.checked_add(1)?;
        (next < self.items.len()).then_some(next)
    }

    /// Position preceding `pc`.
    #[must_use]
    pub fn previous(&self, pc: Pc) -> Option<Pc> {
        if pc >= self.items.len() {
            return None;
        }
        pc.checked_sub(1)
    }

    /// Item at `pc`.
    #[must_use]
    pub fn get(&self, pc: Pc) -> Option<&Item> {
        self.items.get(pc)
    }

    /// Mutable item at `pc`.
    pub fn get_mut(&mut self, pc: Pc) -> Option<&mut Item> {
        self.items.get_mut(pc)
    }

    /// Position of the item with `uid`.
    #[must_use]
    pub fn find_by_uid(&self, uid: ItemUid) -> Option<Pc> {
        self.by_uid.get(&uid).copied()
    }

    /// Position of the label `name`.
    #[must_use]
    pub fn find_label(&self, name: &str) -> Option<Pc> {
        self.labels.get(name).copied()
    }

    /// Position of the declaration of variable `name`.
    #[must_use]
    pub fn find_variable(&self, name: &str) -> Option<Pc> {
        self.variables.get(name).copied()
    }

    /// Position of the item tagged `tag`.
    #[must_use]
    pub fn find_tag(&self, tag: &str) -> Option<Pc> {
        self.tags.get(tag).copied()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the program has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in program order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }
}
