//! Variable store with change notification.
//!
//! Variables are named, typed cells owned by one scenario. Message items
//! subscribe to the variables their payload template reads; any change to a
//! variable marks every subscriber dirty before the mutating call returns, so
//! the next send regenerates the payload from current values.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::VarError;
use crate::item::ItemUid;
use crate::value::{VarType, VarValue};

/// A declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Declared type; every value written must have this type.
    pub ty: VarType,
    /// Current value.
    pub value: VarValue,
    /// Set by a write, cleared once subscribers have been notified.
    pub changed: bool,
    /// Message items regenerated when this variable changes.
    pub subscribers: BTreeSet<ItemUid>,
}

/// Named variables of one scenario plus the dirty set of their subscribers.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: BTreeMap<String, Variable>,
    dirty: BTreeSet<ItemUid>,
}

impl VariableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable, initialised to `initial` or the type's zero value.
    ///
    /// # Errors
    ///
    /// [`VarError::Redeclared`] if the name is taken, [`VarError::TypeMismatch`]
    /// if `initial` is not of type `ty`.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        ty: VarType,
        initial: Option<VarValue>,
    ) -> Result<(), VarError> {
        let name = name.into();
        if self.vars.contains_key(&name) {
            return Err(VarError::Redeclared(name));
        }
        let value = initial.unwrap_or_else(|| VarValue::zero(ty));
        if value.var_type() != ty {
            return Err(VarError::TypeMismatch {
                name,
                expected: ty,
                found: value.var_type(),
            });
        }
        self.vars.insert(
            name.clone(),
            Variable {
                name,
                ty,
                value,
                changed: false,
                subscribers: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Look up a variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Current value of `name`.
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`] if not declared.
    pub fn get(&self, name: &str) -> Result<&VarValue, VarError> {
        self.vars
            .get(name)
            .map(|v| &v.value)
            .ok_or_else(|| VarError::UnknownVariable(name.to_string()))
    }

    /// Declared type of `name`.
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`] if not declared.
    pub fn var_type(&self, name: &str) -> Result<VarType, VarError> {
        self.vars
            .get(name)
            .map(|v| v.ty)
            .ok_or_else(|| VarError::UnknownVariable(name.to_string()))
    }

    /// Write `value`, then notify subscribers.
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`] or [`VarError::TypeMismatch`]; the store
    /// is unchanged on error.
    pub fn set(&mut self, name: &str, value: VarValue) -> Result<(), VarError> {
        let var = self.lookup_mut(name)?;
        if value.var_type() != var.ty {
            return Err(VarError::TypeMismatch {
                name: name.to_string(),
                expected: var.ty,
                found: value.var_type(),
            });
        }
        var.value = value;
        var.changed = true;
        self.notify_and_clear(name)
    }

    /// Add one (wrapping).
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`], or [`VarError::TypeMismatch`] for a
    /// bytes variable.
    pub fn increment(&mut self, name: &str) -> Result<(), VarError> {
        self.step(name, 1)
    }

    /// Subtract one (wrapping).
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`], or [`VarError::TypeMismatch`] for a
    /// bytes variable.
    pub fn decrement(&mut self, name: &str) -> Result<(), VarError> {
        self.step(name, -1)
    }

    /// Register `item` to be marked dirty whenever `name` changes.
    ///
    /// The item starts out dirty so its first use renders the template.
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`] if not declared.
    pub fn subscribe(&mut self, name: &str, item: ItemUid) -> Result<(), VarError> {
        self.lookup_mut(name)?.subscribers.insert(item);
        self.dirty.insert(item);
        Ok(())
    }

    /// Mark every subscriber of `name` dirty and clear its changed flag.
    ///
    /// # Errors
    ///
    /// [`VarError::UnknownVariable`] if not declared.
    pub fn notify_and_clear(&mut self, name: &str) -> Result<(), VarError> {
        let var = self
            .vars
            .get_mut(name)
            .ok_or_else(|| VarError::UnknownVariable(name.to_string()))?;
        self.dirty.extend(var.subscribers.iter().copied());
        var.changed = false;
        Ok(())
    }

    /// Whether `item` must be regenerated before its next use.
    #[must_use]
    pub fn is_dirty(&self, item: ItemUid) -> bool {
        self.dirty.contains(&item)
    }

    /// Clear `item`'s dirty flag after regeneration.
    pub fn clear_dirty(&mut self, item: ItemUid) {
        self.dirty.remove(&item);
    }

    /// Iterate over all variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    fn step(&mut self, name: &str, delta: i64) -> Result<(), VarError> {
        let var = self.lookup_mut(name)?;
        let next = var
            .value
            .wrapping_step(delta)
            .ok_or_else(|| VarError::TypeMismatch {
                name: name.to_string(),
                expected: VarType::Int64,
                found: var.ty,
            })?;
        var.value = next;
        var.changed = true;
        self.notify_and_clear(name)
    }

    fn lookup_mut(&mut self, name: &str) -> Result<&mut Variable, VarError> {
        self.vars
            .get_mut(name)
            .ok_or_else(|| VarError::UnknownVariable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn uid(n: u64) -> ItemUid {
        ItemUid::from_raw(n)
    }

    #[test]
    fn test_declare_defaults_and_rejects_duplicates() {
        let mut store = VariableStore::new();
        store.declare("x", VarType::Int64, None).unwrap();
        assert_eq!(store.get("x"), Ok(&VarValue::Int(0)));
        assert_eq!(
            store.declare("x", VarType::Int64, None),
            Err(VarError::Redeclared("x".into()))
        );
        assert_matches!(
            store.declare("s", VarType::Bytes, Some(VarValue::Int(1))),
            Err(VarError::TypeMismatch { .. })
        );
    }

    #[test]
    fn test_set_marks_subscribers_dirty() {
        let mut store = VariableStore::new();
        store.declare("v", VarType::Bytes, Some(VarValue::text("A"))).unwrap();
        store.subscribe("v", uid(1)).unwrap();
        store.subscribe("v", uid(2)).unwrap();
        store.clear_dirty(uid(1));
        store.clear_dirty(uid(2));

        store.set("v", VarValue::text("B")).unwrap();
        assert!(store.is_dirty(uid(1)));
        assert!(store.is_dirty(uid(2)));
        assert!(!store.variable("v").unwrap().changed);
    }

    #[test]
    fn test_set_type_mismatch_leaves_value() {
        let mut store = VariableStore::new();
        store.declare("n", VarType::Int64, Some(VarValue::Int(4))).unwrap();
        assert_matches!(
            store.set("n", VarValue::text("x")),
            Err(VarError::TypeMismatch { .. })
        );
        assert_eq!(store.get("n"), Ok(&VarValue::Int(4)));
    }

    #[test]
    fn test_increment_and_decrement() {
        let mut store = VariableStore::new();
        store.declare("n", VarType::Int64, Some(VarValue::Int(5))).unwrap();
        store.increment("n").unwrap();
        store.increment("n").unwrap();
        store.decrement("n").unwrap();
        assert_eq!(store.get("n"), Ok(&VarValue::Int(6)));
    }

    #[test]
    fn test_arithmetic_on_bytes_is_type_mismatch() {
        let mut store = VariableStore::new();
        store.declare("s", VarType::Bytes, None).unwrap();
        assert_matches!(store.increment("s"), Err(VarError::TypeMismatch { .. }));
        assert_matches!(store.decrement("s"), Err(VarError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_variable() {
        let mut store = VariableStore::new();
        assert_eq!(
            store.set("nope", VarValue::Int(1)),
            Err(VarError::UnknownVariable("nope".into()))
        );
        assert_eq!(
            store.increment("nope"),
            Err(VarError::UnknownVariable("nope".into()))
        );
        assert!(store.subscribe("nope", uid(9)).is_err());
    }
}
