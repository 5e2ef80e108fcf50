//! Substitution registry.
//!
//! Maps each [`FunctionKey`] to its [`Slot`] and keeps every registered
//! signature in registration order for the external renaming tool.
//!
//! The process-wide instance is built once, on first use, from the
//! [`WRAPPED_FUNCTIONS`] slice. That build is the only write; afterwards the
//! registry is read-only and shared by every thread.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::OnceLock;

use tracing::debug;

use crate::identity::{FunctionId, FunctionKey};
use crate::signature::FunctionSignature;
use crate::slot::Slot;
use crate::symbols::{Registration, WRAPPED_FUNCTIONS};
use crate::{Error, Result};

struct SlotEntry {
    slot: Slot,
    /// Index of the first signature registered for this key.
    signature: usize,
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<FunctionKey, SlotEntry>,
    order: Vec<FunctionKey>,
    signatures: Vec<FunctionSignature>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of every wrapped function linked into this binary.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = Registry::from_registrations(WRAPPED_FUNCTIONS.iter().copied());
            debug!("built global registry with {} wrapped functions", registry.len());
            registry
        })
    }

    pub fn from_registrations<'a>(registrations: impl IntoIterator<Item = &'a Registration>) -> Self {
        let mut registry = Registry::new();
        for registration in registrations {
            registry.register(
                registration.key(),
                (registration.signature)(registration.name, registration.qualifiers),
                registration.alias,
            );
        }
        registry
    }

    /// Insert a slot for `key` unless one exists, and append `signature`
    /// under `alias` either way.
    pub fn register(&mut self, key: FunctionKey, signature: FunctionSignature, alias: &str) -> Slot {
        let index = self.signatures.len();
        self.signatures.push(signature.with_alias(alias));
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                debug!("{alias}: {key} already registered as {}", entry.get().slot.id());
                entry.get().slot
            }
            Entry::Vacant(entry) => {
                let id = FunctionId(self.order.len() as u32);
                let slot = Slot::new(id, key);
                debug!("{alias}: registered {key} as {id}");
                self.order.push(key);
                entry.insert(SlotEntry {
                    slot,
                    signature: index,
                });
                slot
            }
        }
    }

    pub fn lookup(&self, key: &FunctionKey) -> Result<Slot> {
        self.entries
            .get(key)
            .map(|entry| entry.slot)
            .ok_or_else(|| Error::NotWrapped { key: key.to_string() })
    }

    pub fn contains(&self, key: &FunctionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The first signature registered for `key`.
    pub fn signature_of(&self, key: &FunctionKey) -> Option<&FunctionSignature> {
        self.entries
            .get(key)
            .and_then(|entry| self.signatures.get(entry.signature))
    }

    /// All signatures, in registration order.
    pub fn signatures(&self) -> &[FunctionSignature] {
        &self.signatures
    }

    /// All slots, in registration order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.order.iter().filter_map(|key| self.entries.get(key).map(|entry| entry.slot))
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FunctionRef, Qualifiers, TypeDescriptor};
    use crate::signature::extract_function;

    struct First;
    struct Second;

    fn key_of<T: 'static>() -> FunctionKey {
        FunctionKey::resolve(&FunctionRef::with_pointer::<T, fn(i32) -> i32>()).0
    }

    fn signature(name: &str) -> FunctionSignature {
        extract_function::<fn(i32) -> i32>(name, Qualifiers::NONE)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        let slot = registry.register(key_of::<First>(), signature("demo::first"), "demo_alias_0_first");
        assert_eq!(registry.lookup(&key_of::<First>()).unwrap(), slot);
        assert_eq!(slot.id().index(), 0);
        assert!(registry.contains(&key_of::<First>()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unregistered() {
        let registry = Registry::new();
        let err = registry.lookup(&key_of::<Second>()).unwrap_err();
        assert!(matches!(err, Error::NotWrapped { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_register_twice_keeps_slot_appends_signature() {
        let mut registry = Registry::new();
        let a = registry.register(key_of::<First>(), signature("demo::first"), "alias_a");
        let b = registry.register(key_of::<First>(), signature("demo::first"), "alias_b");
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        let aliases: Vec<&str> = registry.signatures().iter().map(|s| s.alias()).collect();
        assert_eq!(aliases, ["alias_a", "alias_b"]);
        assert_eq!(registry.signature_of(&key_of::<First>()).unwrap().alias(), "alias_a");
    }

    #[test]
    fn test_insertion_order() {
        let mut registry = Registry::new();
        registry.register(key_of::<Second>(), signature("demo::second"), "second");
        registry.register(key_of::<First>(), signature("demo::first"), "first");

        let names: Vec<&str> = registry.signatures().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["demo::second", "demo::first"]);
        let ids: Vec<usize> = registry.slots().map(|slot| slot.id().index()).collect();
        assert_eq!(ids, [0, 1]);
        assert_eq!(registry.slots().next().unwrap().key(), key_of::<Second>());
    }

    #[test]
    fn test_same_token_different_shape() {
        let mut registry = Registry::new();
        let token = TypeDescriptor::of::<First>();
        let narrow = FunctionKey::resolve(&FunctionRef::new(
            token,
            TypeDescriptor::of::<fn(i32) -> i32>(),
            Qualifiers::NONE,
        ))
        .0;
        let wide = FunctionKey::resolve(&FunctionRef::new(
            token,
            TypeDescriptor::of::<fn(i64) -> i64>(),
            Qualifiers::NONE,
        ))
        .0;
        registry.register(narrow, signature("demo::narrow"), "narrow");
        registry.register(wide, signature("demo::wide"), "wide");
        assert_eq!(registry.len(), 2);
    }
}
