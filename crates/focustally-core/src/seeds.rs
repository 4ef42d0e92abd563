//! Shared codec seed (`seeds/1`).
//!
//! Clients mask durations with this seed before sending them, and the
//! engine's callers unmask with the same value.

use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::storage::{field, paths, Document, DocumentStore, Patch, WriteMode};

fn seed_value(doc: &Document) -> Option<String> {
    field(doc, "value")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The shared seed, if one has been stored.
pub fn load_seed<S: DocumentStore + ?Sized>(store: &S) -> Result<Option<String>> {
    Ok(store.get(&paths::seed()?)?.as_ref().and_then(seed_value))
}

/// Replace the shared seed.
///
/// Durations masked with the previous seed no longer decode.
pub fn store_seed<S: DocumentStore + ?Sized>(store: &S, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "seed".into(),
            message: "must not be empty".into(),
        }
        .into());
    }
    store.set(&paths::seed()?, &Patch::new().set("value", value), WriteMode::Replace)?;
    Ok(())
}

/// The shared seed, generating and storing one on first use.
pub fn ensure_seed<S: DocumentStore + ?Sized>(store: &S) -> Result<String> {
    let fresh = Uuid::new_v4().to_string();
    let mut seed = String::new();
    let created = store.transaction(&paths::seed()?, &mut |doc| match doc.and_then(seed_value) {
        Some(existing) => {
            seed = existing;
            None
        }
        None => {
            seed = fresh.clone();
            Some(Patch::new().set("value", fresh.as_str()))
        }
    })?;
    if created {
        info!("generated a new shared seed");
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{mask_duration_ms, unmask_duration_ms};
    use crate::storage::MemoryStore;

    #[test]
    fn missing_seed_is_none() {
        let store = MemoryStore::new();
        assert_eq!(load_seed(&store).unwrap(), None);
    }

    #[test]
    fn ensure_generates_once() {
        let store = MemoryStore::new();
        let first = ensure_seed(&store).unwrap();
        assert!(!first.is_empty());
        assert_eq!(ensure_seed(&store).unwrap(), first);
        assert_eq!(load_seed(&store).unwrap(), Some(first));
    }

    #[test]
    fn stored_seed_is_used_by_both_sides() {
        let store = MemoryStore::new();
        store_seed(&store, " tohum ").unwrap();
        assert_eq!(ensure_seed(&store).unwrap(), "tohum");

        let client = load_seed(&store).unwrap().unwrap();
        let masked = mask_duration_ms(1_500_000, &client);
        let server = load_seed(&store).unwrap().unwrap();
        assert_eq!(unmask_duration_ms(&masked, &server).unwrap(), 1_500_000);
    }

    #[test]
    fn empty_seed_is_rejected() {
        let store = MemoryStore::new();
        assert!(store_seed(&store, "  ").is_err());
        assert_eq!(load_seed(&store).unwrap(), None);
    }
}
