//! Per-unit-of-work holder of the current trace metadata.

use crate::metadata::Metadata;

/// Single-slot store for the [`Metadata`] of the executing logical request.
///
/// Each concurrent unit of work (thread, task, request) owns its own store;
/// the store is never shared, so no locking is needed. It is mutated only by
/// layer entry/exit transitions and by explicit set/clear calls, last write
/// wins.
#[derive(Debug, Default)]
pub struct ContextStore {
    current: Option<Metadata>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        ContextStore::default()
    }

    /// The metadata currently in effect, if any.
    pub fn current(&self) -> Option<&Metadata> {
        self.current.as_ref()
    }

    /// Replace the current metadata.
    pub fn set(&mut self, metadata: Metadata) {
        self.current = Some(metadata);
    }

    /// Drop the current metadata.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Returns `true` if the store holds metadata with valid identifiers.
    pub fn is_valid(&self) -> bool {
        self.current.map(|md| md.is_valid()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Metadata, OpId, SampleSource, TraceFlags, TraceId};

    fn metadata() -> Metadata {
        Metadata::new(
            TraceId::from_bytes([9; 20]),
            OpId::from(3),
            TraceFlags::SAMPLED,
            SampleSource::Default,
        )
    }

    #[test]
    fn starts_empty() {
        let store = ContextStore::new();
        assert!(store.current().is_none());
        assert!(!store.is_valid());
    }

    #[test]
    fn last_write_wins() {
        let mut store = ContextStore::new();
        store.set(metadata());
        let replacement = metadata().derive_child(OpId::from(4));
        store.set(replacement);
        assert_eq!(store.current(), Some(&replacement));
        assert!(store.is_valid());
    }

    #[test]
    fn clear_empties_the_slot() {
        let mut store = ContextStore::new();
        store.set(metadata());
        store.clear();
        assert!(store.current().is_none());
    }
}
