//! Id Generator

use crate::metadata::{OpId, TraceId};
use rand::{rngs, Rng, RngCore, SeedableRng};
use std::cell::RefCell;
use std::fmt;

/// Interface for generating trace and op identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `OpId`
    fn new_op_id(&self) -> OpId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates trace and op ids using a random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| {
            let mut bytes = [0u8; 20];
            rng.borrow_mut().fill_bytes(&mut bytes);
            TraceId::from_bytes(bytes)
        })
    }

    fn new_op_id(&self) -> OpId {
        CURRENT_RNG.with(|rng| OpId::from(rng.borrow_mut().gen::<u64>()))
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

#[cfg(any(test, feature = "testing"))]
pub use sequential::SequentialIdGenerator;

#[cfg(any(test, feature = "testing"))]
mod sequential {
    use super::IdGenerator;
    use crate::metadata::{OpId, TraceId};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// [`IdGenerator`] implementation that increments a counter for each new
    /// id. This helps produce predictable ids for testing.
    #[derive(Clone, Debug)]
    pub struct SequentialIdGenerator(Arc<AtomicU64>);

    impl SequentialIdGenerator {
        /// Create a new [`SequentialIdGenerator`]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self(Arc::new(AtomicU64::new(1)))
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn new_trace_id(&self) -> TraceId {
            let next = self.0.fetch_add(1, Ordering::SeqCst);
            let mut bytes = [0u8; 20];
            bytes[12..].copy_from_slice(&next.to_be_bytes());
            TraceId::from_bytes(bytes)
        }

        fn new_op_id(&self) -> OpId {
            OpId::from(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator::default();
        let first = generator.new_trace_id();
        let second = generator.new_trace_id();
        assert_ne!(first, TraceId::INVALID);
        assert_ne!(first, second);
        assert_ne!(generator.new_op_id(), OpId::INVALID);
    }

    #[test]
    fn sequential_ids_increment() {
        let generator = SequentialIdGenerator::new();
        assert_eq!(generator.new_op_id(), OpId::from(1));
        assert_eq!(generator.new_op_id(), OpId::from(2));
    }
}
