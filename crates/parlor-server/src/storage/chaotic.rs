//! Fault-injecting storage wrapper.
//!
//! Fails a seeded fraction of operations before they reach the wrapped
//! backend, so a failed operation never has a partial effect. Chaos tests use
//! it to check that storage faults only ever cost history, never routing.

use std::sync::{Arc, Mutex};

use super::{Record, Row, Storage, StorageError};

/// Storage wrapper that fails operations at a configured rate.
///
/// Clones share the fault sequence and counters.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Probability that an operation fails, in [0.0, 1.0]
    failure_rate: f64,
    state: Arc<Mutex<ChaosState>>,
}

/// Generator state and counters, locked together.
struct ChaosState {
    /// xorshift64* state, never zero
    rng: u64,
    attempted: usize,
    injected: usize,
}

impl ChaosState {
    fn new(seed: u64) -> Self {
        let rng = seed ^ 0x9E37_79B9_7F4A_7C15;
        Self { rng: if rng == 0 { 1 } else { rng }, attempted: 0, injected: 0 }
    }

    /// Uniform sample in [0.0, 1.0).
    fn sample(&mut self) -> f64 {
        self.rng ^= self.rng >> 12;
        self.rng ^= self.rng << 25;
        self.rng ^= self.rng >> 27;
        let bits = self.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed. Equal seeds fail the same
    /// operations.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self { inner, failure_rate, state: Arc::new(Mutex::new(ChaosState::new(seed))) }
    }

    /// Wrapped backend, for checking what actually got stored.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Operations attempted so far, failed ones included.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("Mutex poisoned");
        state.attempted
    }

    /// Operations failed by injection so far.
    pub fn injected_failures(&self) -> usize {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("Mutex poisoned");
        state.injected
    }

    fn roll(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("Mutex poisoned");
        state.attempted += 1;

        if state.sample() < self.failure_rate {
            state.injected += 1;
            return Err(StorageError::Io("injected fault".to_string()));
        }

        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn insert(&self, table: &str, record: &Record) -> Result<u64, StorageError> {
        self.roll()?;
        self.inner.insert(table, record)
    }

    fn fetch_all(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>, StorageError> {
        self.roll()?;
        self.inner.fetch_all(table, columns)
    }

    fn delete(&self, table: &str, row_id: u64) -> Result<(), StorageError> {
        self.roll()?;
        self.inner.delete(table, row_id)
    }
}

impl<S: Storage + std::fmt::Debug> std::fmt::Debug for ChaoticStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaoticStorage")
            .field("inner", &self.inner)
            .field("failure_rate", &self.failure_rate)
            .finish_non_exhaustive()
    }
}
