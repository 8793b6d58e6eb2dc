// Generation engine boundary: the opaque blocking text-generation call
// and the process-wide handle that serializes access to it

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::stop::StopPredicate;
use crate::types::GenerationParams;

/// The underlying text-generation primitive: a single, potentially
/// multi-second blocking call that pushes decoded chunk text through
/// `emit` as tokens become available.
///
/// Contract:
/// - the stop predicate is consulted once per new token, before that
///   token's text is emitted;
/// - `emit` returning false means the consumer is gone and production
///   must cease without error;
/// - `cancel` is polled between tokens; a cancelled token ends the call
///   early and cleanly. Engines that cannot interrupt the primitive must
///   at minimum stop emitting.
pub trait GenerationEngine: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stop: &dyn StopPredicate,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), EngineError>;
}

/// Shared, process-wide access to one engine. The generation primitive is
/// a single shared resource; the mutex gate serializes sessions at this
/// boundary so two sessions can never interleave their chunk streams.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn GenerationEngine>,
    gate: Arc<Mutex<()>>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn GenerationEngine>) -> Self {
        Self {
            engine,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Run one generation call while holding the gate.
    pub fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stop: &dyn StopPredicate,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), EngineError> {
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| {
            // A panicking session must not brick the shared engine.
            poisoned.into_inner()
        });
        self.engine.generate(prompt, params, stop, cancel, emit)
    }
}
