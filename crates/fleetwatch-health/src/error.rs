//! Errors that abort a health-check cycle.

use fleetwatch_state::StateError;
use thiserror::Error;

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    /// The registry could not be read; no snapshot was produced.
    #[error("registry read failed: {0}")]
    Registry(StateError),

    /// Probing finished but the snapshot could not be logged.
    #[error("history append failed: {0}")]
    History(StateError),
}
