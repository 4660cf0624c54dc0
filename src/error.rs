use crate::session::RunPhase;
use std::fmt;

/// Failures the run can hit during a tick. None of them are fatal: callers log
/// and carry on with whatever part of the frame still works.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// Pool is at its hard limit; drop this spawn and retry on the next cycle.
    PoolExhausted { pool: &'static str, hard_max: usize },
    /// Camera, spawner or audio is absent; wiring continues without it.
    MissingOptionalCollaborator(&'static str),
    /// Session asked to do something its current phase does not allow.
    InvalidStateTransition {
        from: RunPhase,
        action: &'static str,
    },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::PoolExhausted { pool, hard_max } => {
                write!(f, "{pool} pool exhausted ({hard_max} objects in use)")
            }
            RunnerError::MissingOptionalCollaborator(what) => {
                write!(f, "optional collaborator missing: {what}")
            }
            RunnerError::InvalidStateTransition { from, action } => {
                write!(f, "cannot {action} while {from:?}")
            }
        }
    }
}

impl std::error::Error for RunnerError {}
