//! Status transition rules and validation

use super::types::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskStatus },
}

pub struct StatusTransition;

impl StatusTransition {
    /// Check that `from -> to` is a legal step of one execution run.
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        use TaskStatus::*;

        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (Pending, Running) => true,

            (Running, Completed)
            | (Running, Retrying)
            | (Running, Failed)
            | (Running, WaitingForHuman) => true,

            (Retrying, Running) => true,

            // pause observed at the pre-retry checkpoint
            (Retrying, Paused) | (Paused, Retrying) => true,

            (_, Cancelled) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// Operator resolution of a task parked in WAITING_FOR_HUMAN.
    pub fn validate_resolution(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        match (from, to) {
            (TaskStatus::WaitingForHuman, TaskStatus::Completed)
            | (TaskStatus::WaitingForHuman, TaskStatus::Failed)
            | (TaskStatus::WaitingForHuman, TaskStatus::Pending) => Ok(()),
            _ => Err(TransitionError::InvalidTransition { from, to }),
        }
    }

    pub fn is_terminal(status: TaskStatus) -> bool {
        status.is_terminal()
    }
}
