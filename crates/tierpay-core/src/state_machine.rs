use std::fmt;

use crate::error::CoreError;

/// Lifecycle states of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created, waiting for the gateway to report an outcome.
    Pending,
    /// Settled successfully. Final state.
    Success,
    /// Rejected by the gateway or by the ledger. Final state.
    Failed,
    /// Cancelled before an outcome arrived (timeout or operator). Final state.
    Cancelled,
}

impl TransactionStatus {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A verified settlement outcome handed to the engine by a webhook handler,
/// an operator, a status poll, or the timeout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

impl Outcome {
    /// The status this outcome drives a pending transaction into.
    pub fn target(&self) -> TransactionStatus {
        match self {
            Self::Success => TransactionStatus::Success,
            Self::Failed => TransactionStatus::Failed,
            Self::Cancelled => TransactionStatus::Cancelled,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target(), f)
    }
}

impl std::str::FromStr for Outcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(CoreError::UnknownKind(format!("outcome {s}"))),
        }
    }
}

/// Transaction state transitions.
///
/// Valid transitions:
/// - Pending → Success
/// - Pending → Failed
/// - Pending → Cancelled
///
/// Terminal states are never re-entered or left.
pub struct TransactionStateMachine;

impl TransactionStateMachine {
    /// Attempt a state transition driven by an outcome.
    pub fn transition(
        current: TransactionStatus,
        outcome: Outcome,
    ) -> Result<TransactionStatus, CoreError> {
        let target = outcome.target();
        if current != TransactionStatus::Pending {
            return Err(CoreError::InvalidStateTransition {
                from: current,
                to: target,
            });
        }

        tracing::debug!(from = %current, to = %target, "transaction state transition");
        Ok(target)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: TransactionStatus, outcome: Outcome) -> bool {
        Self::transition(current, outcome).is_ok()
    }
}
