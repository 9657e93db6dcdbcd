use crate::state_machine::TransactionStatus;

/// Core errors: parsing and validation of the shared value types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("invalid rate: {0}")]
    InvalidRate(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown transaction kind: {0}")]
    UnknownKind(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}
