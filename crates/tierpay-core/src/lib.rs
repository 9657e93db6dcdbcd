//! Tierpay Core: identifiers, money arithmetic, reseller roles, and the
//! transaction lifecycle shared by the pricing and settlement layers.

pub mod config;
pub mod error;
pub mod state_machine;
pub mod types;

pub use config::EngineConfig;
pub use error::CoreError;
pub use state_machine::{Outcome, TransactionStateMachine, TransactionStatus};
pub use types::{
    Amount, Capabilities, CardNetwork, CardType, ChannelCategory, ChannelId, GatewayId, NodeId,
    NodeStatus, PlanId, Rate, Role, TransactionId, TxnKind,
};
