//! Shared node state for the HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use tierpay_pricing::RateDirectory;
use tierpay_settlement::SettlementEngine;

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    /// The engine every handler talks to.
    pub engine: Arc<SettlementEngine>,
    /// When the node started.
    pub start_time: Instant,
}

impl NodeState {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }

    pub fn directory(&self) -> &Arc<RateDirectory> {
        self.engine.directory()
    }
}
