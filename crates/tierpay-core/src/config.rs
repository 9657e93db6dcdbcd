use serde::{Deserialize, Serialize};

/// Settlement engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// PENDING transactions older than this are cancelled by the timeout policy.
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    /// Interval between offline-mode gateway status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Whether committed state is written to the journal.
    #[serde(default = "default_true")]
    pub journal_enabled: bool,
}

fn default_pending_timeout_secs() -> u64 {
    1800
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_timeout_secs: default_pending_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            journal_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn pending_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_timeout_secs as i64)
    }
}
