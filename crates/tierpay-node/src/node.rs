//! The Tierpay node orchestrator.
//!
//! Builds the rate directory from the seed and the journal, restores the
//! engine's transactions and wallets, serves the HTTP API, and polls gateway
//! status sources for PENDING transactions.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use tierpay_pricing::{DirectorySeed, RateDirectory};
use tierpay_settlement::{SettlementEngine, StatusSourceManager};

use crate::config::TierpayConfig;
use crate::state::NodeState;
use crate::storage::Storage;

/// A running Tierpay engine with its API and journal.
pub struct TierpayNode {
    /// Node configuration.
    config: TierpayConfig,
    /// Status sources polled in offline mode.
    sources: StatusSourceManager,
    /// Persistent storage, shared with the engine as its journal.
    storage: Option<Arc<Storage>>,
    /// The engine (None until started).
    engine: Option<Arc<SettlementEngine>>,
    /// Address the HTTP API actually bound to.
    api_addr: Option<SocketAddr>,
    /// Stops the HTTP API server.
    api_shutdown: Option<oneshot::Sender<()>>,
    api_task: Option<JoinHandle<()>>,
}

impl TierpayNode {
    pub fn new(config: TierpayConfig) -> Self {
        Self {
            config,
            sources: StatusSourceManager::new(),
            storage: None,
            engine: None,
            api_addr: None,
            api_shutdown: None,
            api_task: None,
        }
    }

    /// Sources must be registered before `run` starts polling.
    pub fn sources_mut(&mut self) -> &mut StatusSourceManager {
        &mut self.sources
    }

    /// Open storage, rebuild engine state, start the HTTP API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting Tierpay node");

        let storage = Arc::new(Storage::open(&self.config.storage.data_dir)?);
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        let directory = Arc::new(Self::build_directory(&self.config, &storage)?);
        let engine = Arc::new(SettlementEngine::with_journal(
            directory,
            self.config.engine.clone(),
            storage.clone(),
        ));
        let (transactions, entries) =
            engine.restore(storage.load_transactions()?, storage.load_entries()?)?;
        tracing::info!(transactions, entries, "engine state restored from storage");
        storage.put_state("last_start", chrono::Utc::now().to_rfc3339().as_bytes())?;

        let listener = tokio::net::TcpListener::bind(self.config.api_addr()).await?;
        let api_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let api_state = Arc::new(NodeState::new(engine.clone()));
        let api_task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = crate::api::serve(listener, api_state, shutdown).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        self.storage = Some(storage);
        self.engine = Some(engine);
        self.api_addr = Some(api_addr);
        self.api_shutdown = Some(shutdown_tx);
        self.api_task = Some(api_task);
        Ok(())
    }

    /// Seed first, then journaled overrides and payout configs on top.
    fn build_directory(config: &TierpayConfig, storage: &Storage) -> Result<RateDirectory> {
        let directory = RateDirectory::new();
        if let Some(ref path) = config.seed.path {
            DirectorySeed::load(path)?.apply(&directory)?;
            tracing::info!(path = %path.display(), nodes = directory.node_count()?, "directory seeded");
        }

        let overrides = storage.load_overrides()?;
        let override_count = overrides.len();
        for entry in overrides {
            directory.restore_override(entry)?;
        }
        let payout_configs = storage.load_payout_configs()?;
        let payout_count = payout_configs.len();
        for record in payout_configs {
            directory.restore_payout_config(record)?;
        }
        tracing::info!(
            overrides = override_count,
            payout_configs = payout_count,
            "directory restored from storage"
        );
        Ok(directory)
    }

    /// Poll status sources and apply the pending timeout until cancelled.
    pub async fn run(&mut self) -> Result<()> {
        let engine = self
            .engine
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let period = Duration::from_secs(self.config.engine.poll_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);

        tracing::info!(
            interval_secs = period.as_secs(),
            sources = self.sources.source_count(),
            "entering status poll loop"
        );

        loop {
            ticker.tick().await;
            let report = self.sources.poll_once(&engine, chrono::Utc::now()).await;
            if !report.settled.is_empty() || !report.cancelled.is_empty() || report.errors > 0 {
                tracing::info!(
                    settled = report.settled.len(),
                    cancelled = report.cancelled.len(),
                    errors = report.errors,
                    "status poll"
                );
            }
        }
    }

    /// Stop the API server and close storage.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down Tierpay node");

        if let Some(tx) = self.api_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.api_task.take() {
            task.await?;
        }
        self.engine = None;
        self.api_addr = None;

        if let Some(storage) = self.storage.take() {
            drop(storage);
            tracing::info!("storage closed");
        }

        tracing::info!("Tierpay node shut down");
        Ok(())
    }

    pub fn engine(&self) -> Option<&Arc<SettlementEngine>> {
        self.engine.as_ref()
    }

    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api_addr
    }
}
