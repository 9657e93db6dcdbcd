//! Tierpay CLI: operator interface to a running Tierpay node.
//!
//! Subcommands: init, status, resolve, assign, charge, settle, wallet.

mod commands;

use clap::{Parser, Subcommand};

/// Tierpay: rates, commissions and wallets for reseller hierarchies.
#[derive(Parser, Debug)]
#[command(name = "tierpay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default node configuration.
    Init(commands::init::InitArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
    /// Show the effective rate of a node on a channel.
    Resolve(commands::resolve::ResolveArgs),
    /// Assign a personal rate to a node below you.
    Assign(commands::assign::AssignArgs),
    /// Compute the charge a payout config levies on an amount.
    Charge(commands::charge::ChargeArgs),
    /// Drive a pending transaction to its terminal state.
    Settle(commands::settle::SettleArgs),
    /// Show or adjust a wallet.
    Wallet(commands::wallet::WalletArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Resolve(args) => commands::resolve::run(args).await,
        Commands::Assign(args) => commands::assign::run(args).await,
        Commands::Charge(args) => commands::charge::run(args).await,
        Commands::Settle(args) => commands::settle::run(args).await,
        Commands::Wallet(args) => commands::wallet::run(args).await,
    }
}
