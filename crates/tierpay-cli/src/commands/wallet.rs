//! `tierpay wallet`: show or adjust a node's wallet.

use clap::{Args, Subcommand};
use serde::Serialize;
use tierpay_core::{Amount, TransactionId};

use super::{rupees, send, NodeArgs};

#[derive(Args, Debug)]
pub struct WalletArgs {
    #[command(subcommand)]
    pub action: WalletAction,

    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Subcommand, Debug)]
pub enum WalletAction {
    /// Balance, hold and recent entries.
    Show {
        node_id: String,
        /// Number of most recent entries to list.
        #[arg(long, default_value_t = 10)]
        entries: usize,
    },
    /// Manual top-up.
    Credit {
        node_id: String,
        /// Amount in rupees.
        amount: String,
        /// Idempotency reference; reuse it to retry safely.
        #[arg(long)]
        reference: Option<TransactionId>,
    },
    /// Manual deduction; fails when the wallet lacks free funds.
    Debit {
        node_id: String,
        amount: String,
        #[arg(long)]
        reference: Option<TransactionId>,
    },
    /// Move funds between two wallets in one atomic batch.
    Transfer {
        from: String,
        to: String,
        amount: String,
        #[arg(long)]
        reference: Option<TransactionId>,
    },
}

#[derive(Serialize)]
struct AdjustWalletRequest<'a> {
    action: &'static str,
    amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<TransactionId>,
}

pub async fn run(args: &WalletArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::new();

    let (node_id, body) = match &args.action {
        WalletAction::Show { node_id, entries } => {
            return show(args, &client, node_id, *entries).await;
        }
        WalletAction::Credit {
            node_id,
            amount,
            reference,
        } => (
            node_id,
            AdjustWalletRequest {
                action: "credit",
                amount: Amount::parse_major(amount)?,
                to: None,
                reference: *reference,
            },
        ),
        WalletAction::Debit {
            node_id,
            amount,
            reference,
        } => (
            node_id,
            AdjustWalletRequest {
                action: "debit",
                amount: Amount::parse_major(amount)?,
                to: None,
                reference: *reference,
            },
        ),
        WalletAction::Transfer {
            from,
            to,
            amount,
            reference,
        } => (
            from,
            AdjustWalletRequest {
                action: "transfer",
                amount: Amount::parse_major(amount)?,
                to: Some(to.as_str()),
                reference: *reference,
            },
        ),
    };

    let path = format!("/wallets/{node_id}/adjust");
    let resp: serde_json::Value = send(args.node.post(&client, &path).json(&body)).await?;

    if resp["duplicate"].as_bool() == Some(true) {
        println!("Already applied under reference {}; nothing changed.", resp["reference"]);
        return Ok(());
    }
    println!("Applied {} {} (reference {}):", body.action, body.amount, resp["reference"]);
    for entry in resp["entries"].as_array().into_iter().flatten() {
        println!(
            "  {:<20} {:<12} balance {}",
            entry["node_id"].as_str().unwrap_or("?"),
            entry["kind"].as_str().unwrap_or("?"),
            rupees(&entry["balance_after"])
        );
    }
    Ok(())
}

async fn show(
    args: &WalletArgs,
    client: &reqwest::Client,
    node_id: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let wallet: serde_json::Value =
        send(args.node.get(client, &format!("/wallets/{node_id}"))).await?;

    println!("Wallet {node_id}:");
    println!("  Balance:    {}", rupees(&wallet["balance"]));
    println!("  On hold:    {}", rupees(&wallet["hold_balance"]));
    println!("  Available:  {}", rupees(&wallet["available"]));

    let entries = wallet["entries"].as_array().cloned().unwrap_or_default();
    if !entries.is_empty() {
        println!("  Recent entries:");
        for entry in entries.iter().rev().take(limit) {
            println!(
                "    {}  {:<12} {:>14}  balance {}",
                entry["created_at"].as_str().unwrap_or("?"),
                entry["kind"].as_str().unwrap_or("?"),
                rupees(&entry["amount"]),
                rupees(&entry["balance_after"])
            );
        }
    }
    Ok(())
}
