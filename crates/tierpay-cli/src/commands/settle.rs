//! `tierpay settle`: drive a pending transaction to its terminal state.

use clap::Args;
use serde::Serialize;
use tierpay_core::{Outcome, TransactionId};

use super::{rupees, send, NodeArgs};

#[derive(Args, Debug)]
pub struct SettleArgs {
    /// Transaction id.
    pub transaction: TransactionId,

    /// Verified outcome: SUCCESS, FAILED or CANCELLED.
    pub outcome: Outcome,

    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Serialize)]
struct SettleRequest {
    outcome: Outcome,
}

pub async fn run(args: &SettleArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let path = format!("/transactions/{}/settle", args.transaction);
    let body = SettleRequest {
        outcome: args.outcome,
    };
    let resp: serde_json::Value = send(args.node.post(&client, &path).json(&body)).await?;

    let result = &resp["result"];
    let txn = &resp["transaction"];
    match result["result"].as_str() {
        Some("already_terminal") => println!("Transaction {} was already {}", args.transaction, result["status"]),
        Some("rejected") => println!(
            "Transaction {} rejected by the ledger: {}",
            args.transaction,
            result["reason"].as_str().unwrap_or("?")
        ),
        _ => println!("Transaction {} is now {}", args.transaction, result["status"]),
    }

    if let Some(commissions) = txn["commissions"].as_array() {
        if !commissions.is_empty() {
            println!("  Commissions:");
            for share in commissions {
                println!(
                    "    {:<20} {}",
                    share["node_id"].as_str().unwrap_or("?"),
                    rupees(&share["amount"])
                );
            }
        }
    }

    Ok(())
}
