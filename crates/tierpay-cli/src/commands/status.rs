//! `tierpay status`: query the status of a running node.

use clap::Args;

use super::{send, NodeArgs};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub node: NodeArgs,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let status: serde_json::Value = send(args.node.get(&client, "/status")).await?;

    let engine = &status["engine"];
    println!("Node Status:");
    println!("  Endpoint:      {}", args.node.endpoint);
    println!("  Version:       {}", status["version"].as_str().unwrap_or("?"));
    println!("  Uptime:        {}s", status["uptime_secs"]);
    println!("  Nodes:         {}", status["nodes"]);
    println!("  Channels:      {}", status["channels"]);
    println!("  Transactions:  {} ({} pending)", engine["transactions"], engine["pending"]);
    println!("  Wallets:       {}", engine["wallets"]);
    println!("  Ledger:        {} entries", engine["ledger_entries"]);

    Ok(())
}
