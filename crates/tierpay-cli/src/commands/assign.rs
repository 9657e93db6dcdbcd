//! `tierpay assign`: assign a personal rate to a node below the actor.

use clap::Args;
use serde::Serialize;
use tierpay_core::Rate;

use super::{send, NodeArgs};

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Node receiving the rate.
    #[arg(long = "to")]
    pub target: String,

    /// Channel the rate applies to.
    #[arg(short = 'c', long)]
    pub channel: String,

    /// Rate in percent, e.g. 1.65.
    #[arg(short, long)]
    pub rate: String,

    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Serialize)]
struct AssignRateRequest<'a> {
    node: &'a str,
    channel: &'a str,
    rate: &'a str,
}

pub async fn run(args: &AssignArgs) -> anyhow::Result<()> {
    // Reject malformed rates before they reach the node.
    let rate = Rate::parse_percent(&args.rate)?;

    let client = reqwest::Client::new();
    let body = AssignRateRequest {
        node: &args.target,
        channel: &args.channel,
        rate: &args.rate,
    };
    let entry: serde_json::Value = send(args.node.post(&client, "/rates").json(&body)).await?;

    println!("Rate assigned:");
    println!("  Node:     {}", args.target);
    println!("  Channel:  {}", args.channel);
    println!("  Rate:     {}", rate);
    println!("  By:       {}", entry["assigned_by"].as_str().unwrap_or("?"));

    Ok(())
}
