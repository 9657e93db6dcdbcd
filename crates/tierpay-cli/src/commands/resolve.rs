//! `tierpay resolve`: show the effective rate of a node on a channel.

use clap::Args;
use tierpay_core::TxnKind;

use super::{send, NodeArgs};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Node whose rate to resolve.
    pub node_id: String,

    /// Channel to resolve on.
    pub channel: String,

    /// Transaction kind (PAYIN or PAYOUT); defaults to the channel's own kind.
    #[arg(short, long)]
    pub kind: Option<TxnKind>,

    #[command(flatten)]
    pub node: NodeArgs,
}

pub async fn run(args: &ResolveArgs) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut req = args
        .node
        .get(&client, &format!("/rates/{}/{}", args.node_id, args.channel));
    if let Some(kind) = args.kind {
        req = req.query(&[("kind", kind.to_string())]);
    }
    let rate: serde_json::Value = send(req).await?;

    let ppm = rate["rate"].as_u64().unwrap_or(0);
    println!("Effective rate for {} on {}:", args.node_id, args.channel);
    println!("  Rate:     {}.{:04}%", ppm / 10_000, ppm % 10_000);
    println!("  Channel:  {}", rate["channel_id"].as_str().unwrap_or("?"));
    println!("  Source:   {}", rate["source"]);
    if rate["via_fallback"].as_bool() == Some(true) {
        println!("  (resolved via the gateway's default channel)");
    }

    Ok(())
}
