//! `tierpay charge`: compute what a payout config charges on an amount.

use clap::Args;
use serde::Serialize;
use tierpay_core::{Amount, Rate};
use tierpay_pricing::{PayoutChargeConfig, PayoutSlab};

use super::{rupees, send, NodeArgs};

#[derive(Args, Debug)]
pub struct ChargeArgs {
    /// Payout amount in rupees, e.g. 75000 or 1250.50.
    #[arg(short = 'm', long)]
    pub amount: String,

    /// Percentage charge, e.g. 0.5.
    #[arg(long, conflicts_with = "slab")]
    pub percent: Option<String>,

    /// Slab as MIN..MAX=CHARGE in rupees; leave MAX empty for the last slab.
    /// Repeat for each slab, lowest first.
    #[arg(long, required_unless_present = "percent")]
    pub slab: Vec<String>,

    #[command(flatten)]
    pub node: NodeArgs,
}

#[derive(Serialize)]
struct PayoutChargeRequest {
    config: PayoutChargeConfig,
    amount: Amount,
}

fn parse_slab(raw: &str) -> anyhow::Result<PayoutSlab> {
    let (range, charge) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("slab '{raw}' is not MIN..MAX=CHARGE"))?;
    let (min, max) = range
        .split_once("..")
        .ok_or_else(|| anyhow::anyhow!("slab range '{range}' is not MIN..MAX"))?;
    let min = Amount::parse_major(min.trim())?;
    let charge = Amount::parse_major(charge.trim())?;
    let max = match max.trim() {
        "" => None,
        max => Some(Amount::parse_major(max)?),
    };
    Ok(PayoutSlab {
        min,
        max,
        flat_charge: charge,
    })
}

pub fn parse_config(percent: Option<&str>, slabs: &[String]) -> anyhow::Result<PayoutChargeConfig> {
    let config = match percent {
        Some(p) => PayoutChargeConfig::Percentage {
            rate: Rate::parse_percent(p)?,
        },
        None => PayoutChargeConfig::Slab {
            slabs: slabs.iter().map(|s| parse_slab(s)).collect::<anyhow::Result<_>>()?,
        },
    };
    config.validate()?;
    Ok(config)
}

pub async fn run(args: &ChargeArgs) -> anyhow::Result<()> {
    let config = parse_config(args.percent.as_deref(), &args.slab)?;
    let amount = Amount::parse_major(&args.amount)?;

    let client = reqwest::Client::new();
    let body = PayoutChargeRequest { config, amount };
    let charge: serde_json::Value =
        send(args.node.post(&client, "/payout-charge").json(&body)).await?;

    println!("Payout charge:");
    println!("  Amount:       {}", rupees(&charge["amount"]));
    println!("  Charge:       {}", rupees(&charge["charge"]));
    println!("  Total debit:  {}", rupees(&charge["total_debit"]));

    Ok(())
}
