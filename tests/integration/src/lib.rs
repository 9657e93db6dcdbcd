//! Fixtures shared by the cross-crate scenarios under `tests/`.
//!
//! The seed builds a full five-tier chain on one gateway:
//! `platform → wl → md → dist → ret`, plus a second retailer `ret2` directly
//! under `md`.

use std::sync::Arc;

use tierpay_core::{EngineConfig, Rate};
use tierpay_pricing::{DirectorySeed, RateDirectory};
use tierpay_settlement::{Journal, SettlementEngine};

pub const SEED: &str = r#"
[[channels]]
id = "upi"
gateway_id = "pg"
kind = "PAYIN"
category = "UPI"
base_cost = 15000

[[channels]]
id = "card"
gateway_id = "pg"
kind = "PAYIN"
category = "CARD"
base_cost = 18000
is_default = true

[[channels]]
id = "visa-corp"
gateway_id = "pg"
kind = "PAYIN"
category = "CARD"
card_network = "VISA"
card_type = "CORPORATE"
base_cost = 20000

[[channels]]
id = "imps"
gateway_id = "pg"
kind = "PAYOUT"
category = "IMPS"
base_cost = 0
is_default = true

[[plans]]
id = "gold"
code = "GOLD"
applicable_roles = ["WHITE_LABEL", "MASTER_DISTRIBUTOR", "DISTRIBUTOR", "RETAILER"]
is_default = true

[[plan_rates]]
plan_id = "gold"
channel_id = "upi"
rate = 16500

[[plan_rates]]
plan_id = "gold"
channel_id = "card"
rate = 21000

[[nodes]]
id = "platform"
role = "PLATFORM"
capabilities = ["ASSIGN_RATES", "MANAGE_PAYOUT_CHARGES", "MANAGE_PLANS", "SETTLE_TRANSACTIONS", "ADJUST_WALLETS", "VIEW_WALLETS"]

[[nodes]]
id = "wl"
role = "WHITE_LABEL"
parent = "platform"
capabilities = ["ASSIGN_RATES"]

[[nodes]]
id = "md"
role = "MASTER_DISTRIBUTOR"
parent = "wl"
capabilities = ["ASSIGN_RATES"]

[[nodes]]
id = "dist"
role = "DISTRIBUTOR"
parent = "md"

[[nodes]]
id = "ret"
role = "RETAILER"
parent = "dist"

[[nodes]]
id = "ret2"
role = "RETAILER"
parent = "md"

[[payout_configs]]
assigner = "platform"
gateway = "pg"
config = { type = "slab", slabs = [
    { min = 0, max = 5000000, flat_charge = 500 },
    { min = 5000001, max = 10000000, flat_charge = 1000 },
    { min = 10000001, flat_charge = 1500 },
] }

[[payout_configs]]
assigner = "platform"
gateway = "pg"
plan = "gold"
config = { type = "slab", slabs = [
    { min = 0, max = 5000000, flat_charge = 1000 },
    { min = 5000001, max = 10000000, flat_charge = 1500 },
    { min = 10000001, flat_charge = 2000 },
] }

[[payout_routing]]
gateway = "pg"
effective_from = "2024-01-01T00:00:00Z"
"#;

pub fn pct(s: &str) -> Rate {
    Rate::parse_percent(s).expect("valid percent")
}

pub fn seeded_directory() -> Arc<RateDirectory> {
    let directory = RateDirectory::new();
    DirectorySeed::from_toml(SEED)
        .expect("seed parses")
        .apply(&directory)
        .expect("seed applies");
    Arc::new(directory)
}

pub fn seeded_engine() -> SettlementEngine {
    SettlementEngine::new(seeded_directory(), EngineConfig::default())
}

pub fn journaled_engine(journal: Arc<dyn Journal>) -> SettlementEngine {
    SettlementEngine::with_journal(seeded_directory(), EngineConfig::default(), journal)
}
