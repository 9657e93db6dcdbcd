//! Tierpay Pricing: everything needed to decide what a payment costs each
//! tier of the reseller hierarchy.
//!
//! This crate provides:
//! - [`HierarchyTable`]: arena-indexed reseller tree with bounded ancestor walks.
//! - [`RateDirectory`]: channels, plans, plan rates, per-node overrides and payout
//!   charge configs, with floor-validated writes.
//! - [`RateResolver`]: effective rate resolution and per-tier pricing quotes.
//! - [`PayoutChargeConfig`]: percentage and slab payout charges.
//! - [`PayoutRoutingConfig`]: versioned "active payout gateway" configuration.
//! - [`DirectorySeed`]: TOML bootstrap of the directory.

pub mod directory;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod payout;
pub mod resolver;
pub mod routing;
pub mod seed;

#[cfg(test)]
mod testing;

pub use directory::{DirectoryState, RateDirectory};
pub use error::PricingError;
pub use hierarchy::{HierarchyNode, HierarchyTable};
pub use model::{NodeChannelOverride, PaymentChannel, PlanChannelRate, RatePlan};
pub use payout::{PayoutChargeConfig, PayoutChargeRecord, PayoutScope, PayoutSlab};
pub use resolver::{CostBasis, EffectiveRate, PricingQuote, RateResolver, RateSource, TierCost};
pub use routing::{PayoutRoutingConfig, PayoutRoutingVersion};
pub use seed::DirectorySeed;
