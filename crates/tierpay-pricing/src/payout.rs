use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{Amount, CoreError, GatewayId, NodeId, PlanId, Rate};

use crate::error::PricingError;

/// A contiguous amount range with a fixed flat charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSlab {
    pub min: Amount,
    /// Inclusive upper bound; `None` is unbounded.
    #[serde(default)]
    pub max: Option<Amount>,
    pub flat_charge: Amount,
}

impl PayoutSlab {
    pub fn bounded(min: u64, max: u64, flat_charge: u64) -> Self {
        Self {
            min: Amount(min),
            max: Some(Amount(max)),
            flat_charge: Amount(flat_charge),
        }
    }

    pub fn unbounded(min: u64, flat_charge: u64) -> Self {
        Self {
            min: Amount(min),
            max: None,
            flat_charge: Amount(flat_charge),
        }
    }

    pub fn contains(&self, amount: Amount) -> bool {
        amount >= self.min && self.max.map_or(true, |max| amount <= max)
    }
}

/// How a payout is charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutChargeConfig {
    Percentage { rate: Rate },
    Slab { slabs: Vec<PayoutSlab> },
}

impl PayoutChargeConfig {
    /// Check that a slab table partitions `[0, ∞)` with no gap and no overlap.
    pub fn validate(&self) -> Result<(), PricingError> {
        let slabs = match self {
            Self::Percentage { .. } => return Ok(()),
            Self::Slab { slabs } => slabs,
        };

        let (first, last) = match (slabs.first(), slabs.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(PricingError::InvalidSlab("slab list is empty".into())),
        };
        if !first.min.is_zero() {
            return Err(PricingError::SlabGapError(format!(
                "first slab starts at {} instead of 0",
                first.min
            )));
        }
        if last.max.is_some() {
            return Err(PricingError::SlabGapError(
                "last slab must be unbounded".into(),
            ));
        }

        for (i, slab) in slabs.iter().enumerate() {
            if let Some(max) = slab.max {
                if max < slab.min {
                    return Err(PricingError::InvalidSlab(format!(
                        "slab {i} ends at {max} before it starts at {}",
                        slab.min
                    )));
                }
            }
        }

        for (i, pair) in slabs.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let Some(prev_max) = prev.max else {
                return Err(PricingError::InvalidSlab(format!(
                    "slab {i} is unbounded but is not the last slab"
                )));
            };
            let expected = prev_max.0.checked_add(1).ok_or_else(|| {
                PricingError::InvalidSlab(format!("slab {i} ends at the largest amount"))
            })?;
            if next.min.0 < expected {
                return Err(PricingError::InvalidSlab(format!(
                    "slab {} starting at {} overlaps slab {i} ending at {prev_max}",
                    i + 1,
                    next.min
                )));
            }
            if next.min.0 > expected {
                return Err(PricingError::SlabGapError(format!(
                    "no slab covers {} to {}",
                    Amount(expected),
                    Amount(next.min.0 - 1)
                )));
            }
        }

        Ok(())
    }

    /// The charge levied on a payout of `amount`.
    ///
    /// A slab table that has no slab for `amount` is a configuration bug and
    /// fails with `SlabGapError`; no fallback charge is guessed.
    pub fn charge_for(&self, amount: Amount) -> Result<Amount, PricingError> {
        match self {
            Self::Percentage { rate } => Ok(rate.apply(amount)),
            Self::Slab { slabs } => slabs
                .iter()
                .find(|s| s.contains(amount))
                .map(|s| s.flat_charge)
                .ok_or_else(|| {
                    PricingError::SlabGapError(format!("no slab covers amount {amount}"))
                }),
        }
    }

    /// Total deduction from the initiating wallet: the amount plus the charge.
    pub fn total_debit(&self, amount: Amount) -> Result<Amount, PricingError> {
        let charge = self.charge_for(amount)?;
        amount
            .checked_add(charge)
            .ok_or_else(|| CoreError::Overflow(format!("{amount} + {charge}")).into())
    }

    /// An amount at which `self` charges less than `other`, if any exists.
    ///
    /// Both charge functions are piecewise constant or non-decreasing between
    /// slab boundaries, so checking the boundaries of the merged partition is exact.
    pub fn undercut_witness(&self, other: &PayoutChargeConfig) -> Result<Option<Amount>, PricingError> {
        if let (Self::Percentage { rate: mine }, Self::Percentage { rate: theirs }) = (self, other) {
            // At SCALE minor units a rate charges exactly its ppm, so a lower rate shows there.
            return Ok((mine < theirs).then_some(Amount(Rate::SCALE as u64)));
        }

        let mut points = vec![0, u64::MAX];
        for config in [self, other] {
            if let Self::Slab { slabs } = config {
                for slab in slabs {
                    points.push(slab.min.0);
                    points.push(slab.min.0.saturating_sub(1));
                    if let Some(max) = slab.max {
                        points.push(max.0);
                        points.push(max.0.saturating_add(1));
                    }
                }
            }
        }
        points.sort_unstable();
        points.dedup();

        for point in points {
            let amount = Amount(point);
            if self.charge_for(amount)? < other.charge_for(amount)? {
                return Ok(Some(amount));
            }
        }
        Ok(None)
    }

    /// Whether `self` charges at least as much as `other` for every amount.
    pub fn covers(&self, other: &PayoutChargeConfig) -> Result<bool, PricingError> {
        Ok(self.undercut_witness(other)?.is_none())
    }
}

/// Who a payout charge config applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum PayoutScope {
    /// What the gateway charges the platform.
    Gateway,
    Plan(PlanId),
    Node(NodeId),
}

impl std::fmt::Display for PayoutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway => write!(f, "gateway"),
            Self::Plan(plan) => write!(f, "plan:{plan}"),
            Self::Node(node) => write!(f, "node:{node}"),
        }
    }
}

/// A stored payout charge config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutChargeRecord {
    pub scope: PayoutScope,
    pub gateway_id: GatewayId,
    pub config: PayoutChargeConfig,
    #[serde(default)]
    pub assigned_by: Option<NodeId>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rupee_slabs() -> PayoutChargeConfig {
        PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 5_000_000, 1_000),
                PayoutSlab::bounded(5_000_001, 10_000_000, 1_500),
                PayoutSlab::unbounded(10_000_001, 2_000),
            ],
        }
    }

    #[test]
    fn test_slab_charge_and_total_debit() {
        let config = rupee_slabs();
        config.validate().unwrap();
        // ₹75,000 falls in the second slab: ₹15 charge, ₹75,015 deducted.
        let amount = Amount::from_major(75_000);
        assert_eq!(config.charge_for(amount).unwrap(), Amount::from_major(15));
        assert_eq!(config.total_debit(amount).unwrap(), Amount::new(7_501_500));
    }

    #[test]
    fn test_slab_boundaries() {
        let config = rupee_slabs();
        assert_eq!(config.charge_for(Amount::ZERO).unwrap(), Amount(1_000));
        assert_eq!(config.charge_for(Amount(5_000_000)).unwrap(), Amount(1_000));
        assert_eq!(config.charge_for(Amount(5_000_001)).unwrap(), Amount(1_500));
        assert_eq!(config.charge_for(Amount(u64::MAX)).unwrap(), Amount(2_000));
    }

    #[test]
    fn test_percentage_charge_rounds_up() {
        let config = PayoutChargeConfig::Percentage {
            rate: Rate::parse_percent("0.5").unwrap(),
        };
        assert_eq!(config.charge_for(Amount(1_001)).unwrap(), Amount(6));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let config = PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 100, 10),
                PayoutSlab::unbounded(200, 20),
            ],
        };
        assert!(matches!(config.validate(), Err(PricingError::SlabGapError(_))));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let config = PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 100, 10),
                PayoutSlab::unbounded(50, 20),
            ],
        };
        assert!(matches!(config.validate(), Err(PricingError::InvalidSlab(_))));
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let empty = PayoutChargeConfig::Slab { slabs: vec![] };
        assert!(matches!(empty.validate(), Err(PricingError::InvalidSlab(_))));

        let late_start = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::unbounded(100, 10)],
        };
        assert!(matches!(late_start.validate(), Err(PricingError::SlabGapError(_))));

        let bounded_tail = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::bounded(0, 100, 10)],
        };
        assert!(matches!(bounded_tail.validate(), Err(PricingError::SlabGapError(_))));

        let early_unbounded = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::unbounded(0, 10), PayoutSlab::unbounded(101, 20)],
        };
        assert!(matches!(early_unbounded.validate(), Err(PricingError::InvalidSlab(_))));

        let inverted = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::bounded(0, 100, 10), PayoutSlab::bounded(101, 50, 20)],
        };
        assert!(matches!(inverted.validate(), Err(PricingError::InvalidSlab(_))));
    }

    #[test]
    fn test_lookup_on_unvalidated_gap_fails_closed() {
        let config = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::bounded(0, 100, 10)],
        };
        assert!(matches!(
            config.charge_for(Amount(500)),
            Err(PricingError::SlabGapError(_))
        ));
    }

    #[test]
    fn test_undercut_slab_against_slab() {
        let pg_cost = rupee_slabs();
        let cheaper_tail = PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 10_000_000, 1_500),
                PayoutSlab::unbounded(10_000_001, 1_800),
            ],
        };
        assert_eq!(
            cheaper_tail.undercut_witness(&pg_cost).unwrap(),
            Some(Amount(10_000_001))
        );

        let markup = PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 5_000_000, 1_200),
                PayoutSlab::unbounded(5_000_001, 2_500),
            ],
        };
        assert!(markup.covers(&pg_cost).unwrap());
    }

    #[test]
    fn test_undercut_percentage_against_slab() {
        // 0.02% reaches ₹20 only at ₹1,00,000.
        let pct = PayoutChargeConfig::Percentage {
            rate: Rate::from_ppm(200).unwrap(),
        };
        let flat = PayoutChargeConfig::Slab {
            slabs: vec![PayoutSlab::unbounded(0, 2_000)],
        };
        assert_eq!(pct.undercut_witness(&flat).unwrap(), Some(Amount::ZERO));
        // The flat charge loses to the percentage on large amounts.
        assert_eq!(flat.undercut_witness(&pct).unwrap(), Some(Amount(u64::MAX)));
    }

    #[test]
    fn test_undercut_percentage_against_percentage() {
        let low = PayoutChargeConfig::Percentage { rate: Rate::from_bps(10).unwrap() };
        let high = PayoutChargeConfig::Percentage { rate: Rate::from_bps(12).unwrap() };
        assert!(high.covers(&low).unwrap());
        assert!(low.covers(&low).unwrap());
        let witness = low.undercut_witness(&high).unwrap().unwrap();
        assert!(low.charge_for(witness).unwrap() < high.charge_for(witness).unwrap());
    }

    #[test]
    fn test_config_serde_tagged() {
        let json = serde_json::to_string(&PayoutChargeConfig::Percentage {
            rate: Rate::from_bps(25).unwrap(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"percentage","rate":2500}"#);

        let scope: PayoutScope = serde_json::from_str(r#"{"scope":"plan","id":"gold"}"#).unwrap();
        assert_eq!(scope, PayoutScope::Plan("gold".into()));
        let scope: PayoutScope = serde_json::from_str(r#"{"scope":"gateway"}"#).unwrap();
        assert_eq!(scope, PayoutScope::Gateway);
    }

    fn slab_table() -> impl Strategy<Value = PayoutChargeConfig> {
        prop::collection::btree_set(1u64..10_000_000, 0..6).prop_flat_map(|cuts| {
            let cuts: Vec<u64> = cuts.into_iter().collect();
            let n = cuts.len() + 1;
            prop::collection::vec(0u64..5_000, n).prop_map(move |charges| {
                let mut slabs = Vec::with_capacity(n);
                let mut start = 0u64;
                for (i, charge) in charges.iter().enumerate() {
                    match cuts.get(i) {
                        Some(&cut) => {
                            slabs.push(PayoutSlab::bounded(start, cut - 1, *charge));
                            start = cut;
                        }
                        None => slabs.push(PayoutSlab::unbounded(start, *charge)),
                    }
                }
                PayoutChargeConfig::Slab { slabs }
            })
        })
    }

    proptest! {
        #[test]
        fn property_valid_slabs_partition_amounts(config in slab_table(), amount in 0u64..20_000_000) {
            prop_assert!(config.validate().is_ok());
            if let PayoutChargeConfig::Slab { slabs } = &config {
                let hits = slabs.iter().filter(|s| s.contains(Amount(amount))).count();
                prop_assert_eq!(hits, 1);
            }
            prop_assert!(config.charge_for(Amount(amount)).is_ok());
        }

        #[test]
        fn property_covers_holds_pointwise(
            a in slab_table(),
            b in slab_table(),
            probes in prop::collection::vec(0u64..20_000_000, 32),
        ) {
            if a.covers(&b).unwrap() {
                for x in probes {
                    prop_assert!(a.charge_for(Amount(x)).unwrap() >= b.charge_for(Amount(x)).unwrap());
                }
            } else {
                let w = a.undercut_witness(&b).unwrap().unwrap();
                prop_assert!(a.charge_for(w).unwrap() < b.charge_for(w).unwrap());
            }
        }
    }
}
