use tierpay_core::Amount;
use tierpay_pricing::PricingQuote;

use crate::error::SettlementError;
use crate::types::{CommissionShare, EntryKind, Posting};

/// Splits a transaction's margin across the tiers above the initiator.
pub struct CommissionDistributor;

impl CommissionDistributor {
    /// One share per ancestor, nearest first, including the root.
    ///
    /// A tier earns the difference between what it charges the tier below and
    /// what it is charged itself. Every term is already rounded, so
    /// `sum(shares) + base_portion == billed` holds exactly.
    pub fn distribute(quote: &PricingQuote) -> Result<Vec<CommissionShare>, SettlementError> {
        quote
            .tiers
            .windows(2)
            .map(|pair| {
                let (below, tier) = (&pair[0], &pair[1]);
                let amount = below.cost.checked_sub(tier.cost).ok_or_else(|| {
                    SettlementError::InvalidSnapshot(format!(
                        "{} is charged {} but charges {} only {}",
                        tier.node_id, tier.cost, below.node_id, below.cost
                    ))
                })?;
                Ok(CommissionShare {
                    node_id: tier.node_id.clone(),
                    role: tier.role,
                    amount,
                })
            })
            .collect()
    }

    /// COMMISSION postings for every share that earns something.
    pub fn postings(shares: &[CommissionShare]) -> Vec<Posting> {
        shares
            .iter()
            .filter(|s| !s.amount.is_zero())
            .map(|s| Posting::new(s.node_id.clone(), EntryKind::Commission, s.amount))
            .collect()
    }

    pub fn total(shares: &[CommissionShare]) -> Option<Amount> {
        shares
            .iter()
            .try_fold(Amount::ZERO, |acc, s| acc.checked_add(s.amount))
    }
}
