use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a reseller tier (a user acting as platform, partner, distributor or retailer).
    NodeId
);
string_id!(
    /// Identifier of a payment channel within a gateway.
    ChannelId
);
string_id!(
    /// Identifier of a payment gateway (an opaque settlement event source).
    GatewayId
);
string_id!(
    /// Identifier of a rate plan ("schema").
    PlanId
);

/// Unique identifier for a transaction or any other ledger reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub uuid::Uuid);

impl TransactionId {
    /// Create a new time-ordered id (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidId(format!("{s}: {e}")))
    }
}

/// Reseller tiers, ordered from the root of the hierarchy downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Platform,
    WhiteLabel,
    MasterDistributor,
    Distributor,
    Retailer,
}

impl Role {
    /// Number of tiers; also the longest possible ancestor chain.
    pub const COUNT: usize = 5;

    /// Position in the hierarchy. A parent always has a strictly smaller rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Platform => 0,
            Self::WhiteLabel => 1,
            Self::MasterDistributor => 2,
            Self::Distributor => 3,
            Self::Retailer => 4,
        }
    }

    /// Whether `self` may sit directly above `child`.
    pub fn can_parent(&self, child: Role) -> bool {
        self.rank() < child.rank()
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Platform => "PLATFORM",
            Self::WhiteLabel => "WHITE_LABEL",
            Self::MasterDistributor => "MASTER_DISTRIBUTOR",
            Self::Distributor => "DISTRIBUTOR",
            Self::Retailer => "RETAILER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLATFORM" => Ok(Self::Platform),
            "WHITE_LABEL" => Ok(Self::WhiteLabel),
            "MASTER_DISTRIBUTOR" => Ok(Self::MasterDistributor),
            "DISTRIBUTOR" => Ok(Self::Distributor),
            "RETAILER" => Ok(Self::Retailer),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

/// Account status of a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Active,
    Suspended,
}

/// Money in minor currency units (paise).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Minor units per major unit.
    pub const MINOR_PER_MAJOR: u64 = 100;

    pub fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    /// Whole rupees.
    pub fn from_major(major: u64) -> Self {
        Self(major.saturating_mul(Self::MINOR_PER_MAJOR))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Parse a decimal major-unit string such as `"75000"` or `"12.50"`.
    pub fn parse_major(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }
        let whole: u64 = whole
            .parse()
            .map_err(|_| CoreError::InvalidAmount(s.to_string()))?;
        let frac_minor: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<2}");
            padded
                .parse()
                .map_err(|_| CoreError::InvalidAmount(s.to_string()))?
        };
        whole
            .checked_mul(Self::MINOR_PER_MAJOR)
            .and_then(|v| v.checked_add(frac_minor))
            .map(Amount)
            .ok_or_else(|| CoreError::Overflow(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / Self::MINOR_PER_MAJOR,
            self.0 % Self::MINOR_PER_MAJOR
        )
    }
}

/// A proportional rate in parts per million of the amount.
///
/// `1_000_000` is 100 %, so `1.65 %` is `16_500`. Values above 100 % are
/// rejected on construction and on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Rate(u32);

impl Rate {
    pub const SCALE: u32 = 1_000_000;
    pub const ZERO: Rate = Rate(0);

    pub fn from_ppm(ppm: u32) -> Result<Self, CoreError> {
        if ppm > Self::SCALE {
            return Err(CoreError::InvalidRate(format!(
                "{ppm} ppm exceeds 100%"
            )));
        }
        Ok(Self(ppm))
    }

    /// Basis points (1 bp = 0.01 %).
    pub fn from_bps(bps: u32) -> Result<Self, CoreError> {
        bps.checked_mul(100)
            .ok_or_else(|| CoreError::InvalidRate(format!("{bps} bps")))
            .and_then(Self::from_ppm)
    }

    /// Parse a percentage with up to four decimals, e.g. `"1.65"`.
    pub fn parse_percent(s: &str) -> Result<Self, CoreError> {
        let s = s.trim().trim_end_matches('%');
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 4 {
            return Err(CoreError::InvalidRate(s.to_string()));
        }
        let whole: u32 = whole
            .parse()
            .map_err(|_| CoreError::InvalidRate(s.to_string()))?;
        let frac_ppm: u32 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<4}")
                .parse()
                .map_err(|_| CoreError::InvalidRate(s.to_string()))?
        };
        whole
            .checked_mul(10_000)
            .and_then(|v| v.checked_add(frac_ppm))
            .ok_or_else(|| CoreError::InvalidRate(s.to_string()))
            .and_then(Self::from_ppm)
    }

    pub fn ppm(&self) -> u32 {
        self.0
    }

    /// The charge this rate levies on `amount`, rounded up to the next minor unit.
    pub fn apply(&self, amount: Amount) -> Amount {
        let charge = (amount.0 as u128 * self.0 as u128).div_ceil(Self::SCALE as u128);
        // ppm never exceeds SCALE, so the charge never exceeds the amount.
        Amount(charge as u64)
    }
}

impl TryFrom<u32> for Rate {
    type Error = CoreError;

    fn try_from(ppm: u32) -> Result<Self, Self::Error> {
        Self::from_ppm(ppm)
    }
}

impl From<Rate> for u32 {
    fn from(rate: Rate) -> u32 {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}%", self.0 / 10_000, self.0 % 10_000)
    }
}

/// Direction of money movement through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnKind {
    Payin,
    Payout,
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payin => write!(f, "PAYIN"),
            Self::Payout => write!(f, "PAYOUT"),
        }
    }
}

impl FromStr for TxnKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PAYIN" => Ok(Self::Payin),
            "PAYOUT" => Ok(Self::Payout),
            _ => Err(CoreError::UnknownKind(s.to_string())),
        }
    }
}

/// Payment instrument family of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCategory {
    Upi,
    Card,
    Wallet,
    Netbanking,
    Imps,
    Neft,
    Rtgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardNetwork {
    Visa,
    Mastercard,
    Rupay,
    Amex,
    Diners,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Credit,
    Debit,
    Prepaid,
    Corporate,
}

/// Per-node permission bits, checked at the API boundary only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const ASSIGN_RATES: Capabilities = Capabilities(1 << 0);
    pub const MANAGE_PAYOUT_CHARGES: Capabilities = Capabilities(1 << 1);
    pub const MANAGE_PLANS: Capabilities = Capabilities(1 << 2);
    pub const SETTLE_TRANSACTIONS: Capabilities = Capabilities(1 << 3);
    pub const ADJUST_WALLETS: Capabilities = Capabilities(1 << 4);
    pub const VIEW_WALLETS: Capabilities = Capabilities(1 << 5);
    pub const ALL: Capabilities = Capabilities((1 << 6) - 1);

    const NAMES: [(&'static str, Capabilities); 6] = [
        ("ASSIGN_RATES", Self::ASSIGN_RATES),
        ("MANAGE_PAYOUT_CHARGES", Self::MANAGE_PAYOUT_CHARGES),
        ("MANAGE_PLANS", Self::MANAGE_PLANS),
        ("SETTLE_TRANSACTIONS", Self::SETTLE_TRANSACTIONS),
        ("ADJUST_WALLETS", Self::ADJUST_WALLETS),
        ("VIEW_WALLETS", Self::VIEW_WALLETS),
    ];

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Capabilities) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Capabilities) {
        self.0 &= !other.0;
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, cap)| self.contains(*cap))
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CoreError> {
        let mut caps = Self::NONE;
        for name in names {
            let name = name.as_ref();
            let (_, cap) = Self::NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .ok_or_else(|| CoreError::UnknownCapability(name.to_string()))?;
            caps.insert(*cap);
        }
        Ok(caps)
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Capabilities(self.0 | rhs.0)
    }
}

impl Serialize for Capabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Self::from_names(&names).map_err(serde::de::Error::custom)
    }
}
