use std::{fmt, str::FromStr};

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::{error::Error, types::Position};

pub const MAX_DONATION_BPS: u16 = 10_000;

/// Lock-in periods offered by the vault, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockupPeriod {
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl LockupPeriod {
    pub fn seconds(&self) -> u64 {
        match self {
            LockupPeriod::ThreeMonths => 7_889_400,
            LockupPeriod::SixMonths => 15_778_800,
            LockupPeriod::TwelveMonths => 31_557_600,
        }
    }
}

impl FromStr for LockupPeriod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "3m" => Ok(LockupPeriod::ThreeMonths),
            "6m" => Ok(LockupPeriod::SixMonths),
            "12m" => Ok(LockupPeriod::TwelveMonths),
            p => Err(Error::ValidationError(format!(
                "lockup '{}'. Valid options: 3m, 6m, 12m",
                p
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Basic,
    Standard,
    Premium,
}

impl Plan {
    pub fn id(&self) -> u8 {
        match self {
            Plan::Basic => 0,
            Plan::Standard => 1,
            Plan::Premium => 2,
        }
    }
}

impl FromStr for Plan {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "basic" | "0" => Ok(Plan::Basic),
            "standard" | "1" => Ok(Plan::Standard),
            "premium" | "2" => Ok(Plan::Premium),
            p => Err(Error::ValidationError(format!(
                "plan '{}'. Valid options: basic, standard, premium",
                p
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositParams {
    /// Raw token units.
    pub amount: U256,
    pub donation_bps: u16,
    pub lockup: LockupPeriod,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionIntent {
    /// Always requests the maximum allowance for the vault.
    Approve,
    Deposit(DepositParams),
    Withdraw { position: Position },
}

impl TransactionIntent {
    pub fn kind(&self) -> IntentKind {
        match self {
            TransactionIntent::Approve => IntentKind::Approve,
            TransactionIntent::Deposit(_) => IntentKind::Deposit,
            TransactionIntent::Withdraw { .. } => IntentKind::Withdraw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    Approve,
    Deposit,
    Withdraw,
}

impl IntentKind {
    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::Approve => "approval",
            IntentKind::Deposit => "deposit",
            IntentKind::Withdraw => "withdrawal",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            IntentKind::Approve => "Approval",
            IntentKind::Deposit => "Deposit",
            IntentKind::Withdraw => "Withdrawal",
        };
        write!(f, "{}", name)
    }
}
