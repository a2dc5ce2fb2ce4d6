use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// A single lockup position as returned by `positions(id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: U256,
    pub owner: Address,
    pub amount_deposited: U256,
    pub donation_bps: u16,
    pub lockup_end: U256,
}

impl Position {
    pub fn is_locked(&self, now: i64) -> bool {
        if now < 0 {
            return true;
        }
        U256::from(now as u64) < self.lockup_end
    }

    pub fn donation_percent(&self) -> f64 {
        f64::from(self.donation_bps) / 100.0
    }
}
