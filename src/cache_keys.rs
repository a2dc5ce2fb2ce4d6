//! Centralized cache key constants
//!
//! Every key starts with `<query>_<chain>_` so a confirmed transaction can
//! drop everything derived for its chain in one pass.

use ethers::types::Address;

pub const POSITIONS: &str = "positions";
pub const LEADERBOARD: &str = "leaderboard";
pub const ALLOWANCE: &str = "allowance";

pub fn chain_prefix(query: &str, chain_id: u64) -> String {
    format!("{}_{}_", query, chain_id)
}

pub fn positions(chain_id: u64, owner: &Address) -> String {
    format!("{}{:?}", chain_prefix(POSITIONS, chain_id), owner)
}

pub fn leaderboard(chain_id: u64) -> String {
    format!("{}all", chain_prefix(LEADERBOARD, chain_id))
}

pub fn allowance(chain_id: u64, owner: &Address) -> String {
    format!("{}{:?}", chain_prefix(ALLOWANCE, chain_id), owner)
}
