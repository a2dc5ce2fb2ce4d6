pub mod allowance;
pub mod leaderboard;
pub mod positions;
pub mod vault;
