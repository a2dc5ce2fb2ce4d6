pub use self::{
    intent_type::{
        DepositParams, IntentKind, LockupPeriod, Plan, TransactionIntent,
        MAX_DONATION_BPS,
    },
    leaderboard_type::{DonationRecord, LeaderboardRow},
    position_type::Position,
    receipt_type::{TxReceipt, TxStatus},
    vault_event_type::{u256_topic, DecodedLog, EventKind, VaultEvent},
};

mod intent_type;
mod leaderboard_type;
mod position_type;
mod receipt_type;
mod vault_event_type;
