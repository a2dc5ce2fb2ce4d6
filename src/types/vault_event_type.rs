use std::fmt;

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Events consumed from the vault and leaderboard contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Deposited,
    Withdrawn,
    DonationNotified,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Deposited => "Deposited",
            EventKind::Withdrawn => "Withdrawn",
            EventKind::DonationNotified => "DonationNotified",
        }
    }

    /// Canonical signature, hashed into topic0.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Deposited => "Deposited(uint256,address)",
            EventKind::Withdrawn => "Withdrawn(uint256)",
            EventKind::DonationNotified => "DonationNotified(address,uint256,uint8)",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    Deposited {
        position_id: U256,
        receiver: Address,
    },
    Withdrawn {
        position_id: U256,
    },
    DonationNotified {
        donor: Address,
        amount: U256,
        plan_id: u8,
    },
}

impl VaultEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            VaultEvent::Deposited { .. } => EventKind::Deposited,
            VaultEvent::Withdrawn { .. } => EventKind::Withdrawn,
            VaultEvent::DonationNotified { .. } => EventKind::DonationNotified,
        }
    }

    /// Value of the indexed argument stored in `topics[index]`, 1-based
    /// like on the wire (topic0 is the signature hash).
    pub fn indexed_topic(&self, index: usize) -> Option<H256> {
        match (self, index) {
            (VaultEvent::Deposited { position_id, .. }, 1)
            | (VaultEvent::Withdrawn { position_id }, 1) => {
                Some(u256_topic(*position_id))
            },
            (VaultEvent::Deposited { receiver, .. }, 2) => {
                Some(H256::from(*receiver))
            },
            (VaultEvent::DonationNotified { donor, .. }, 1) => {
                Some(H256::from(*donor))
            },
            _ => None,
        }
    }
}

pub fn u256_topic(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    H256::from(bytes)
}

/// A decoded log together with the chain coordinates it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedLog {
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<H256>,
    pub event: VaultEvent,
}

impl DecodedLog {
    pub fn new(event: VaultEvent) -> Self {
        Self {
            block_number: None,
            log_index: None,
            transaction_hash: None,
            event,
        }
    }
}
