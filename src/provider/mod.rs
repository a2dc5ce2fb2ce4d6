//! Chain access used by the rest of the crate.
//!
//! Everything that talks to a ledger goes through [`ChainClient`]; the
//! reconstructors and the transaction controller never see the transport.

pub use self::{
    abi::{
        decode_log, decode_output, encode_call, token_to_address,
        token_to_u16, token_to_u256,
    },
    ethers_client::EthersChainClient,
};

#[cfg(test)]
pub use self::mock::MockChainClient;

mod abi;
mod ethers_client;
#[cfg(test)]
mod mock;

use async_trait::async_trait;
use ethers::{
    abi::Token,
    types::{Address, TxHash, H256},
};

use crate::{
    error::Error,
    types::{DecodedLog, EventKind, TxReceipt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Vault,
    Leaderboard,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContractRef {
    pub kind: ContractKind,
    pub address: Address,
}

impl ContractRef {
    pub fn new(kind: ContractKind, address: Address) -> Self {
        Self { kind, address }
    }
}

/// Inclusive block range; `to: None` means the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockRange {
    pub fn from_block(from: u64) -> Self {
        Self { from, to: None }
    }

    pub fn contains(&self, block: Option<u64>) -> bool {
        match block {
            Some(b) => b >= self.from && self.to.map_or(true, |to| b <= to),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event: EventKind,
    /// Filters on indexed arguments, `topics[0]` is topic1.
    pub topics: [Option<H256>; 2],
    pub range: BlockRange,
}

impl LogQuery {
    pub fn new(address: Address, event: EventKind, range: BlockRange) -> Self {
        Self {
            address,
            event,
            topics: [None; 2],
            range,
        }
    }

    pub fn topic1(mut self, value: H256) -> Self {
        self.topics[0] = Some(value);
        self
    }

    pub fn topic2(mut self, value: H256) -> Self {
        self.topics[1] = Some(value);
        self
    }

    pub fn matches(&self, log: &DecodedLog) -> bool {
        if log.event.kind() != self.event || !self.range.contains(log.block_number)
        {
            return false;
        }

        self.topics.iter().enumerate().all(|(index, topic)| match topic {
            Some(expected) => {
                log.event.indexed_topic(index + 1) == Some(*expected)
            },
            None => true,
        })
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn read_call(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, Error>;

    async fn get_logs(&self, query: &LogQuery)
        -> Result<Vec<DecodedLog>, Error>;

    async fn send_transaction(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<TxHash, Error>;

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, Error>;
}
