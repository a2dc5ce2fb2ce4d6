use std::collections::HashMap;

use ethers::{
    abi::Token,
    types::{Address, U256},
};

use crate::{
    configuration::{AppState, Config, Deployment, NetworkRegistry, State},
    provider::MockChainClient,
    types::{DecodedLog, VaultEvent},
};

pub const CHAIN_ID: u64 = 11155111;
pub const UNDEPLOYED_CHAIN_ID: u64 = 1;
pub const UNKNOWN_CHAIN_ID: u64 = 42;

pub fn vault_address() -> Address {
    Address::from_low_u64_be(0xa1)
}

pub fn leaderboard_address() -> Address {
    Address::from_low_u64_be(0xb2)
}

pub fn token_address() -> Address {
    Address::from_low_u64_be(0xc3)
}

pub fn owner_a() -> Address {
    Address::from_low_u64_be(0x1000)
}

pub fn owner_b() -> Address {
    Address::from_low_u64_be(0x2000)
}

pub fn owner_c() -> Address {
    Address::from_low_u64_be(0x3000)
}

pub fn test_config() -> Config {
    let mut networks = NetworkRegistry::new();
    networks.insert(
        CHAIN_ID,
        Deployment {
            vault: vault_address(),
            leaderboard: leaderboard_address(),
            token: token_address(),
        },
    );
    networks.insert(
        UNDEPLOYED_CHAIN_ID,
        Deployment {
            vault: Address::zero(),
            leaderboard: Address::zero(),
            token: Address::zero(),
        },
    );

    Config {
        chain_id: CHAIN_ID,
        networks,
        rpc_urls: HashMap::new(),
        account: Some(owner_a()),
        token_decimals: 6,
        from_block: 0,
        positions_stale_time: 15,
        leaderboard_stale_time: 60,
        allowance_poll_interval: 10,
        receipt_poll_interval: 10,
        receipt_timeout: None,
    }
}

pub fn test_state_with(
    config: Config,
    client: MockChainClient,
) -> State<MockChainClient> {
    let mut clients = HashMap::new();
    clients.insert(CHAIN_ID, client);
    State::new(config, clients)
}

pub fn test_state(client: MockChainClient) -> State<MockChainClient> {
    test_state_with(test_config(), client)
}

pub fn test_app_state(
    client: MockChainClient,
) -> AppState<State<MockChainClient>> {
    AppState::new(test_state(client))
}

pub fn deposited(id: u64, receiver: Address) -> DecodedLog {
    DecodedLog::new(VaultEvent::Deposited {
        position_id: U256::from(id),
        receiver,
    })
}

pub fn withdrawn(id: u64) -> DecodedLog {
    DecodedLog::new(VaultEvent::Withdrawn {
        position_id: U256::from(id),
    })
}

pub fn donation(donor: Address, amount: u64) -> DecodedLog {
    DecodedLog::new(VaultEvent::DonationNotified {
        donor,
        amount: U256::from(amount),
        plan_id: 0,
    })
}

/// Output tokens of `positions(id)`.
pub fn position_output(
    owner: Address,
    amount: u64,
    donation_bps: u64,
    lockup_end: u64,
) -> Vec<Token> {
    vec![
        Token::Address(owner),
        Token::Uint(U256::from(amount)),
        Token::Uint(U256::zero()),
        Token::Uint(U256::from(donation_bps)),
        Token::Uint(U256::from(lockup_end)),
    ]
}
