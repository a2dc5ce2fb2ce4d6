use ethers::{
    abi::{parse_abi, Abi, Log, RawLog, Token},
    types::{Address, Bytes, H256, U256},
};

use crate::{
    error::Error,
    provider::ContractKind,
    types::{EventKind, VaultEvent},
};

const VAULT_ABI: &[&str] = &[
    "event Deposited(uint256 indexed positionId, address indexed receiver)",
    "event Withdrawn(uint256 indexed positionId)",
    "function positions(uint256 positionId) external view returns (address owner, uint256 amountDeposited, uint256 reserved, uint16 donationBps, uint256 lockupEndTimestamp)",
    "function totalAssets() external view returns (uint256)",
    "function deposit(uint256 amount, uint16 donationBps, uint256 lockDuration, uint8 planId, address receiver) external returns (uint256)",
    "function withdraw(uint256 positionId, address receiver) external",
];

const LEADERBOARD_ABI: &[&str] = &[
    "event DonationNotified(address indexed donor, uint256 amount, uint8 planId)",
];

const TOKEN_ABI: &[&str] = &[
    "function allowance(address owner, address spender) external view returns (uint256)",
    "function approve(address spender, uint256 value) external returns (bool)",
];

fn contract_abi(kind: ContractKind) -> Result<Abi, Error> {
    let signatures = match kind {
        ContractKind::Vault => VAULT_ABI,
        ContractKind::Leaderboard => LEADERBOARD_ABI,
        ContractKind::Token => TOKEN_ABI,
    };
    parse_abi(signatures).map_err(|e| Error::AbiError(e.to_string()))
}

fn event_contract(kind: EventKind) -> ContractKind {
    match kind {
        EventKind::Deposited | EventKind::Withdrawn => ContractKind::Vault,
        EventKind::DonationNotified => ContractKind::Leaderboard,
    }
}

pub fn encode_call(
    kind: ContractKind,
    function: &str,
    args: &[Token],
) -> Result<Bytes, Error> {
    let abi = contract_abi(kind)?;
    let function = abi
        .function(function)
        .map_err(|e| Error::AbiError(e.to_string()))?;
    let data = function
        .encode_input(args)
        .map_err(|e| Error::AbiError(e.to_string()))?;
    Ok(Bytes::from(data))
}

pub fn decode_output(
    kind: ContractKind,
    function: &str,
    data: &[u8],
) -> Result<Vec<Token>, Error> {
    let abi = contract_abi(kind)?;
    let function = abi
        .function(function)
        .map_err(|e| Error::AbiError(e.to_string()))?;
    function
        .decode_output(data)
        .map_err(|e| Error::AbiError(e.to_string()))
}

pub fn decode_log(
    kind: EventKind,
    topics: Vec<H256>,
    data: Vec<u8>,
) -> Result<VaultEvent, Error> {
    let abi = contract_abi(event_contract(kind))?;
    let event = abi
        .event(kind.name())
        .map_err(|e| Error::AbiError(e.to_string()))?;
    let log = event
        .parse_log(RawLog { topics, data })
        .map_err(|e| Error::AbiError(e.to_string()))?;

    let event = match kind {
        EventKind::Deposited => VaultEvent::Deposited {
            position_id: token_to_u256(log_param(&log, "positionId")?)?,
            receiver: token_to_address(log_param(&log, "receiver")?)?,
        },
        EventKind::Withdrawn => VaultEvent::Withdrawn {
            position_id: token_to_u256(log_param(&log, "positionId")?)?,
        },
        EventKind::DonationNotified => VaultEvent::DonationNotified {
            donor: token_to_address(log_param(&log, "donor")?)?,
            amount: token_to_u256(log_param(&log, "amount")?)?,
            plan_id: token_to_u8(log_param(&log, "planId")?)?,
        },
    };

    Ok(event)
}

fn log_param<'a>(log: &'a Log, name: &str) -> Result<&'a Token, Error> {
    log.params
        .iter()
        .find(|param| param.name == name)
        .map(|param| &param.value)
        .ok_or(Error::FieldNotExist(String::from(name)))
}

pub fn token_to_u256(token: &Token) -> Result<U256, Error> {
    match token {
        Token::Uint(value) => Ok(*value),
        t => Err(Error::AbiError(format!("expected uint, got {:?}", t))),
    }
}

pub fn token_to_address(token: &Token) -> Result<Address, Error> {
    match token {
        Token::Address(value) => Ok(*value),
        t => Err(Error::AbiError(format!("expected address, got {:?}", t))),
    }
}

pub fn token_to_u16(token: &Token) -> Result<u16, Error> {
    let value = token_to_u256(token)?;
    if value > U256::from(u16::MAX) {
        return Err(Error::AbiError(format!("{} does not fit in u16", value)));
    }
    Ok(value.low_u32() as u16)
}

fn token_to_u8(token: &Token) -> Result<u8, Error> {
    let value = token_to_u256(token)?;
    if value > U256::from(u8::MAX) {
        return Err(Error::AbiError(format!("{} does not fit in u8", value)));
    }
    Ok(value.low_u32() as u8)
}
