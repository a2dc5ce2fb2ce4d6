//! CLI module for the vault client
//!
//! Read commands print one of three outcomes: rows, an explicit empty
//! message, or an error. Write commands stream lifecycle notifications.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use ethers::types::{Address, U256};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    configuration::{
        get_configuration, parse_address, set_configuration, AppState, Config,
        State,
    },
    controller::{NotificationKind, TransactionController, TxEvent},
    error::Error,
    handler::{
        allowance::{get_allowance, required_intent},
        leaderboard::get_leaderboard,
        positions::{fetch_position, fetch_user_portfolio},
        vault::fetch_total_assets,
    },
    helpers::{
        format_timestamp, format_token_amount, parse_units, percent_to_bps,
        truncate_hash,
    },
    provider::EthersChainClient,
    types::{
        DepositParams, IntentKind, LockupPeriod, Plan, Position,
        TransactionIntent,
    },
};

/// Yield vault client
#[derive(Parser)]
#[command(name = "yield-vault")]
#[command(about = "Query and operate a yield-and-donation vault", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Network to use instead of CHAIN_ID
    #[arg(long, global = true)]
    pub chain: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List open positions of an owner
    Positions {
        /// Owner address, defaults to ACCOUNT
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show one position
    Position { id: String },

    /// Donor ranking by total donated
    Leaderboard {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Total value locked in the vault
    Tvl,

    /// Token allowance granted to the vault
    Allowance {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Approve the vault to spend the token
    Approve,

    /// Deposit into the vault
    Deposit {
        /// Token amount, e.g. 100.50
        #[arg(long)]
        amount: String,

        /// Share of the yield donated, in percent
        #[arg(long, default_value = "10")]
        donation: u16,

        /// 3m, 6m or 12m
        #[arg(long, default_value = "3m")]
        lockup: String,

        /// basic, standard or premium
        #[arg(long, default_value = "basic")]
        plan: String,
    },

    /// Withdraw an unlocked position
    Withdraw { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Initialize configuration and return Config
pub fn init_config() -> Result<Config, Error> {
    set_configuration()?;
    get_configuration()
}

pub async fn init_state(
    chain: Option<u64>,
) -> Result<(AppState<State<EthersChainClient>>, u64), Error> {
    let config = init_config()?;
    let chain_id = chain.unwrap_or(config.chain_id);
    config.networks.get(chain_id)?;

    let clients = EthersChainClient::connect_all(&config);
    let state = AppState::new(State::new(config, clients));

    state
        .client(chain_id)?
        .check_chain_id()
        .await
        .context(format!("RPC endpoint of chain {} is unusable", chain_id))?;

    Ok((state, chain_id))
}

pub async fn run(cli: Cli) -> Result<(), Error> {
    let (state, chain_id) = init_state(cli.chain).await?;
    let decimals = state.config.token_decimals;

    match cli.command {
        Commands::Positions { owner } => {
            let owner = owner_or_account(&state.config, owner)?;
            let portfolio = fetch_user_portfolio(&state, chain_id, owner).await?;

            if portfolio.is_empty() {
                println!("No open positions for {:?}", owner);
                return Ok(());
            }

            let now = Utc::now().timestamp();
            for position in &portfolio {
                println!("{}", render_position(position, decimals, now)?);
            }
        },
        Commands::Position { id } => {
            let id = parse_id(&id)?;
            match fetch_position(&state, chain_id, id).await? {
                Some(position) => {
                    let now = Utc::now().timestamp();
                    println!("{}", render_position(&position, decimals, now)?);
                    println!("  owner:     {:?}", position.owner);
                },
                None => println!("Position #{} not found", id),
            }
        },
        Commands::Leaderboard { format } => {
            let rows = get_leaderboard(&state, chain_id).await?;

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if rows.is_empty() {
                println!("No donations yet");
                return Ok(());
            }

            for row in rows {
                println!(
                    "{:>4}  {:?}  {}",
                    row.rank,
                    row.donor,
                    format_token_amount(&row.total_donated, decimals)?
                );
            }
        },
        Commands::Tvl => match fetch_total_assets(&state, chain_id).await? {
            Some(total) => {
                println!("{}", format_token_amount(&total, decimals)?)
            },
            None => println!("Vault is not deployed on chain {}", chain_id),
        },
        Commands::Allowance { owner } => {
            let owner = owner_or_account(&state.config, owner)?;
            let allowance = get_allowance(&state, chain_id, owner).await?;
            if allowance == U256::MAX {
                println!("unlimited");
            } else {
                println!("{}", format_token_amount(&allowance, decimals)?);
            }
        },
        Commands::Approve => {
            execute(&state, chain_id, TransactionIntent::Approve).await?;
        },
        Commands::Deposit {
            amount,
            donation,
            lockup,
            plan,
        } => {
            let params = DepositParams {
                amount: parse_units(&amount, decimals)?,
                donation_bps: percent_to_bps(donation)?,
                lockup: lockup.parse::<LockupPeriod>()?,
                plan: plan.parse::<Plan>()?,
            };

            let account = state.config.require_account()?;
            let allowance = get_allowance(&state, chain_id, account).await?;
            check_allowance(allowance, params.amount, decimals)?;

            execute(&state, chain_id, TransactionIntent::Deposit(params))
                .await?;
        },
        Commands::Withdraw { id } => {
            let id = parse_id(&id)?;
            let position = fetch_position(&state, chain_id, id)
                .await?
                .ok_or_else(|| {
                    Error::ValidationError(format!("Position #{} not found", id))
                })?;

            execute(&state, chain_id, TransactionIntent::Withdraw { position })
                .await?;
        },
    }

    Ok(())
}

async fn execute(
    state: &AppState<State<EthersChainClient>>,
    chain_id: u64,
    intent: TransactionIntent,
) -> Result<(), Error> {
    let account = state.config.require_account()?;
    let controller = TransactionController::new(state.clone(), chain_id, account);
    let mut events = controller.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TxEvent::Notification(n)) => {
                    let line = match &n.description {
                        Some(d) => format!("{}: {}", n.title, d),
                        None => n.title.clone(),
                    };
                    match n.kind {
                        NotificationKind::Error => warn!("{}", line),
                        _ => info!("{}", line),
                    }
                },
                Ok(TxEvent::StateChanged(tx_state)) => {
                    debug!("State {:?}", tx_state);
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} lifecycle events", skipped);
                },
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = controller.submit(intent).await;
    drop(controller);
    printer.await?;

    let receipt = result?;
    println!(
        "Confirmed {} in block {}",
        truncate_hash(&receipt.transaction_hash),
        receipt
            .block_number
            .map(|b| b.to_string())
            .unwrap_or_else(|| String::from("?"))
    );

    Ok(())
}

fn owner_or_account(
    config: &Config,
    owner: Option<String>,
) -> Result<Address, Error> {
    match owner {
        Some(owner) => parse_address(&owner),
        None => config.require_account(),
    }
}

/// One position as printed by `positions` and `position`.
fn render_position(
    position: &Position,
    decimals: u32,
    now: i64,
) -> Result<String, Error> {
    let status = if position.is_locked(now) {
        "locked"
    } else {
        "withdrawable"
    };

    Ok(format!(
        "#{}  {}  donation {}%  unlocks {}  [{}]",
        position.id,
        format_token_amount(&position.amount_deposited, decimals)?,
        position.donation_percent(),
        format_timestamp(position.lockup_end)?,
        status
    ))
}

/// A deposit above the allowance would be rejected, so stop before any
/// transaction is built.
fn check_allowance(
    allowance: U256,
    amount: U256,
    decimals: u32,
) -> Result<(), Error> {
    if required_intent(allowance, amount) == IntentKind::Deposit {
        return Ok(());
    }

    Err(Error::ValidationError(format!(
        "Allowance {} is below the deposit amount {}, run `approve` first",
        format_token_amount(&allowance, decimals)?,
        format_token_amount(&amount, decimals)?
    )))
}

fn parse_id(value: &str) -> Result<U256, Error> {
    U256::from_dec_str(value).map_err(|_| {
        Error::ValidationError(format!("Invalid position id {}", value))
    })
}
