use std::time::Duration;

use chrono::Utc;
use ethers::{
    abi::Token,
    types::{Address, H256, U256},
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, warn};

use crate::{
    configuration::{AppState, Deployment, State},
    error::Error,
    handler::allowance::{fetch_allowance, needs_approval},
    helpers::truncate_hash,
    provider::{ChainClient, ContractKind, ContractRef},
    types::{
        DepositParams, IntentKind, TransactionIntent, TxReceipt,
        MAX_DONATION_BPS,
    },
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Submitting(IntentKind),
    Pending(H256),
    Confirmed(TxReceipt),
    Failed(String),
}

impl TxState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TxState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Loading,
    Success,
    Error,
}

/// User-facing message. Rendering is left to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    fn new(kind: NotificationKind, title: String) -> Self {
        Self {
            kind,
            title,
            description: None,
        }
    }

    fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    StateChanged(TxState),
    Notification(Notification),
}

/// Drives one intent at a time through
/// `Idle -> Submitting -> Pending -> Confirmed | Failed -> Idle`.
#[derive(Debug)]
pub struct TransactionController<C> {
    app: AppState<State<C>>,
    chain_id: u64,
    account: Address,
    in_flight: Mutex<()>,
    current: watch::Sender<TxState>,
    events: broadcast::Sender<TxEvent>,
}

impl<C: ChainClient> TransactionController<C> {
    pub fn new(app: AppState<State<C>>, chain_id: u64, account: Address) -> Self {
        let (current, _) = watch::channel(TxState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            app,
            chain_id,
            account,
            in_flight: Mutex::new(()),
            current,
            events,
        }
    }

    pub fn state(&self) -> TxState {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<TxState> {
        self.current.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    pub async fn submit(
        &self,
        intent: TransactionIntent,
    ) -> Result<TxReceipt, Error> {
        let _guard = self.in_flight.try_lock().map_err(|_| Error::BusyError)?;

        let deployment = *self.app.deployment(self.chain_id)?;
        check_deployment(&intent, &deployment, self.chain_id)?;
        validate_intent(&intent, self.account, Utc::now().timestamp())?;

        if let TransactionIntent::Deposit(params) = &intent {
            let allowance =
                fetch_allowance(&self.app, self.chain_id, self.account).await?;
            if needs_approval(allowance, params.amount) {
                return Err(Error::ValidationError(format!(
                    "Allowance {} is below deposit amount {}, approve first",
                    allowance, params.amount
                )));
            }
        }

        let client = self.app.client(self.chain_id)?;
        let (contract, function, args) =
            build_call(&intent, &deployment, self.account);
        let kind = intent.kind();

        self.transition(TxState::Submitting(kind));
        self.notify(Notification::new(
            NotificationKind::Loading,
            format!("Sending {} transaction...", kind.label()),
        ));

        let hash = match client.send_transaction(&contract, function, args).await
        {
            Ok(hash) => hash,
            Err(e) => {
                error!("{} submission failed: {}", kind, e);
                let message = e.to_string();
                self.transition(TxState::Failed(message.clone()));
                self.notify(
                    Notification::new(
                        NotificationKind::Error,
                        format!("{} failed", kind),
                    )
                    .with_description(message.clone()),
                );
                self.transition(TxState::Idle);
                return Err(match e {
                    Error::SubmissionError(_) => e,
                    _ => Error::SubmissionError(message),
                });
            },
        };

        info!("{} submitted: {:?}", kind, hash);
        self.transition(TxState::Pending(hash));
        self.notify(Notification::new(
            NotificationKind::Success,
            format!("{} submitted", kind),
        ));

        let outcome = match self.app.config.receipt_timeout {
            Some(secs) => {
                match tokio::time::timeout(
                    Duration::from_secs(secs),
                    client.wait_for_receipt(hash),
                )
                .await
                {
                    Ok(result) => result,
                    Err(elapsed) => Err(Error::from(elapsed)),
                }
            },
            None => client.wait_for_receipt(hash).await,
        };

        let result = match outcome {
            Ok(receipt) if receipt.is_success() => {
                info!(
                    "{} confirmed in block {:?}",
                    kind, receipt.block_number
                );
                self.transition(TxState::Confirmed(receipt.clone()));
                self.notify(
                    Notification::new(
                        NotificationKind::Success,
                        confirmed_title(kind),
                    )
                    .with_description(format!(
                        "Tx: {}",
                        truncate_hash(&receipt.transaction_hash)
                    )),
                );
                self.app.cache.invalidate_chain(self.chain_id).await;
                Ok(receipt)
            },
            Ok(receipt) => {
                let message = format!(
                    "Transaction {:?} reverted",
                    receipt.transaction_hash
                );
                warn!("{}", message);
                self.fail(message.clone());
                Err(Error::ConfirmationError(message))
            },
            Err(e) => {
                error!("Waiting for {:?} failed: {}", hash, e);
                self.fail(e.to_string());
                Err(match e {
                    Error::TimeoutError(_) | Error::ConfirmationError(_) => e,
                    _ => Error::ConfirmationError(e.to_string()),
                })
            },
        };

        self.transition(TxState::Idle);
        result
    }

    fn fail(&self, message: String) {
        self.transition(TxState::Failed(message.clone()));
        self.notify(
            Notification::new(
                NotificationKind::Error,
                String::from("Transaction Failed"),
            )
            .with_description(message),
        );
    }

    fn transition(&self, state: TxState) {
        self.current.send_replace(state.clone());
        // no subscribers is fine
        let _ = self.events.send(TxEvent::StateChanged(state));
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(TxEvent::Notification(notification));
    }
}

fn confirmed_title(kind: IntentKind) -> String {
    match kind {
        IntentKind::Withdraw => String::from("Withdrawal Confirmed!"),
        _ => String::from("Transaction Confirmed!"),
    }
}

fn check_deployment(
    intent: &TransactionIntent,
    deployment: &Deployment,
    chain_id: u64,
) -> Result<(), Error> {
    if !deployment.vault_deployed() {
        return Err(Error::ConfigurationError(format!(
            "Vault is not deployed on chain {}",
            chain_id
        )));
    }

    let needs_token = matches!(
        intent,
        TransactionIntent::Approve | TransactionIntent::Deposit(_)
    );
    if needs_token && !deployment.token_deployed() {
        return Err(Error::ConfigurationError(format!(
            "Token is not deployed on chain {}",
            chain_id
        )));
    }

    Ok(())
}

fn validate_intent(
    intent: &TransactionIntent,
    account: Address,
    now: i64,
) -> Result<(), Error> {
    match intent {
        TransactionIntent::Approve => Ok(()),
        TransactionIntent::Deposit(params) => validate_deposit(params),
        TransactionIntent::Withdraw { position } => {
            if position.owner != account {
                return Err(Error::AuthorizationError(format!(
                    "Position {} belongs to {:?}",
                    position.id, position.owner
                )));
            }
            if position.is_locked(now) {
                return Err(Error::ValidationError(format!(
                    "Position {} is locked until {}",
                    position.id, position.lockup_end
                )));
            }
            Ok(())
        },
    }
}

fn validate_deposit(params: &DepositParams) -> Result<(), Error> {
    if params.amount.is_zero() {
        return Err(Error::ValidationError(String::from(
            "Deposit amount must be greater than zero",
        )));
    }
    if params.donation_bps > MAX_DONATION_BPS {
        return Err(Error::ValidationError(format!(
            "Donation share {} bps is above {}",
            params.donation_bps, MAX_DONATION_BPS
        )));
    }
    Ok(())
}

fn build_call(
    intent: &TransactionIntent,
    deployment: &Deployment,
    account: Address,
) -> (ContractRef, &'static str, Vec<Token>) {
    let vault = ContractRef::new(ContractKind::Vault, deployment.vault);

    match intent {
        TransactionIntent::Approve => (
            ContractRef::new(ContractKind::Token, deployment.token),
            "approve",
            vec![Token::Address(deployment.vault), Token::Uint(U256::MAX)],
        ),
        TransactionIntent::Deposit(params) => (
            vault,
            "deposit",
            vec![
                Token::Uint(params.amount),
                Token::Uint(U256::from(params.donation_bps)),
                Token::Uint(U256::from(params.lockup.seconds())),
                Token::Uint(U256::from(params.plan.id())),
                Token::Address(account),
            ],
        ),
        TransactionIntent::Withdraw { position } => (
            vault,
            "withdraw",
            vec![Token::Uint(position.id), Token::Address(account)],
        ),
    }
}
