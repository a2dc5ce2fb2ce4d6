use std::time::Duration;

use ethers::{
    abi::Token,
    types::{Address, U256},
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    cache_keys,
    configuration::{AppState, State},
    error::Error,
    provider::{token_to_u256, ChainClient, ContractKind, ContractRef},
    types::IntentKind,
};

/// Current `allowance(owner, vault)` on the token. Needs both the token and
/// the vault deployed.
pub async fn fetch_allowance<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    owner: Address,
) -> Result<U256, Error> {
    let deployment = state.deployment(chain_id)?;
    if !deployment.token_deployed() || !deployment.vault_deployed() {
        return Err(Error::ConfigurationError(format!(
            "Token or vault is not deployed on chain {}",
            chain_id
        )));
    }

    let client = state.client(chain_id)?;
    let token = ContractRef::new(ContractKind::Token, deployment.token);
    let output = client
        .read_call(
            &token,
            "allowance",
            vec![Token::Address(owner), Token::Address(deployment.vault)],
        )
        .await?;

    match output.first() {
        Some(value) => token_to_u256(value),
        None => Err(Error::AbiError(String::from(
            "allowance returned no value",
        ))),
    }
}

pub async fn get_allowance<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    owner: Address,
) -> Result<U256, Error> {
    let key = cache_keys::allowance(chain_id, &owner);
    if let Some(cached) = state.cache.allowance.get(&key).await {
        return Ok(cached);
    }

    let generation = state.cache.generation(chain_id).await;
    let allowance = fetch_allowance(state, chain_id, owner).await?;
    state
        .cache
        .store(&state.cache.allowance, chain_id, generation, &key, allowance)
        .await;

    Ok(allowance)
}

pub fn needs_approval(allowance: U256, amount: U256) -> bool {
    allowance < amount
}

/// Which transaction the deposit flow has to send next.
pub fn required_intent(allowance: U256, amount: U256) -> IntentKind {
    if needs_approval(allowance, amount) {
        IntentKind::Approve
    } else {
        IntentKind::Deposit
    }
}

/// Background task re-reading the allowance on a fixed interval. The task
/// stops when the watcher is dropped.
#[derive(Debug)]
pub struct AllowanceWatcher {
    receiver: watch::Receiver<Option<U256>>,
    handle: JoinHandle<()>,
}

impl AllowanceWatcher {
    pub fn spawn<C: ChainClient + 'static>(
        state: AppState<State<C>>,
        chain_id: u64,
        owner: Address,
    ) -> Self {
        let (sender, receiver) = watch::channel(None);
        let period =
            Duration::from_millis(state.config.allowance_poll_interval.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let generation = state.cache.generation(chain_id).await;
                match fetch_allowance::<C>(&state, chain_id, owner).await {
                    Ok(allowance) => {
                        let key = cache_keys::allowance(chain_id, &owner);
                        state
                            .cache
                            .store(
                                &state.cache.allowance,
                                chain_id,
                                generation,
                                &key,
                                allowance,
                            )
                            .await;
                        sender.send_if_modified(|current| {
                            if *current == Some(allowance) {
                                return false;
                            }
                            debug!(
                                "Allowance of {:?} on chain {} is now {}",
                                owner, chain_id, allowance
                            );
                            *current = Some(allowance);
                            true
                        });
                    },
                    Err(e) => {
                        warn!("Allowance poll failed: {}", e);
                    },
                }

                if sender.is_closed() {
                    break;
                }
            }
        });

        Self { receiver, handle }
    }

    /// Last value read, `None` until the first poll succeeds.
    pub fn latest(&self) -> Option<U256> {
        *self.receiver.borrow()
    }

    pub async fn changed(&mut self) -> Result<Option<U256>, Error> {
        self.receiver.changed().await.map_err(|e| {
            Error::QueryError(format!("Allowance watcher stopped: {}", e))
        })?;
        Ok(*self.receiver.borrow_and_update())
    }

    pub fn needs_approval(&self, amount: U256) -> Option<bool> {
        self.latest().map(|allowance| needs_approval(allowance, amount))
    }
}

impl Drop for AllowanceWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
