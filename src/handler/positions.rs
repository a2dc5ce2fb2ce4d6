use std::collections::HashSet;

use ethers::{
    abi::Token,
    types::{Address, H256, U256},
};
use futures::future::try_join_all;
use tracing::debug;

use crate::{
    cache_keys,
    configuration::State,
    error::Error,
    provider::{
        token_to_address, token_to_u16, token_to_u256, BlockRange,
        ChainClient, ContractKind, ContractRef, LogQuery,
    },
    types::{DecodedLog, EventKind, Position, VaultEvent},
};

/// Ids deposited minus ids withdrawn. Each id appears once, in the order of
/// its first deposit.
pub fn active_position_ids(
    deposits: &[DecodedLog],
    withdrawals: &[DecodedLog],
) -> Vec<U256> {
    let withdrawn: HashSet<U256> = withdrawals
        .iter()
        .filter_map(|log| match log.event {
            VaultEvent::Withdrawn { position_id } => Some(position_id),
            _ => None,
        })
        .collect();

    let mut seen = HashSet::new();
    deposits
        .iter()
        .filter_map(|log| match log.event {
            VaultEvent::Deposited { position_id, .. } => Some(position_id),
            _ => None,
        })
        .filter(|id| !withdrawn.contains(id))
        .filter(|id| seen.insert(*id))
        .collect()
}

pub async fn fetch_user_positions<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    owner: Address,
) -> Result<Vec<U256>, Error> {
    let deployment = state.deployment(chain_id)?;
    if !deployment.vault_deployed() {
        return Ok(vec![]);
    }

    let client = state.client(chain_id)?;
    let range = BlockRange::from_block(state.config.from_block);

    let deposits_query =
        LogQuery::new(deployment.vault, EventKind::Deposited, range)
            .topic2(H256::from(owner));
    // Withdrawn does not carry the owner, so every withdrawal is scanned.
    let withdrawals_query =
        LogQuery::new(deployment.vault, EventKind::Withdrawn, range);

    let (deposits, withdrawals) = tokio::try_join!(
        client.get_logs(&deposits_query),
        client.get_logs(&withdrawals_query),
    )?;

    let ids = active_position_ids(&deposits, &withdrawals);
    debug!(
        "Chain {}: {:?} has {} open positions ({} deposits, {} withdrawals)",
        chain_id,
        owner,
        ids.len(),
        deposits.len(),
        withdrawals.len()
    );

    Ok(ids)
}

/// Cached variant of [`fetch_user_positions`].
pub async fn get_user_positions<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    owner: Address,
) -> Result<Vec<U256>, Error> {
    let key = cache_keys::positions(chain_id, &owner);
    if let Some(cached) = state.cache.positions.get(&key).await {
        return Ok(cached);
    }

    let generation = state.cache.generation(chain_id).await;
    let ids = fetch_user_positions(state, chain_id, owner).await?;
    state
        .cache
        .store(&state.cache.positions, chain_id, generation, &key, ids.clone())
        .await;

    Ok(ids)
}

/// Reads `positions(id)`. `None` when the vault is not deployed or the
/// position does not exist (zero owner).
pub async fn fetch_position<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    id: U256,
) -> Result<Option<Position>, Error> {
    let deployment = state.deployment(chain_id)?;
    if !deployment.vault_deployed() {
        return Ok(None);
    }

    let client = state.client(chain_id)?;
    let vault = ContractRef::new(ContractKind::Vault, deployment.vault);
    let output = client
        .read_call(&vault, "positions", vec![Token::Uint(id)])
        .await?;

    if output.len() < 5 {
        return Err(Error::AbiError(format!(
            "positions({}) returned {} values",
            id,
            output.len()
        )));
    }

    let owner = token_to_address(&output[0])?;
    if owner.is_zero() {
        return Ok(None);
    }

    Ok(Some(Position {
        id,
        owner,
        amount_deposited: token_to_u256(&output[1])?,
        donation_bps: token_to_u16(&output[3])?,
        lockup_end: token_to_u256(&output[4])?,
    }))
}

/// Open positions of `owner` with their details, in reconstruction order.
/// The id list comes from the cache when present.
pub async fn fetch_user_portfolio<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
    owner: Address,
) -> Result<Vec<Position>, Error> {
    let ids = get_user_positions(state, chain_id, owner).await?;
    let positions =
        try_join_all(ids.into_iter().map(|id| fetch_position(state, chain_id, id)))
            .await?;

    Ok(positions.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        deposited, owner_a, owner_b, position_output, test_app_state,
        test_state, vault_address, withdrawn, CHAIN_ID, UNDEPLOYED_CHAIN_ID,
        UNKNOWN_CHAIN_ID,
    };
    use crate::provider::MockChainClient;

    fn ids(values: &[u64]) -> Vec<U256> {
        values.iter().map(|v| U256::from(*v)).collect()
    }

    #[test]
    fn test_active_ids_set_difference() {
        let a = owner_a();
        let deposits = vec![deposited(1, a), deposited(2, a), deposited(3, a)];
        let withdrawals = vec![withdrawn(2), withdrawn(99)];

        assert_eq!(active_position_ids(&deposits, &withdrawals), ids(&[1, 3]));
    }

    #[test]
    fn test_active_ids_ignore_event_order() {
        let a = owner_a();
        let forward = vec![deposited(4, a), deposited(5, a), deposited(6, a)];
        let backward: Vec<DecodedLog> = forward.iter().rev().cloned().collect();
        let withdrawals = vec![withdrawn(5)];
        let withdrawals_rev = vec![withdrawn(5)];

        let mut first = active_position_ids(&forward, &withdrawals);
        let mut second = active_position_ids(&backward, &withdrawals_rev);
        first.sort();
        second.sort();

        assert_eq!(first, ids(&[4, 6]));
        assert_eq!(first, second);
    }

    #[test]
    fn test_withdrawn_before_deposit_still_excluded() {
        let a = owner_a();
        let withdrawals = vec![withdrawn(8)];
        let deposits = vec![deposited(8, a)];

        assert!(active_position_ids(&deposits, &withdrawals).is_empty());
    }

    #[tokio::test]
    async fn test_single_deposit_is_open() {
        let client = MockChainClient::new();
        client.push_log(vault_address(), deposited(7, owner_a()));
        let state = test_state(client);

        let result = fetch_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();

        assert_eq!(result, ids(&[7]));
    }

    #[tokio::test]
    async fn test_duplicate_deposit_collapses() {
        let client = MockChainClient::new();
        client.push_log(vault_address(), deposited(3, owner_a()));
        client.push_log(vault_address(), deposited(3, owner_a()));
        let state = test_state(client);

        let result = fetch_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();

        assert_eq!(result, ids(&[3]));
    }

    #[tokio::test]
    async fn test_other_owner_and_withdrawals_filtered() {
        let client = MockChainClient::new();
        client.push_log(vault_address(), deposited(1, owner_a()));
        client.push_log(vault_address(), deposited(2, owner_b()));
        client.push_log(vault_address(), deposited(3, owner_a()));
        client.push_log(vault_address(), withdrawn(1));
        let state = test_state(client);

        let a = fetch_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();
        let b = fetch_user_positions(&state, CHAIN_ID, owner_b())
            .await
            .unwrap();

        assert_eq!(a, ids(&[3]));
        assert_eq!(b, ids(&[2]));
        assert_eq!(state.client(CHAIN_ID).unwrap().log_calls(), 4);
    }

    #[tokio::test]
    async fn test_unknown_network_is_configuration_error() {
        let state = test_state(MockChainClient::new());

        let result =
            fetch_user_positions(&state, UNKNOWN_CHAIN_ID, owner_a()).await;

        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_undeployed_vault_is_empty() {
        let state = test_state(MockChainClient::new());

        let result = fetch_user_positions(&state, UNDEPLOYED_CHAIN_ID, owner_a())
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(state.client(CHAIN_ID).unwrap().network_calls(), 0);
    }

    #[tokio::test]
    async fn test_log_failure_is_not_empty_result() {
        let client = MockChainClient::new();
        client.fail_logs("connection refused");
        let state = test_state(client);

        let result = fetch_user_positions(&state, CHAIN_ID, owner_a()).await;

        assert!(matches!(result, Err(Error::QueryError(_))));
    }

    #[tokio::test]
    async fn test_cached_positions_reconcile_after_invalidation() {
        let client = MockChainClient::new();
        client.push_log(vault_address(), deposited(1, owner_a()));
        let state = test_state(client);

        let first = get_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();
        state
            .client(CHAIN_ID)
            .unwrap()
            .push_log(vault_address(), withdrawn(1));
        let cached = get_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();

        assert_eq!(first, ids(&[1]));
        assert_eq!(cached, ids(&[1]));

        state.cache.invalidate_chain(CHAIN_ID).await;
        let fresh = get_user_positions(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_position_details() {
        let client = MockChainClient::new();
        let vault = ContractRef::new(ContractKind::Vault, vault_address());
        client.set_read(
            vault,
            "positions",
            vec![Token::Uint(U256::from(7))],
            position_output(owner_a(), 100_000_000, 1_000, 1_700_000_000),
        );
        client.set_read(
            vault,
            "positions",
            vec![Token::Uint(U256::from(8))],
            position_output(Address::zero(), 0, 0, 0),
        );
        let state = test_state(client);

        let position = fetch_position(&state, CHAIN_ID, U256::from(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.owner, owner_a());
        assert_eq!(position.amount_deposited, U256::from(100_000_000u64));
        assert_eq!(position.donation_bps, 1_000);
        assert_eq!(position.lockup_end, U256::from(1_700_000_000u64));

        let missing = fetch_position(&state, CHAIN_ID, U256::from(8))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_fetch_user_portfolio() {
        let client = MockChainClient::new();
        let vault = ContractRef::new(ContractKind::Vault, vault_address());
        client.push_log(vault_address(), deposited(1, owner_a()));
        client.push_log(vault_address(), deposited(2, owner_a()));
        for id in [1u64, 2] {
            client.set_read(
                vault,
                "positions",
                vec![Token::Uint(U256::from(id))],
                position_output(owner_a(), id * 1_000_000, 500, id * 100),
            );
        }
        let state = test_state(client);

        let portfolio = fetch_user_portfolio(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();
        fetch_user_portfolio(&state, CHAIN_ID, owner_a())
            .await
            .unwrap();

        let found: Vec<U256> = portfolio.iter().map(|p| p.id).collect();
        assert_eq!(found, ids(&[1, 2]));
        assert_eq!(portfolio[1].amount_deposited, U256::from(2_000_000u64));
        assert!(portfolio[0].is_locked(99));
        assert!(!portfolio[0].is_locked(100));
        // ids were cached by the first call, details are read every time
        let client = state.client(CHAIN_ID).unwrap();
        assert_eq!(client.log_calls(), 2);
        assert_eq!(client.read_calls(), 4);
    }

    #[tokio::test]
    async fn test_fetch_spanning_invalidation_is_not_cached() {
        let client = MockChainClient::with_log_gate();
        client.push_log(vault_address(), deposited(1, owner_a()));
        let state = test_app_state(client);

        let pending = tokio::spawn({
            let state = state.clone();
            async move { get_user_positions(&state, CHAIN_ID, owner_a()).await }
        });
        while state.client(CHAIN_ID).unwrap().log_calls() < 2 {
            tokio::task::yield_now().await;
        }
        state.cache.invalidate_chain(CHAIN_ID).await;
        state.client(CHAIN_ID).unwrap().release_logs(2);

        let result = pending.await.unwrap().unwrap();
        assert_eq!(result, ids(&[1]));

        let key = cache_keys::positions(CHAIN_ID, &owner_a());
        assert!(state.cache.positions.get(&key).await.is_none());
    }
}
