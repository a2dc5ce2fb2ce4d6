use std::collections::HashMap;

use ethers::types::{Address, U512};
use tracing::debug;

use crate::{
    cache_keys,
    configuration::State,
    error::Error,
    provider::{BlockRange, ChainClient, LogQuery},
    types::{
        DecodedLog, DonationRecord, EventKind, LeaderboardRow, VaultEvent,
    },
};

/// Sums donations per donor. Records come back in the order each donor was
/// first seen.
pub fn aggregate_donations(events: &[DecodedLog]) -> Vec<DonationRecord> {
    let mut index: HashMap<Address, usize> = HashMap::new();
    let mut records: Vec<DonationRecord> = Vec::new();

    for log in events {
        let VaultEvent::DonationNotified { donor, amount, .. } = log.event
        else {
            continue;
        };

        let position = *index.entry(donor).or_insert_with(|| {
            records.push(DonationRecord {
                donor,
                total_donated: U512::zero(),
            });
            records.len() - 1
        });

        records[position].total_donated += U512::from(amount);
    }

    records
}

/// Highest total first; the sort is stable so ties keep first-seen order.
pub fn rank_donors(mut records: Vec<DonationRecord>) -> Vec<LeaderboardRow> {
    records.sort_by(|a, b| b.total_donated.cmp(&a.total_donated));

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| LeaderboardRow {
            rank: index + 1,
            donor: record.donor,
            total_donated: record.total_donated,
        })
        .collect()
}

pub async fn fetch_leaderboard<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
) -> Result<Vec<LeaderboardRow>, Error> {
    let deployment = state.deployment(chain_id)?;
    if !deployment.leaderboard_deployed() {
        return Ok(vec![]);
    }

    let client = state.client(chain_id)?;
    let query = LogQuery::new(
        deployment.leaderboard,
        EventKind::DonationNotified,
        BlockRange::from_block(state.config.from_block),
    );

    let events = client.get_logs(&query).await?;
    let rows = rank_donors(aggregate_donations(&events));

    debug!(
        "Chain {}: {} donors from {} donation events",
        chain_id,
        rows.len(),
        events.len()
    );

    Ok(rows)
}

/// Cached variant of [`fetch_leaderboard`].
pub async fn get_leaderboard<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
) -> Result<Vec<LeaderboardRow>, Error> {
    let key = cache_keys::leaderboard(chain_id);
    if let Some(cached) = state.cache.leaderboard.get(&key).await {
        return Ok(cached);
    }

    let generation = state.cache.generation(chain_id).await;
    let rows = fetch_leaderboard(state, chain_id).await?;
    let cache = &state.cache;
    cache
        .store(&cache.leaderboard, chain_id, generation, &key, rows.clone())
        .await;

    Ok(rows)
}
