use ethers::types::U256;

use crate::{
    configuration::State,
    error::Error,
    provider::{token_to_u256, ChainClient, ContractKind, ContractRef},
};

/// Total value locked. `None` when the vault is not deployed.
pub async fn fetch_total_assets<C: ChainClient>(
    state: &State<C>,
    chain_id: u64,
) -> Result<Option<U256>, Error> {
    let deployment = state.deployment(chain_id)?;
    if !deployment.vault_deployed() {
        return Ok(None);
    }

    let client = state.client(chain_id)?;
    let vault = ContractRef::new(ContractKind::Vault, deployment.vault);
    let output = client.read_call(&vault, "totalAssets", vec![]).await?;

    match output.first() {
        Some(value) => Ok(Some(token_to_u256(value)?)),
        None => Err(Error::AbiError(String::from(
            "totalAssets returned no value",
        ))),
    }
}
