use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::Token,
    providers::{Http, JsonRpcClient, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Filter,
        TransactionRequest, TxHash, U64,
    },
};
use tracing::{debug, error, info};
use url::Url;

use crate::{
    configuration::Config,
    error::Error,
    provider::{
        decode_log, decode_output, encode_call, ChainClient, ContractRef,
        LogQuery,
    },
    types::{DecodedLog, TxReceipt, TxStatus},
};

/// JSON-RPC backed client for one network. Transactions are sent through
/// `eth_sendTransaction`, so the node or wallet behind the endpoint signs.
#[derive(Debug)]
pub struct EthersChainClient<P = Http> {
    provider: Provider<P>,
    chain_id: u64,
    sender: Option<Address>,
    receipt_poll_interval: Duration,
}

impl EthersChainClient<Http> {
    pub fn new(
        url: &Url,
        chain_id: u64,
        sender: Option<Address>,
        receipt_poll_interval: u64,
    ) -> Self {
        Self::with_provider(
            Provider::new(Http::new(url.clone())),
            chain_id,
            sender,
            receipt_poll_interval,
        )
    }

    /// One client per configured RPC url.
    pub fn connect_all(config: &Config) -> HashMap<u64, EthersChainClient> {
        let mut clients = HashMap::new();

        for (chain_id, url) in &config.rpc_urls {
            info!("Connecting chain {} through {}", chain_id, url);
            clients.insert(
                *chain_id,
                EthersChainClient::new(
                    url,
                    *chain_id,
                    config.account,
                    config.receipt_poll_interval,
                ),
            );
        }

        clients
    }
}

impl<P: JsonRpcClient> EthersChainClient<P> {
    /// A zero poll interval is raised to 1ms; tokio intervals must be
    /// non-zero.
    pub fn with_provider(
        provider: Provider<P>,
        chain_id: u64,
        sender: Option<Address>,
        receipt_poll_interval: u64,
    ) -> Self {
        let receipt_poll_interval =
            Duration::from_millis(receipt_poll_interval.max(1));

        Self {
            provider: provider.interval(receipt_poll_interval),
            chain_id,
            sender,
            receipt_poll_interval,
        }
    }

    pub async fn check_chain_id(&self) -> Result<(), Error> {
        let remote = self.provider.get_chainid().await.map_err(|e| {
            Error::ConfigurationError(format!(
                "Could not read chain id from provider: {}",
                e
            ))
        })?;

        if remote.low_u64() != self.chain_id {
            return Err(Error::ConfigurationError(format!(
                "Provider serves chain {} but {} is configured",
                remote, self.chain_id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainClient for EthersChainClient<P> {
    async fn read_call(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, Error> {
        let data = encode_call(contract.kind, function, &args)?;
        let tx: TypedTransaction =
            TransactionRequest::new().to(contract.address).data(data).into();

        let output = self.provider.call(&tx, None).await.map_err(|e| {
            error!(
                "read_call {} on {:?} failed. Error {:?}",
                function, contract.address, e
            );
            Error::QueryError(e.to_string())
        })?;

        decode_output(contract.kind, function, &output)
    }

    async fn get_logs(
        &self,
        query: &LogQuery,
    ) -> Result<Vec<DecodedLog>, Error> {
        let mut filter = Filter::new()
            .address(query.address)
            .event(query.event.signature())
            .from_block(query.range.from);

        filter = match query.range.to {
            Some(to) => filter.to_block(to),
            None => filter.to_block(BlockNumber::Latest),
        };

        if let Some(topic) = query.topics[0] {
            filter = filter.topic1(topic);
        }
        if let Some(topic) = query.topics[1] {
            filter = filter.topic2(topic);
        }

        let logs = self.provider.get_logs(&filter).await.map_err(|e| {
            error!(
                "get_logs failed. Filter: {:?}. Error {:?}",
                filter, e
            );
            Error::QueryError(e.to_string())
        })?;

        debug!(
            "Fetched {} {} logs from {:?}",
            logs.len(),
            query.event,
            query.address
        );

        logs.into_iter()
            .map(|log| {
                if log.address != query.address {
                    return Err(Error::QueryError(format!(
                        "Provider returns logs from different contract address (expected: {:?}): {:?}",
                        query.address, log.address
                    )));
                }

                let event =
                    decode_log(query.event, log.topics, log.data.to_vec())?;

                Ok(DecodedLog {
                    block_number: log.block_number.map(|b| b.as_u64()),
                    log_index: log.log_index.map(|i| i.low_u64()),
                    transaction_hash: log.transaction_hash,
                    event,
                })
            })
            .collect()
    }

    async fn send_transaction(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<TxHash, Error> {
        let from = self.sender.ok_or_else(|| {
            Error::ConfigurationError(String::from("ACCOUNT is not set"))
        })?;
        let data = encode_call(contract.kind, function, &args)?;
        let tx = TransactionRequest::new()
            .from(from)
            .to(contract.address)
            .data(data);

        let pending =
            self.provider.send_transaction(tx, None).await.map_err(|e| {
                error!("send_transaction {} failed. Error {:?}", function, e);
                Error::SubmissionError(e.to_string())
            })?;

        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, Error> {
        let mut interval = tokio::time::interval(self.receipt_poll_interval);

        loop {
            interval.tick().await;

            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| {
                    error!("Receipt query for {:?} failed. Error {:?}", hash, e);
                    Error::ConfirmationError(e.to_string())
                })?;

            if let Some(receipt) = receipt {
                let status = match receipt.status {
                    Some(status) if status == U64::zero() => TxStatus::Reverted,
                    _ => TxStatus::Success,
                };

                return Ok(TxReceipt {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number.map(|b| b.as_u64()),
                    status,
                });
            }

            debug!("Transaction {:?} still pending", hash);
        }
    }
}
