use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use ethers::{
    abi::Token,
    types::{Address, TxHash, H256},
};
use tokio::sync::Semaphore;

use crate::{
    error::Error,
    provider::{ChainClient, ContractRef, LogQuery},
    types::{DecodedLog, TxReceipt, TxStatus},
};

/// In-memory ledger that answers from canned logs and call results.
#[derive(Debug, Default)]
pub struct MockChainClient {
    logs: Mutex<Vec<(Address, DecodedLog)>>,
    reads: Mutex<Vec<(ContractRef, String, Vec<Token>, Vec<Token>)>>,
    failing_logs: Mutex<Option<String>>,
    send_results: Mutex<VecDeque<Result<TxHash, String>>>,
    receipt_results: Mutex<VecDeque<Result<TxReceipt, String>>>,
    sent: Mutex<Vec<(ContractRef, String, Vec<Token>)>>,
    receipt_gate: Option<Semaphore>,
    log_gate: Option<Semaphore>,
    read_calls: AtomicUsize,
    log_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `wait_for_receipt` blocks until [`MockChainClient::release_receipt`].
    pub fn with_receipt_gate() -> Self {
        Self {
            receipt_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release_receipt(&self) {
        if let Some(gate) = &self.receipt_gate {
            gate.add_permits(1);
        }
    }

    /// `get_logs` blocks until [`MockChainClient::release_logs`].
    pub fn with_log_gate() -> Self {
        Self {
            log_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release_logs(&self, calls: usize) {
        if let Some(gate) = &self.log_gate {
            gate.add_permits(calls);
        }
    }

    pub fn push_log(&self, address: Address, log: DecodedLog) {
        self.logs.lock().unwrap().push((address, log));
    }

    pub fn fail_logs(&self, message: &str) {
        *self.failing_logs.lock().unwrap() = Some(message.to_owned());
    }

    pub fn set_read(
        &self,
        contract: ContractRef,
        function: &str,
        args: Vec<Token>,
        output: Vec<Token>,
    ) {
        let mut reads = self.reads.lock().unwrap();
        reads.retain(|(c, f, a, _)| {
            !(c == &contract && f == function && a == &args)
        });
        reads.push((contract, function.to_owned(), args, output));
    }

    pub fn push_send_result(&self, result: Result<TxHash, String>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn push_receipt_result(&self, result: Result<TxReceipt, String>) {
        self.receipt_results.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<(ContractRef, String, Vec<Token>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.read_calls() + self.log_calls() + self.send_calls()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn read_call(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, Error> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let reads = self.reads.lock().unwrap();

        reads
            .iter()
            .find(|(c, f, a, _)| c == contract && f == function && a == &args)
            .map(|(_, _, _, output)| output.clone())
            .ok_or_else(|| {
                Error::QueryError(format!("execution reverted: {}", function))
            })
    }

    async fn get_logs(
        &self,
        query: &LogQuery,
    ) -> Result<Vec<DecodedLog>, Error> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.log_gate {
            gate.acquire()
                .await
                .map_err(|e| Error::QueryError(e.to_string()))?
                .forget();
        }

        if let Some(message) = self.failing_logs.lock().unwrap().clone() {
            return Err(Error::QueryError(message));
        }

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|(address, log)| {
                *address == query.address && query.matches(log)
            })
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn send_transaction(
        &self,
        contract: &ContractRef,
        function: &str,
        args: Vec<Token>,
    ) -> Result<TxHash, Error> {
        let count = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent
            .lock()
            .unwrap()
            .push((*contract, function.to_owned(), args));

        match self.send_results.lock().unwrap().pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(message)) => Err(Error::SubmissionError(message)),
            None => Ok(H256::from_low_u64_be(0xfeed_0000 + count as u64)),
        }
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, Error> {
        if let Some(gate) = &self.receipt_gate {
            gate.acquire()
                .await
                .map_err(|e| Error::ConfirmationError(e.to_string()))?
                .forget();
        }

        match self.receipt_results.lock().unwrap().pop_front() {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(message)) => Err(Error::ConfirmationError(message)),
            None => Ok(TxReceipt {
                transaction_hash: hash,
                block_number: Some(1),
                status: TxStatus::Success,
            }),
        }
    }
}
