//! In-memory wallet provider for testing and ephemeral use.
//!
//! Results are scripted up front and every request is recorded, so callers
//! can assert on ordering and on how many requests were made.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::*;

/// A request observed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Enable,
    Execute { hash: TransactionHash, calls: Vec<Call> },
    ReceiptQuery(TransactionHash),
    CallContract(Call),
}

struct Inner {
    enable_result: ProviderResult<ProviderState>,
    execute_failures: HashMap<u64, ProviderError>,
    executions: u64,
    receipt_script: VecDeque<ProviderResult<Receipt>>,
    call_results: HashMap<Address, ProviderResult<Vec<Felt>>>,
    next_nonce: u64,
    events: Vec<ProviderEvent>,
}

pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    /// A provider whose `enable` succeeds with `address` selected.
    pub fn connected(address: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                enable_result: Ok(ProviderState {
                    is_connected: true,
                    selected_address: Some(address.to_string()),
                }),
                execute_failures: HashMap::new(),
                executions: 0,
                receipt_script: VecDeque::new(),
                call_results: HashMap::new(),
                next_nonce: 1,
                events: Vec::new(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_enable_result(&self, result: ProviderResult<ProviderState>) {
        self.inner().enable_result = result;
    }

    /// The next `execute` fails with `error`.
    pub fn fail_next_execute(&self, error: ProviderError) {
        self.fail_execute_after(0, error);
    }

    /// Let `skip` more `execute` calls through, then fail the next one.
    pub fn fail_execute_after(&self, skip: u64, error: ProviderError) {
        let mut inner = self.inner();
        let at = inner.executions + skip + 1;
        inner.execute_failures.insert(at, error);
    }

    /// Queue a receipt query result. Once the queue is empty, queries
    /// return an accepted receipt.
    pub fn push_receipt(&self, result: ProviderResult<Receipt>) {
        self.inner().receipt_script.push_back(result);
    }

    /// The next `count` receipt queries fail as "not yet known".
    pub fn fail_receipts(&self, count: usize) {
        let mut inner = self.inner();
        for _ in 0..count {
            inner
                .receipt_script
                .push_back(Err(ProviderError::TransactionNotFound(String::new())));
        }
    }

    pub fn set_call_result(&self, contract: &Address, result: ProviderResult<Vec<Felt>>) {
        self.inner().call_results.insert(contract.clone(), result);
    }

    pub fn events(&self) -> Vec<ProviderEvent> {
        self.inner().events.clone()
    }

    /// Number of requests that would have reached the network.
    pub fn request_count(&self) -> usize {
        self.inner().events.len()
    }

    pub fn receipt_queries(&self) -> usize {
        self.inner()
            .events
            .iter()
            .filter(|e| matches!(e, ProviderEvent::ReceiptQuery(_)))
            .count()
    }

    pub fn executed(&self) -> Vec<Vec<Call>> {
        self.inner()
            .events
            .iter()
            .filter_map(|e| match e {
                ProviderEvent::Execute { calls, .. } => Some(calls.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl WalletProvider for MemoryProvider {
    async fn enable(&self, _options: &ConnectOptions) -> ProviderResult<ProviderState> {
        let mut inner = self.inner();
        inner.events.push(ProviderEvent::Enable);
        inner.enable_result.clone()
    }

    async fn execute(&self, calls: &[Call]) -> ProviderResult<TransactionHash> {
        let mut inner = self.inner();
        inner.executions += 1;
        let current = inner.executions;
        if let Some(error) = inner.execute_failures.remove(&current) {
            inner.events.push(ProviderEvent::Execute {
                hash: String::new(),
                calls: calls.to_vec(),
            });
            return Err(error);
        }
        let hash = format!("0x{:x}", 0x1000 + inner.next_nonce);
        inner.next_nonce += 1;
        inner.events.push(ProviderEvent::Execute {
            hash: hash.clone(),
            calls: calls.to_vec(),
        });
        Ok(hash)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> ProviderResult<Receipt> {
        let mut inner = self.inner();
        inner.events.push(ProviderEvent::ReceiptQuery(hash.to_string()));
        match inner.receipt_script.pop_front() {
            Some(Err(ProviderError::TransactionNotFound(_))) => {
                Err(ProviderError::TransactionNotFound(hash.to_string()))
            }
            Some(Ok(mut receipt)) => {
                receipt.transaction_hash = hash.to_string();
                Ok(receipt)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Receipt::accepted(hash)),
        }
    }

    async fn call_contract(&self, call: &Call) -> ProviderResult<Vec<Felt>> {
        let mut inner = self.inner();
        inner.events.push(ProviderEvent::CallContract(call.clone()));
        inner
            .call_results
            .get(&call.contract_address)
            .cloned()
            .unwrap_or_else(|| Err(ProviderError::Rpc(format!(
                "contract {} not found",
                call.contract_address
            ))))
    }
}
