//! # Queued Decryption Oracle
//!
//! Accepts decryption requests into a FIFO and does nothing else until
//! [`relay`] is called. Relaying drains the queue, decrypts each ciphertext
//! as the oracle principal and calls [`Vault::resolve`] with the result. A
//! ciphertext whose ACL does not list the oracle is refused like any other
//! undecryptable one.
//!
//! This is what keeps request and settlement honestly asynchronous in tests
//! and in the node: a `request_*` call only ever enqueues, and settlement
//! happens on a later, separate call.
//!
//! ## Retries
//!
//! A callback the vault refuses (paused, solvency violation, collaborator
//! failure) is put back at the end of the queue for the next relay. A
//! ciphertext that cannot be decrypted is dropped: no later relay could do
//! better.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use umbra_protocol::collaborators::{DecryptionOracle, DecryptionRequest, OracleError};
use umbra_protocol::fhe::{Evaluator, FheBackend};
use umbra_protocol::vault::CorrelationId;
use umbra_protocol::{Address, Settlement, Vault, VaultError};

/// In-memory request queue standing in for an external decryption service.
#[derive(Debug)]
pub struct QueuedOracle {
    address: Address,
    queue: Mutex<VecDeque<DecryptionRequest>>,
    online: AtomicBool,
}

impl QueuedOracle {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            queue: Mutex::new(VecDeque::new()),
            online: AtomicBool::new(true),
        }
    }

    /// The principal this oracle calls back as.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Requests waiting for the next relay.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// When offline, new requests are refused.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn drain(&self) -> Vec<DecryptionRequest> {
        self.queue.lock().drain(..).collect()
    }

    fn requeue(&self, requests: impl IntoIterator<Item = DecryptionRequest>) {
        self.queue.lock().extend(requests);
    }
}

impl DecryptionOracle for QueuedOracle {
    fn request_decryption(&self, request: DecryptionRequest) -> Result<(), OracleError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(OracleError::Unavailable(format!(
                "oracle {} is offline",
                self.address
            )));
        }
        debug!(correlation_id = %request.correlation_id, ciphertext = %request.ciphertext.handle(), "decryption queued");
        self.queue.lock().push_back(request);
        Ok(())
    }
}

/// A callback the vault refused.
#[derive(Debug)]
pub struct RelayFailure {
    pub correlation_id: CorrelationId,
    pub error: VaultError,
    /// Whether the request went back on the queue.
    pub requeued: bool,
}

/// What one relay pass did.
#[derive(Debug, Default)]
pub struct RelayReport {
    pub settlements: Vec<Settlement>,
    pub failures: Vec<RelayFailure>,
}

impl RelayReport {
    pub fn settled(&self) -> usize {
        self.count(|s| matches!(s, Settlement::Settled { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, Settlement::Rejected { .. }))
    }

    pub fn unknown(&self) -> usize {
        self.count(|s| matches!(s, Settlement::Unknown { .. }))
    }

    fn count(&self, f: impl Fn(&Settlement) -> bool) -> usize {
        self.settlements.iter().filter(|s| f(s)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty() && self.failures.is_empty()
    }
}

/// Decrypts every queued request and delivers it to `vault`.
pub fn relay(vault: &Vault, backend: Arc<dyn FheBackend>, oracle: &QueuedOracle) -> RelayReport {
    let fhe = Evaluator::new(backend, oracle.address().clone());
    let mut report = RelayReport::default();
    let mut retry = Vec::new();
    let now = Utc::now();

    for request in oracle.drain() {
        let correlation_id = request.correlation_id;
        if now > request.deadline {
            warn!(%correlation_id, deadline = %request.deadline, "answering past deadline");
        }

        let plaintext = match fhe.decrypt_as(fhe.principal(), &request.ciphertext) {
            Ok(v) => v,
            Err(e) => {
                error!(%correlation_id, error = %e, "ciphertext could not be decrypted, dropping request");
                report.failures.push(RelayFailure {
                    correlation_id,
                    error: e.into(),
                    requeued: false,
                });
                continue;
            }
        };

        match vault.resolve(oracle.address(), correlation_id, plaintext) {
            Ok(settlement) => report.settlements.push(settlement),
            Err(e) => {
                warn!(%correlation_id, error = %e, "callback refused, will retry");
                report.failures.push(RelayFailure {
                    correlation_id,
                    error: e,
                    requeued: true,
                });
                retry.push(request);
            }
        }
    }

    oracle.requeue(retry);
    if !report.is_empty() {
        info!(
            settled = report.settled(),
            rejected = report.rejected(),
            failed = report.failures.len(),
            "relay pass complete"
        );
    }
    report
}
