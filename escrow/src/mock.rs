//! In-memory collaborators for exercising the orchestrators without a node,
//! a content store or a wallet.

use alloy::{
    hex,
    primitives::{address, keccak256, Address, Log, B256, U256},
    sol_types::SolEvent,
};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use crate::{
    contract::JobEscrow,
    error::{EscrowError, Result},
    ledger::{EscrowLedger, FundRequest, FundingReceipt},
    store::ContentStore,
    types::{ApplicationId, ContentHash, JobId, JobRecord, SubmissionId, SubmissionRecord},
    wallet::WalletProvider,
};

pub const MOCK_ESCROW: Address = address!("e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5");

/// Content store keyed by the keccak256 of the serialized document.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<ContentHash, Value>>,
    fail_publish: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail_publish: true,
            ..Default::default()
        }
    }

    pub fn address_of(content: &Value) -> ContentHash {
        let bytes = serde_json::to_vec(content).unwrap_or_default();
        ContentHash(format!("mem{}", hex::encode(keccak256(bytes))))
    }

    pub fn insert(&self, content: Value) -> ContentHash {
        let hash = Self::address_of(&content);
        self.docs.lock().unwrap().insert(hash.clone(), content);
        hash
    }

    /// Store a value under an arbitrary address, e.g. a non-object.
    pub fn insert_at(&self, hash: ContentHash, content: Value) {
        self.docs.lock().unwrap().insert(hash, content);
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryStore {
    async fn publish(&self, content: &Value) -> Result<ContentHash> {
        tokio::task::yield_now().await;
        if self.fail_publish {
            return Err(EscrowError::Publish("memory store refuses writes".to_string()));
        }
        Ok(self.insert(content.clone()))
    }

    async fn try_fetch(&self, hash: &ContentHash) -> Result<Map<String, Value>> {
        tokio::task::yield_now().await;
        let unresolvable = |reason: &str| EscrowError::ContentUnresolvable {
            hash: hash.to_string(),
            reason: reason.to_string(),
        };
        match self.docs.lock().unwrap().get(hash) {
            Some(Value::Object(doc)) => Ok(doc.clone()),
            Some(_) => Err(unresolvable("not a JSON object")),
            None => Err(unresolvable("not found")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FundBehavior {
    /// Mine the job and emit `ContractEntered` with this id.
    Emit(String),
    /// Mine successfully without emitting anything.
    NoEvent,
    /// Mine with a failed status.
    Revert,
    /// Broadcast, then lose track of the receipt.
    LostReceipt,
    Reject,
    Unreachable,
}

pub struct MockLedger {
    address: Address,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    applicants: HashMap<ApplicationId, Address>,
    submission_ids: HashMap<JobId, Vec<SubmissionId>>,
    submissions: HashMap<SubmissionId, SubmissionRecord>,
    fund: FundBehavior,
    fund_requests: Mutex<Vec<FundRequest>>,
    fund_calls: AtomicUsize,
}

impl MockLedger {
    pub fn new(fund: FundBehavior) -> Self {
        Self {
            address: MOCK_ESCROW,
            jobs: Mutex::new(HashMap::new()),
            applicants: HashMap::new(),
            submission_ids: HashMap::new(),
            submissions: HashMap::new(),
            fund,
            fund_requests: Mutex::new(Vec::new()),
            fund_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_job(self, record: JobRecord) -> Self {
        self.jobs
            .lock()
            .unwrap()
            .insert(record.job_id.clone(), record);
        self
    }

    pub fn with_applicant(mut self, id: ApplicationId, applicant: Address) -> Self {
        self.applicants.insert(id, applicant);
        self
    }

    pub fn with_submission(mut self, job_id: &str, record: SubmissionRecord) -> Self {
        self.submission_ids
            .entry(job_id.into())
            .or_default()
            .push(record.submission_id);
        self.submissions.insert(record.submission_id, record);
        self
    }

    /// List a submission id for the job that the ledger then fails to read.
    pub fn with_broken_submission(mut self, job_id: &str, id: U256) -> Self {
        self.submission_ids
            .entry(job_id.into())
            .or_default()
            .push(SubmissionId(id));
        self
    }

    pub fn fund_calls(&self) -> usize {
        self.fund_calls.load(Ordering::SeqCst)
    }

    pub fn fund_requests(&self) -> Vec<FundRequest> {
        self.fund_requests.lock().unwrap().clone()
    }
}

impl EscrowLedger for MockLedger {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_job(&self, job_id: &JobId) -> Result<JobRecord> {
        tokio::task::yield_now().await;
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| {
                EscrowError::LedgerUnreachable(format!("execution reverted: no job {}", job_id))
            })
    }

    async fn get_applicant(&self, application_id: ApplicationId) -> Result<Address> {
        Ok(self
            .applicants
            .get(&application_id)
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn get_submission_ids(&self, job_id: &JobId) -> Result<Vec<SubmissionId>> {
        Ok(self.submission_ids.get(job_id).cloned().unwrap_or_default())
    }

    async fn get_submission(&self, submission_id: SubmissionId) -> Result<SubmissionRecord> {
        tokio::task::yield_now().await;
        self.submissions.get(&submission_id).cloned().ok_or_else(|| {
            EscrowError::LedgerUnreachable(format!("no submission {}", submission_id))
        })
    }

    async fn fund_job(&self, request: FundRequest) -> Result<FundingReceipt> {
        let n = self.fund_calls.fetch_add(1, Ordering::SeqCst);
        self.fund_requests.lock().unwrap().push(request.clone());
        // confirmation takes a while
        tokio::task::yield_now().await;

        let tx_hash = tx_hash_for(n);
        let receipt = |status: bool, logs: Vec<Log>| FundingReceipt {
            tx_hash,
            status,
            logs,
        };
        match &self.fund {
            FundBehavior::Emit(job_id) => {
                let record = JobRecord {
                    job_id: JobId(job_id.clone()),
                    employer: request.sender,
                    escrow_amount: request.amount,
                    is_open: true,
                    selected_application_id: None,
                    content_hash: request.content_hash.clone(),
                };
                self.jobs.lock().unwrap().insert(record.job_id.clone(), record);
                let event = JobEscrow::ContractEntered {
                    jobId: job_id.clone(),
                    jobGiver: request.sender,
                    jobTaker: request.counterparty,
                    amount: request.amount,
                };
                Ok(receipt(
                    true,
                    vec![Log {
                        address: self.address,
                        data: event.encode_log_data(),
                    }],
                ))
            }
            FundBehavior::NoEvent => Ok(receipt(true, vec![])),
            FundBehavior::Revert => Ok(receipt(false, vec![])),
            FundBehavior::LostReceipt => Err(EscrowError::BroadcastUnconfirmed {
                tx_hash,
                reason: "connection reset".to_string(),
            }),
            FundBehavior::Reject => Err(EscrowError::UserRejected),
            FundBehavior::Unreachable => Err(EscrowError::ProviderUnavailable(
                "connection refused".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WalletBehavior {
    /// Authorize this account when asked.
    Grants(Address),
    Rejects,
    Broken,
}

pub struct MockWallet {
    behavior: WalletBehavior,
    authorized: Mutex<Vec<Address>>,
}

impl MockWallet {
    pub fn new(behavior: WalletBehavior) -> Self {
        Self {
            behavior,
            authorized: Mutex::new(Vec::new()),
        }
    }

    /// A wallet that has already authorized `accounts`.
    pub fn authorized(accounts: Vec<Address>) -> Self {
        let behavior = match accounts.first() {
            Some(a) => WalletBehavior::Grants(*a),
            None => WalletBehavior::Rejects,
        };
        Self {
            behavior,
            authorized: Mutex::new(accounts),
        }
    }
}

impl WalletProvider for MockWallet {
    async fn accounts(&self) -> Result<Vec<Address>> {
        match self.behavior {
            WalletBehavior::Broken => Err(EscrowError::ProviderUnavailable(
                "wallet is not responding".to_string(),
            )),
            _ => Ok(self.authorized.lock().unwrap().clone()),
        }
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        match self.behavior {
            WalletBehavior::Grants(address) => {
                let mut authorized = self.authorized.lock().unwrap();
                if !authorized.contains(&address) {
                    authorized.push(address);
                }
                Ok(authorized.clone())
            }
            WalletBehavior::Rejects => Err(EscrowError::UserRejected),
            WalletBehavior::Broken => Err(EscrowError::ProviderUnavailable(
                "wallet is not responding".to_string(),
            )),
        }
    }
}

pub mod strategy {
    use alloy::primitives::U256;
    use proptest::prelude::*;

    /// Decimal display amounts with at most 18 fractional digits.
    pub fn display_amount() -> impl Strategy<Value = String> {
        ("[0-9]{1,24}", "[0-9]{0,18}").prop_map(|(int, frac)| {
            if frac.is_empty() {
                int
            } else {
                format!("{}.{}", int, frac)
            }
        })
    }

    pub fn base_amount() -> impl Strategy<Value = U256> {
        any::<[u8; 32]>().prop_map(|bytes: [u8; 32]| U256::from_be_bytes(bytes))
    }
}

/// Transaction hash the mock ledger reports for its `call`-th funding.
pub fn tx_hash_for(call: usize) -> B256 {
    keccak256(call.to_be_bytes())
}
