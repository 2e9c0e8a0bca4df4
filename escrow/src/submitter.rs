use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};
use tracing::{info, instrument, warn};

use crate::{
    error::{EscrowError, Result},
    ledger::{EscrowLedger, FundRequest},
    store::ContentStore,
    types::{JobContent, JobId},
    units::{from_base_units, to_base_units},
    wallet::WalletSession,
};

/// Input of a Direct Contract: the employer funds a job for a known taker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobForm {
    pub title: String,
    pub description: String,
    pub job_type: String,
    pub counterparty: Address,
    /// Display units, e.g. "1.5".
    pub amount: String,
}

impl JobForm {
    /// Identifies the form state for the in-flight guard.
    pub fn fingerprint(&self) -> B256 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        keccak256(bytes)
    }

    fn content(&self, sender: Address, amount: String) -> JobContent {
        JobContent {
            title: self.title.clone(),
            description: self.description.clone(),
            job_type: self.job_type.clone(),
            job_taker: self.counterparty.to_string(),
            amount,
            job_giver: sender.to_string(),
            ..Default::default()
        }
    }
}

/// Publishes the job content, funds the escrow and reads back the job id.
///
/// The three steps run strictly in order and the same form cannot be
/// submitted again until the running attempt finishes, since a second
/// transaction would escrow the amount twice.
pub struct TransactionSubmitter<S, L> {
    store: S,
    ledger: L,
    in_flight: Mutex<HashSet<B256>>,
}

struct InFlight<'a> {
    attempts: &'a Mutex<HashSet<B256>>,
    key: B256,
    held: bool,
}

impl InFlight<'_> {
    /// Keep the form blocked after this attempt ends.
    fn hold(&mut self) {
        self.held = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.held {
            return;
        }
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<S: ContentStore, L: EscrowLedger> TransactionSubmitter<S, L> {
    pub fn new(store: S, ledger: L) -> Self {
        Self {
            store,
            ledger,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, form: &JobForm) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&form.fingerprint())
    }

    fn begin(&self, form: &JobForm) -> Result<InFlight<'_>> {
        let key = form.fingerprint();
        let mut attempts = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !attempts.insert(key) {
            warn!("Funding attempt {:#} is already in flight", key);
            return Err(EscrowError::AlreadyInFlight);
        }
        Ok(InFlight {
            attempts: &self.in_flight,
            key,
            held: false,
        })
    }

    /// Unblock a form whose last attempt may have moved funds, once the
    /// caller has checked the transaction out of band.
    pub fn release(&self, form: &JobForm) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&form.fingerprint())
    }

    /// Run one funding attempt. A form stays blocked after an attempt that
    /// may have moved funds until [`Self::release`] is called for it.
    #[instrument(skip_all, level = "info", fields(title = %form.title))]
    pub async fn submit(&self, form: &JobForm, session: &WalletSession) -> Result<JobId> {
        let sender = session.address().ok_or(EscrowError::WalletDisconnected)?;
        let mut attempt = self.begin(form)?;
        let result = self.fund(form, sender).await;
        if let Err(err) = &result {
            if err.funds_may_have_moved() {
                warn!("Holding form {:#} until its transaction is checked", attempt.key);
                attempt.hold();
            }
        }
        result
    }

    async fn fund(&self, form: &JobForm, sender: Address) -> Result<JobId> {
        // validated before publishing so a bad amount leaves nothing behind
        let amount = to_base_units(&form.amount)?;

        let content_hash = {
            let content = form.content(sender, from_base_units(amount));
            self.store.publish(&content.to_document()).await?
        };
        info!("Published job content at {}", content_hash);

        let receipt = self
            .ledger
            .fund_job(FundRequest {
                content_hash,
                counterparty: form.counterparty,
                amount,
                sender,
            })
            .await?;
        if !receipt.status {
            return Err(EscrowError::TransactionReverted {
                tx_hash: Some(receipt.tx_hash),
                reason: "receipt status is failure".to_string(),
            });
        }

        match receipt.job_id(self.ledger.address()) {
            Some(job_id) => {
                info!("Escrow funded for job {} in tx {}", job_id, receipt.tx_hash);
                Ok(job_id)
            }
            None => {
                warn!(
                    "Transaction {} confirmed without a ContractEntered event",
                    receipt.tx_hash
                );
                Err(EscrowError::ConfirmedButUnresolved {
                    tx_hash: receipt.tx_hash,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FundBehavior, MemoryStore, MockLedger};
    use alloy::primitives::{address, U256};

    const EMPLOYER: Address = address!("00000000000000000000000000000000000000e1");
    const WORKER: Address = address!("00000000000000000000000000000000000000a1");

    fn form(amount: &str) -> JobForm {
        JobForm {
            title: "Logo design".into(),
            description: "A logo".into(),
            job_type: "design".into(),
            counterparty: WORKER,
            amount: amount.into(),
        }
    }

    #[tokio::test]
    async fn disconnected_session_is_refused() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("1".into()));
        let s = TransactionSubmitter::new(&store, &ledger);
        let err = s.submit(&form("1"), &WalletSession::default()).await.unwrap_err();
        assert!(matches!(err, EscrowError::WalletDisconnected));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn invalid_amount_publishes_nothing() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("1".into()));
        let s = TransactionSubmitter::new(&store, &ledger);
        let err = s
            .submit(&form("1.5 ether"), &WalletSession::connected(EMPLOYER))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidAmount(_)));
        assert_eq!(store.len(), 0);
        assert_eq!(ledger.fund_calls(), 0);
    }

    #[tokio::test]
    async fn publish_failure_stops_before_ledger() {
        let store = MemoryStore::failing();
        let ledger = MockLedger::new(FundBehavior::Emit("1".into()));
        let s = TransactionSubmitter::new(&store, &ledger);
        let err = s
            .submit(&form("1"), &WalletSession::connected(EMPLOYER))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Publish(_)));
        assert_eq!(ledger.fund_calls(), 0);
    }

    #[tokio::test]
    async fn content_amount_matches_escrow() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("9".into()));
        let s = TransactionSubmitter::new(&store, &ledger);
        s.submit(&form("2.50"), &WalletSession::connected(EMPLOYER))
            .await
            .unwrap();
        let request = ledger.fund_requests().pop().unwrap();
        assert_eq!(request.amount, U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(request.sender, EMPLOYER);
        let content = JobContent::from_document(store.fetch(&request.content_hash).await);
        assert_eq!(content.amount, "2.5");
        assert_eq!(content.job_giver, EMPLOYER.to_string());
        assert_eq!(content.job_taker, WORKER.to_string());
    }

    #[tokio::test]
    async fn lost_receipt_keeps_the_form_blocked() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::LostReceipt);
        let s = TransactionSubmitter::new(&store, &ledger);
        let f = form("1");
        let session = WalletSession::connected(EMPLOYER);

        let err = s.submit(&f, &session).await.unwrap_err();
        assert!(matches!(err, EscrowError::BroadcastUnconfirmed { .. }));
        assert!(err.funds_may_have_moved());
        assert_eq!(err.tx_hash(), Some(crate::mock::tx_hash_for(0)));

        assert!(s.is_in_flight(&f));
        assert!(matches!(
            s.submit(&f, &session).await,
            Err(EscrowError::AlreadyInFlight)
        ));
        assert_eq!(ledger.fund_calls(), 1);

        assert!(s.release(&f));
        assert!(!s.is_in_flight(&f));
        assert!(s.submit(&f, &session).await.is_err());
        assert_eq!(ledger.fund_calls(), 2);
    }

    #[tokio::test]
    async fn unresolved_job_id_keeps_the_form_blocked() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent);
        let s = TransactionSubmitter::new(&store, &ledger);
        let f = form("1");
        let err = s
            .submit(&f, &WalletSession::connected(EMPLOYER))
            .await
            .unwrap_err();
        assert!(err.funds_may_have_moved());
        assert!(s.is_in_flight(&f));
    }

    #[tokio::test]
    async fn failure_releases_the_guard() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Revert);
        let s = TransactionSubmitter::new(&store, &ledger);
        let f = form("1");
        let session = WalletSession::connected(EMPLOYER);
        assert!(matches!(
            s.submit(&f, &session).await,
            Err(EscrowError::TransactionReverted { .. })
        ));
        assert!(!s.is_in_flight(&f));
        assert!(matches!(
            s.submit(&f, &session).await,
            Err(EscrowError::TransactionReverted { .. })
        ));
        assert_eq!(ledger.fund_calls(), 2);
    }
}
