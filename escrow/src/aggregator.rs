use alloy::primitives::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    contract::known_address,
    error::Result,
    ledger::EscrowLedger,
    store::ContentStore,
    types::{ContentHash, JobContent, JobId, SubmissionContent, SubmissionId, SubmissionRecord},
    units::{from_base_units, to_base_units},
};

/// A job as shown to a viewer: ledger state merged with its content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub employer: Address,
    /// Display units.
    pub escrow_amount: String,
    pub escrow_base_units: U256,
    pub is_open: bool,
    /// `None` while no application has been selected.
    pub counterparty: Option<Address>,
    pub content_hash: ContentHash,
    pub content: JobContent,
}

impl JobView {
    pub fn title(&self) -> &str {
        &self.content.title
    }

    /// Whether the advisory amount in the content matches the escrow.
    /// `None` when the content carries no usable amount.
    pub fn amount_agrees(&self) -> Option<bool> {
        if self.content.amount.is_empty() {
            return None;
        }
        to_base_units(&self.content.amount)
            .ok()
            .map(|amount| amount == self.escrow_base_units)
    }
}

/// One submission in the timeline. `record` is `None` when the ledger
/// lookup for this id failed; `content` is empty when its document could not
/// be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEntry {
    pub submission_id: SubmissionId,
    pub record: Option<SubmissionRecord>,
    pub content: SubmissionContent,
}

impl SubmissionEntry {
    pub fn is_sparse(&self) -> bool {
        self.record.is_none() || self.content.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTimeline {
    pub job: JobView,
    pub submissions: Vec<SubmissionEntry>,
}

/// Reconstructs job records from the ledger and the content store.
pub struct JobAggregator<S, L> {
    store: S,
    ledger: L,
}

impl<S: ContentStore, L: EscrowLedger> JobAggregator<S, L> {
    pub fn new(store: S, ledger: L) -> Self {
        Self { store, ledger }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn load_job(&self, job_id: &JobId) -> Result<JobView> {
        let record = self.ledger.get_job(job_id).await?;

        let counterparty = async {
            match record.selected_application_id {
                Some(application_id) => self
                    .ledger
                    .get_applicant(application_id)
                    .await
                    .map(known_address),
                None => {
                    debug!("Job {} has no selected application yet", job_id);
                    Ok(None)
                }
            }
        };
        let content = async {
            let doc = self.store.fetch(&record.content_hash).await;
            JobContent::from_document(doc)
        };
        let (counterparty, content) = futures::join!(counterparty, content);
        let counterparty = counterparty?;

        let view = JobView {
            job_id: record.job_id,
            employer: record.employer,
            escrow_amount: from_base_units(record.escrow_amount),
            escrow_base_units: record.escrow_amount,
            is_open: record.is_open,
            counterparty,
            content_hash: record.content_hash,
            content,
        };
        if view.amount_agrees() == Some(false) {
            warn!(
                "Job {} content amount {} disagrees with escrow {}",
                view.job_id, view.content.amount, view.escrow_amount
            );
        }
        Ok(view)
    }

    /// All submissions for the job, in ledger order. Each entry is resolved
    /// independently; a failing one comes back sparse.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_submissions(&self, job_id: &JobId) -> Result<Vec<SubmissionEntry>> {
        let ids = self.ledger.get_submission_ids(job_id).await?;
        debug!("Job {} has {} submissions", job_id, ids.len());
        let entries = ids.into_iter().map(|id| self.load_submission(id));
        Ok(join_all(entries).await)
    }

    async fn load_submission(&self, submission_id: SubmissionId) -> SubmissionEntry {
        match self.ledger.get_submission(submission_id).await {
            Ok(record) => {
                let doc = self.store.fetch(&record.submission_hash).await;
                SubmissionEntry {
                    submission_id,
                    record: Some(record),
                    content: SubmissionContent::from_document(doc),
                }
            }
            Err(err) => {
                warn!("Submission {} could not be read: {}", submission_id, err);
                SubmissionEntry {
                    submission_id,
                    record: None,
                    content: SubmissionContent::default(),
                }
            }
        }
    }

    /// The job followed by its submissions. Submissions are only fetched once
    /// the job itself has been read.
    pub async fn load_timeline(&self, job_id: &JobId) -> Result<JobTimeline> {
        let job = self.load_job(job_id).await?;
        let submissions = self.load_submissions(job_id).await?;
        Ok(JobTimeline { job, submissions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::EscrowError,
        mock::{FundBehavior, MemoryStore, MockLedger},
        types::{ApplicationId, JobRecord},
    };
    use alloy::primitives::address;
    use serde_json::json;

    const EMPLOYER: Address = address!("00000000000000000000000000000000000000e1");

    fn record(hash: &str, application: Option<u64>) -> JobRecord {
        JobRecord {
            job_id: "7".into(),
            employer: EMPLOYER,
            escrow_amount: U256::from(2_000_000_000_000_000_000u128),
            is_open: true,
            selected_application_id: application.map(|a| ApplicationId(U256::from(a))),
            content_hash: hash.into(),
        }
    }

    #[tokio::test]
    async fn unset_application_leaves_counterparty_unknown() {
        let store = MemoryStore::default();
        let hash = store.insert(json!({ "title": "Audit", "amount": "2" }));
        let ledger = MockLedger::new(FundBehavior::NoEvent).with_job(record(&hash.0, None));
        let view = JobAggregator::new(&store, &ledger)
            .load_job(&"7".into())
            .await
            .unwrap();
        assert_eq!(view.counterparty, None);
        assert_eq!(view.title(), "Audit");
        assert_eq!(view.amount_agrees(), Some(true));
    }

    #[tokio::test]
    async fn empty_content_hash_degrades() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent).with_job(record("", None));
        let view = JobAggregator::new(&store, &ledger)
            .load_job(&"7".into())
            .await
            .unwrap();
        assert!(view.content.is_empty());
        assert_eq!(view.escrow_amount, "2");
        assert_eq!(view.amount_agrees(), None);
    }

    #[tokio::test]
    async fn reports_amount_disagreement() {
        let store = MemoryStore::default();
        let hash = store.insert(json!({ "amount": "3" }));
        let ledger = MockLedger::new(FundBehavior::NoEvent).with_job(record(&hash.0, None));
        let view = JobAggregator::new(&store, &ledger)
            .load_job(&"7".into())
            .await
            .unwrap();
        assert_eq!(view.amount_agrees(), Some(false));
    }

    #[tokio::test]
    async fn missing_job_is_a_ledger_error() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent);
        let err = JobAggregator::new(&store, &ledger)
            .load_job(&"404".into())
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::LedgerUnreachable(_)));
    }

    #[tokio::test]
    async fn unreadable_submission_record_is_sparse() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent)
            .with_job(record("", None))
            .with_broken_submission("7", U256::from(1));
        let entries = JobAggregator::new(&store, &ledger)
            .load_submissions(&"7".into())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].record.is_none());
        assert!(entries[0].is_sparse());
    }

    #[tokio::test]
    async fn no_submissions() {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent).with_job(record("", None));
        let timeline = JobAggregator::new(&store, &ledger)
            .load_timeline(&"7".into())
            .await
            .unwrap();
        assert!(timeline.submissions.is_empty());
    }
}
