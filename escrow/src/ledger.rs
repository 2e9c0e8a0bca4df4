use alloy::{
    primitives::{Address, Log, B256, U256},
    sol_types::SolEvent,
};
use tracing::debug;

use crate::{
    contract::JobEscrow,
    error::Result,
    types::{ApplicationId, ContentHash, JobId, JobRecord, SubmissionId, SubmissionRecord},
};

/// Value-bearing call to `enterDirectContract`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundRequest {
    pub content_hash: ContentHash,
    pub counterparty: Address,
    /// Base units.
    pub amount: U256,
    pub sender: Address,
}

/// What the ledger reports once a funding transaction is mined.
#[derive(Debug, Clone)]
pub struct FundingReceipt {
    pub tx_hash: B256,
    pub status: bool,
    pub logs: Vec<Log>,
}

impl FundingReceipt {
    /// Job id carried by the first `ContractEntered` log emitted by `contract`
    /// with a non-empty id.
    pub fn job_id(&self, contract: Address) -> Option<JobId> {
        self.logs
            .iter()
            .filter(|log| log.address == contract)
            .find_map(|log| {
                match JobEscrow::ContractEntered::decode_log_data(&log.data, true) {
                    Ok(event) if event.jobId.is_empty() => {
                        debug!("Ignoring ContractEntered without a job id");
                        None
                    }
                    Ok(event) => Some(JobId(event.jobId)),
                    Err(err) => {
                        debug!("Ignoring log that is not ContractEntered: {}", err);
                        None
                    }
                }
            })
    }
}

/// Typed access to the escrow contract.
#[allow(async_fn_in_trait)]
pub trait EscrowLedger {
    /// Address of the escrow contract, used to attribute emitted events.
    fn address(&self) -> Address;

    async fn get_job(&self, job_id: &JobId) -> Result<JobRecord>;

    async fn get_applicant(&self, application_id: ApplicationId) -> Result<Address>;

    /// Submission ids in ledger order.
    async fn get_submission_ids(&self, job_id: &JobId) -> Result<Vec<SubmissionId>>;

    async fn get_submission(&self, submission_id: SubmissionId) -> Result<SubmissionRecord>;

    /// Broadcast the funding transaction and wait for it to be mined. No
    /// timeout is applied.
    async fn fund_job(&self, request: FundRequest) -> Result<FundingReceipt>;
}

impl<L: EscrowLedger> EscrowLedger for &L {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn get_job(&self, job_id: &JobId) -> Result<JobRecord> {
        (**self).get_job(job_id).await
    }

    async fn get_applicant(&self, application_id: ApplicationId) -> Result<Address> {
        (**self).get_applicant(application_id).await
    }

    async fn get_submission_ids(&self, job_id: &JobId) -> Result<Vec<SubmissionId>> {
        (**self).get_submission_ids(job_id).await
    }

    async fn get_submission(&self, submission_id: SubmissionId) -> Result<SubmissionRecord> {
        (**self).get_submission(submission_id).await
    }

    async fn fund_job(&self, request: FundRequest) -> Result<FundingReceipt> {
        (**self).fund_job(request).await
    }
}
