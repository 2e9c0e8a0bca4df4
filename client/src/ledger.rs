use alloy::{
    network::Ethereum,
    primitives::Address,
    providers::Provider,
    transports::{
        http::{Client, Http},
        RpcError, TransportErrorKind,
    },
};
use escrow::{
    contract::JobEscrow,
    error::{EscrowError, Result},
    ledger::{EscrowLedger, FundRequest, FundingReceipt},
    types::{ApplicationId, JobId, JobRecord, SubmissionId, SubmissionRecord},
};
use tracing::{debug, info, instrument};

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Geth/anvil code for a reverted call or gas estimate.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Escrow contract accessed through an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyLedger<P> {
    address: Address,
    provider: P,
    max_gas: Option<u64>,
}

impl<P> AlloyLedger<P>
where
    P: Provider<Http<Client>, Ethereum> + Clone,
{
    pub fn new(address: Address, provider: P, max_gas: Option<u64>) -> Self {
        Self {
            address,
            provider,
            max_gas,
        }
    }
}

fn read_error(err: alloy::contract::Error) -> EscrowError {
    EscrowError::LedgerUnreachable(err.to_string())
}

fn send_error(err: alloy::contract::Error) -> EscrowError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_send_error(&e),
        other => EscrowError::LedgerUnreachable(other.to_string()),
    }
}

/// Map a failure to broadcast a transaction onto the error taxonomy.
pub fn classify_send_error(err: &RpcError<TransportErrorKind>) -> EscrowError {
    match err {
        RpcError::ErrorResp(payload) if payload.code == USER_REJECTED_CODE => {
            EscrowError::UserRejected
        }
        RpcError::ErrorResp(payload)
            if payload.code == EXECUTION_REVERTED_CODE || payload.message.contains("revert") =>
        {
            EscrowError::TransactionReverted {
                tx_hash: None,
                reason: payload.message.to_string(),
            }
        }
        RpcError::Transport(kind) => EscrowError::ProviderUnavailable(kind.to_string()),
        other => EscrowError::LedgerUnreachable(other.to_string()),
    }
}

impl<P> EscrowLedger for AlloyLedger<P>
where
    P: Provider<Http<Client>, Ethereum> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn get_job(&self, job_id: &JobId) -> Result<JobRecord> {
        let escrow = JobEscrow::new(self.address, self.provider.clone());
        let details = escrow
            .getJobDetails(job_id.0.clone())
            .call()
            .await
            .map_err(read_error)?
            ._0;
        Ok(details.into_record(job_id.clone()))
    }

    async fn get_applicant(&self, application_id: ApplicationId) -> Result<Address> {
        let escrow = JobEscrow::new(self.address, self.provider.clone());
        let applicant = escrow
            .getApplicationApplicant(application_id.0)
            .call()
            .await
            .map_err(read_error)?
            ._0;
        Ok(applicant)
    }

    async fn get_submission_ids(&self, job_id: &JobId) -> Result<Vec<SubmissionId>> {
        let escrow = JobEscrow::new(self.address, self.provider.clone());
        let ids = escrow
            .getJobSubmissionIDs(job_id.0.clone())
            .call()
            .await
            .map_err(read_error)?
            ._0;
        Ok(ids.into_iter().map(SubmissionId).collect())
    }

    async fn get_submission(&self, submission_id: SubmissionId) -> Result<SubmissionRecord> {
        let escrow = JobEscrow::new(self.address, self.provider.clone());
        let submission = escrow
            .getWorkSubmission(submission_id.0)
            .call()
            .await
            .map_err(read_error)?
            ._0;
        Ok(submission.into_record(submission_id))
    }

    #[instrument(skip_all, level = "info", fields(sender = %request.sender))]
    async fn fund_job(&self, request: FundRequest) -> Result<FundingReceipt> {
        let escrow = JobEscrow::new(self.address, self.provider.clone());
        let mut call = escrow
            .enterDirectContract(request.content_hash.0.clone(), request.counterparty)
            .value(request.amount)
            .from(request.sender);
        if let Some(gas) = self.max_gas {
            call = call.gas(gas);
        }
        let pending = call.send().await.map_err(send_error)?;
        let tx_hash = *pending.tx_hash();
        info!("Funding transaction {} broadcast, waiting for receipt", tx_hash);

        // past this point the value may already be escrowed
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| EscrowError::BroadcastUnconfirmed {
                tx_hash,
                reason: e.to_string(),
            })?;
        debug!(
            "Transaction {} mined in block {:?}",
            tx_hash, receipt.block_number
        );
        Ok(FundingReceipt {
            tx_hash: receipt.transaction_hash,
            status: receipt.status(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        })
    }
}
