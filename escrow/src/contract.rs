use alloy::{
    primitives::{Address, U256},
    sol,
};

use crate::types::{ApplicationId, ContentHash, JobId, JobRecord, SubmissionId, SubmissionRecord};

sol!(
    #[sol(rpc, all_derives)]
    interface JobEscrow {
        struct JobDetails {
            address employer;
            string jobDetailHash;
            uint256 escrowAmount;
            bool isOpen;
            uint256 selectedApplicationID;
        }

        struct WorkSubmission {
            uint256 id;
            address worker;
            string submissionHash;
            uint256 timestamp;
        }

        event ContractEntered(string jobId, address indexed jobGiver, address indexed jobTaker, uint256 amount);

        function getJobDetails(string jobId) external view returns (JobDetails memory);
        function getApplicationApplicant(uint256 applicationId) external view returns (address);
        function getJobSubmissionIDs(string jobId) external view returns (uint256[] memory);
        function getWorkSubmission(uint256 submissionId) external view returns (WorkSubmission memory);

        function enterDirectContract(string jobDetailHash, address jobTaker) external payable;
    }
);

impl JobEscrow::JobDetails {
    pub fn into_record(self, job_id: JobId) -> JobRecord {
        // the contract leaves the id at zero until an application is selected
        let selected_application_id = if self.selectedApplicationID == U256::ZERO {
            None
        } else {
            Some(ApplicationId(self.selectedApplicationID))
        };
        JobRecord {
            job_id,
            employer: self.employer,
            escrow_amount: self.escrowAmount,
            is_open: self.isOpen,
            selected_application_id,
            content_hash: ContentHash(self.jobDetailHash),
        }
    }
}

impl JobEscrow::WorkSubmission {
    pub fn into_record(self, submission_id: SubmissionId) -> SubmissionRecord {
        SubmissionRecord {
            submission_id,
            worker: self.worker,
            submission_hash: ContentHash(self.submissionHash),
            timestamp: u64::try_from(self.timestamp).unwrap_or(u64::MAX),
        }
    }
}

/// An applicant of `Address::ZERO` means the contract has nobody on file.
pub fn known_address(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}
