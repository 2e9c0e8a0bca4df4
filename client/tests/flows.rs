use alloy::primitives::{address, utils::parse_ether, Address, U256};
use anyhow::{Ok, Result};
use escrow::{
    aggregator::JobAggregator,
    mock::{strategy, tx_hash_for, FundBehavior, MemoryStore, MockLedger},
    store::ContentStore,
    submitter::{JobForm, TransactionSubmitter},
    types::{
        ApplicationId, ContentHash, JobContent, JobId, JobRecord, SubmissionId, SubmissionRecord,
    },
    units::{from_base_units, to_base_units},
    wallet::WalletSession,
    EscrowError,
};
use proptest::{
    strategy::{Strategy, ValueTree},
    test_runner::TestRunner,
};
use serde_json::json;

static EMPLOYER: Address = address!("000000000000000000000000000000000000e1e1");
static WORKER: Address = address!("000000000000000000000000000000000000a1a1");

fn logo_form() -> JobForm {
    JobForm {
        title: "Logo design".to_string(),
        description: "A new logo for the shop".to_string(),
        job_type: "design".to_string(),
        counterparty: WORKER,
        amount: "1.5".to_string(),
    }
}

fn employer_session() -> WalletSession {
    WalletSession::connected(EMPLOYER)
}

mod funding {
    use super::*;

    #[tokio::test]
    async fn returns_the_job_id_from_the_event() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("42".to_string()));
        let submitter = TransactionSubmitter::new(&store, &ledger);

        let job_id = submitter.submit(&logo_form(), &employer_session()).await?;
        assert_eq!(job_id, JobId::from("42"));

        let requests = ledger.fund_requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.amount, parse_ether("1.5")?);
        assert_eq!(request.counterparty, WORKER);
        assert_eq!(request.sender, EMPLOYER);

        // the content was stored before the transaction referenced it
        let content = JobContent::from_document(store.try_fetch(&request.content_hash).await?);
        assert_eq!(content.title, "Logo design");
        assert_eq!(content.amount, "1.5");
        Ok(())
    }

    #[tokio::test]
    async fn missing_event_is_confirmed_but_unresolved() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent);
        let submitter = TransactionSubmitter::new(&store, &ledger);

        let err = submitter
            .submit(&logo_form(), &employer_session())
            .await
            .unwrap_err();
        let EscrowError::ConfirmedButUnresolved { tx_hash } = err else {
            panic!("expected ConfirmedButUnresolved, got {:?}", err);
        };
        assert_eq!(tx_hash, tx_hash_for(0));
        Ok(())
    }

    #[tokio::test]
    async fn distinguishes_ledger_failures() -> Result<()> {
        let cases = [
            (FundBehavior::Reject, "UserRejected"),
            (FundBehavior::Unreachable, "ProviderUnavailable"),
            (FundBehavior::Revert, "TransactionReverted"),
        ];
        for (behavior, expected) in cases {
            let store = MemoryStore::default();
            let ledger = MockLedger::new(behavior);
            let err = TransactionSubmitter::new(&store, &ledger)
                .submit(&logo_form(), &employer_session())
                .await
                .unwrap_err();
            let matched = match err {
                EscrowError::UserRejected => "UserRejected",
                EscrowError::ProviderUnavailable(_) => "ProviderUnavailable",
                EscrowError::TransactionReverted { tx_hash, .. } => {
                    assert_eq!(tx_hash, Some(tx_hash_for(0)));
                    "TransactionReverted"
                }
                other => panic!("unexpected error {:?}", other),
            };
            assert_eq!(matched, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn lost_receipt_is_not_retried() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::LostReceipt);
        let submitter = TransactionSubmitter::new(&store, &ledger);
        let form = logo_form();

        let err = submitter
            .submit(&form, &employer_session())
            .await
            .unwrap_err();
        let EscrowError::BroadcastUnconfirmed { tx_hash, .. } = &err else {
            panic!("expected BroadcastUnconfirmed, got {:?}", err);
        };
        assert_eq!(*tx_hash, tx_hash_for(0));
        assert!(err.funds_may_have_moved());

        let retry = submitter.submit(&form, &employer_session()).await;
        assert!(matches!(retry, Err(EscrowError::AlreadyInFlight)));
        assert_eq!(ledger.fund_calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_attempts_submit_once() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("42".to_string()));
        let submitter = TransactionSubmitter::new(&store, &ledger);
        let form = logo_form();
        let session = employer_session();

        let (first, second) = futures::join!(
            submitter.submit(&form, &session),
            submitter.submit(&form, &session)
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(EscrowError::AlreadyInFlight))));
        assert_eq!(ledger.fund_calls(), 1);
        assert!(!submitter.is_in_flight(&form));
        Ok(())
    }

    #[tokio::test]
    async fn different_forms_do_not_block_each_other() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("42".to_string()));
        let submitter = TransactionSubmitter::new(&store, &ledger);
        let other = JobForm {
            title: "Website".to_string(),
            ..logo_form()
        };
        let logo = logo_form();
        let session = employer_session();

        let (a, b) = futures::join!(
            submitter.submit(&logo, &session),
            submitter.submit(&other, &session)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(ledger.fund_calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn escrowed_amount_matches_the_form() -> Result<()> {
        let mut runner = TestRunner::default();
        let strategy = strategy::display_amount();
        for _ in 0..32 {
            let amount = strategy.new_tree(&mut runner).unwrap().current();
            let store = MemoryStore::default();
            let ledger = MockLedger::new(FundBehavior::Emit("1".to_string()));
            let form = JobForm {
                amount: amount.clone(),
                ..logo_form()
            };
            TransactionSubmitter::new(&store, &ledger)
                .submit(&form, &employer_session())
                .await?;
            let request = ledger.fund_requests().remove(0);
            assert_eq!(request.amount, to_base_units(&amount)?);
            let content = JobContent::from_document(store.fetch(&request.content_hash).await);
            assert_eq!(to_base_units(&content.amount)?, request.amount);
        }
        Ok(())
    }
}

mod aggregation {
    use super::*;

    fn job_42(content_hash: ContentHash) -> JobRecord {
        JobRecord {
            job_id: JobId::from("42"),
            employer: EMPLOYER,
            escrow_amount: U256::from(1_500_000_000_000_000_000u128),
            is_open: true,
            selected_application_id: Some(ApplicationId(U256::from(7))),
            content_hash,
        }
    }

    fn submission(id: u64, hash: &ContentHash) -> SubmissionRecord {
        SubmissionRecord {
            submission_id: SubmissionId(U256::from(id)),
            worker: WORKER,
            submission_hash: hash.clone(),
            timestamp: 1_700_000_000 + id,
        }
    }

    #[tokio::test]
    async fn merges_ledger_and_content() -> Result<()> {
        let store = MemoryStore::default();
        let hash = store.insert(json!({ "title": "Logo design" }));
        let ledger = MockLedger::new(FundBehavior::NoEvent)
            .with_job(job_42(hash.clone()))
            .with_applicant(ApplicationId(U256::from(7)), WORKER);

        let view = JobAggregator::new(&store, &ledger)
            .load_job(&JobId::from("42"))
            .await?;
        assert_eq!(view.escrow_amount, "1.5");
        assert_eq!(view.title(), "Logo design");
        assert_eq!(view.employer, EMPLOYER);
        assert_eq!(view.counterparty, Some(WORKER));
        assert!(view.is_open);
        assert_eq!(view.content_hash, hash);
        Ok(())
    }

    #[tokio::test]
    async fn unresolvable_content_gives_partial_record() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::NoEvent)
            .with_job(job_42(ContentHash::from("QmMissing")))
            .with_applicant(ApplicationId(U256::from(7)), WORKER);

        let view = JobAggregator::new(&store, &ledger)
            .load_job(&JobId::from("42"))
            .await?;
        assert_eq!(view.employer, EMPLOYER);
        assert_eq!(view.escrow_base_units, parse_ether("1.5")?);
        assert_eq!(view.counterparty, Some(WORKER));
        assert!(view.content.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_content_gives_partial_record() -> Result<()> {
        let store = MemoryStore::default();
        let hash = ContentHash::from("QmList");
        store.insert_at(hash.clone(), json!(["not", "an", "object"]));
        let ledger = MockLedger::new(FundBehavior::NoEvent).with_job(job_42(hash));

        let view = JobAggregator::new(&store, &ledger)
            .load_job(&JobId::from("42"))
            .await?;
        assert!(view.content.is_empty());
        // application 7 has no applicant on file
        assert_eq!(view.counterparty, None);
        Ok(())
    }

    #[tokio::test]
    async fn one_bad_submission_does_not_sink_the_batch() -> Result<()> {
        let store = MemoryStore::default();
        let hashes: Vec<ContentHash> = (1..=4)
            .map(|i| store.insert(json!({ "update": format!("milestone {}", i) })))
            .collect();
        let lost = ContentHash::from("QmLost");
        let mut ledger = MockLedger::new(FundBehavior::NoEvent).with_job(job_42(hashes[0].clone()));
        // ledger order deliberately differs from id order
        for (id, hash) in [(9, &hashes[0]), (3, &lost), (5, &hashes[2]), (1, &hashes[3])] {
            ledger = ledger.with_submission("42", submission(id, hash));
        }

        let entries = JobAggregator::new(&store, &ledger)
            .load_submissions(&JobId::from("42"))
            .await?;
        let ids: Vec<U256> = entries.iter().map(|e| e.submission_id.0).collect();
        assert_eq!(
            ids,
            vec![U256::from(9), U256::from(3), U256::from(5), U256::from(1)]
        );
        assert_eq!(entries.iter().filter(|e| e.content.is_empty()).count(), 1);
        assert!(entries[1].content.is_empty());
        assert!(entries[1].record.is_some());
        assert_eq!(entries[0].content.update, "milestone 1");
        assert_eq!(entries[3].content.update, "milestone 4");
        Ok(())
    }

    #[tokio::test]
    async fn funded_job_can_be_read_back() -> Result<()> {
        let store = MemoryStore::default();
        let ledger = MockLedger::new(FundBehavior::Emit("42".to_string()));
        let job_id = TransactionSubmitter::new(&store, &ledger)
            .submit(&logo_form(), &employer_session())
            .await?;

        let timeline = JobAggregator::new(&store, &ledger)
            .load_timeline(&job_id)
            .await?;
        assert_eq!(timeline.job.title(), "Logo design");
        assert_eq!(timeline.job.escrow_amount, from_base_units(parse_ether("1.5")?));
        assert_eq!(timeline.job.amount_agrees(), Some(true));
        assert_eq!(timeline.job.content.job_giver, EMPLOYER.to_string());
        assert_eq!(timeline.job.counterparty, None);
        assert!(timeline.submissions.is_empty());
        Ok(())
    }
}
