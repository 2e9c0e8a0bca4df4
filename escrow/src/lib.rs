//! Escrow job data and transaction orchestration.
//!
//! Job records live on the escrow contract; their descriptive content lives
//! in a content-addressed store. [`submitter::TransactionSubmitter`] writes
//! both in order and [`aggregator::JobAggregator`] reads them back into a
//! single view.

pub mod aggregator;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod store;
pub mod submitter;
pub mod types;
pub mod units;
pub mod wallet;

#[cfg(any(test, feature = "test"))]
pub mod mock;

pub use error::{EscrowError, Result};
