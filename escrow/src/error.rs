use alloy::primitives::B256;
use thiserror::Error;

use crate::units::UnitsError;

/// Every failure the escrow core can hand back to a caller.
///
/// Content resolution failures (`ContentUnresolvable`) never reach the
/// aggregation callers: `ContentStore::fetch` turns them into an empty
/// document. Everything else is surfaced so the caller can render a
/// specific message and offer a retry.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("request was rejected by the user")]
    UserRejected,
    #[error("failed to publish content: {0}")]
    Publish(String),
    #[error("ledger unreachable: {0}")]
    LedgerUnreachable(String),
    #[error("transaction {} reverted: {reason}", fmt_tx(.tx_hash))]
    TransactionReverted {
        tx_hash: Option<B256>,
        reason: String,
    },
    #[error("transaction {tx_hash} confirmed but the assigned job id could not be read")]
    ConfirmedButUnresolved { tx_hash: B256 },
    #[error("transaction {tx_hash} was broadcast but its receipt could not be read: {reason}")]
    BroadcastUnconfirmed { tx_hash: B256, reason: String },
    #[error("content {hash} could not be resolved: {reason}")]
    ContentUnresolvable { hash: String, reason: String },
    #[error(transparent)]
    InvalidAmount(#[from] UnitsError),
    #[error("no wallet account is connected")]
    WalletDisconnected,
    #[error("a funding attempt for this job is already in flight")]
    AlreadyInFlight,
}

fn fmt_tx(tx_hash: &Option<B256>) -> String {
    match tx_hash {
        Some(h) => h.to_string(),
        None => "(not broadcast)".to_string(),
    }
}

impl EscrowError {
    /// True when funds may have moved even though the call failed.
    pub fn funds_may_have_moved(&self) -> bool {
        matches!(
            self,
            EscrowError::ConfirmedButUnresolved { .. } | EscrowError::BroadcastUnconfirmed { .. }
        )
    }

    /// Hash of the funding transaction, when one was broadcast.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            EscrowError::TransactionReverted { tx_hash, .. } => *tx_hash,
            EscrowError::ConfirmedButUnresolved { tx_hash }
            | EscrowError::BroadcastUnconfirmed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
