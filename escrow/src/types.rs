use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Ledger-assigned job identifier. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

/// Address of a document in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub U256);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub U256);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        ContentHash(s.to_string())
    }
}

impl ContentHash {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Authoritative job state as held by the escrow contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub employer: Address,
    pub escrow_amount: U256,
    pub is_open: bool,
    /// `None` while no application has been selected.
    pub selected_application_id: Option<ApplicationId>,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub worker: Address,
    pub submission_hash: ContentHash,
    pub timestamp: u64,
}

/// Descriptive job fields stored off-chain. Advisory only: every field may
/// be blank when the document is missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobContent {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub job_taker: String,
    pub amount: String,
    pub job_giver: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobContent {
    /// Lenient read of a fetched document. Fields of the wrong shape are
    /// dropped instead of failing the whole document.
    pub fn from_document(mut doc: Map<String, Value>) -> Self {
        Self {
            title: take_text(&mut doc, "title"),
            description: take_text(&mut doc, "description"),
            job_type: take_text(&mut doc, "type"),
            job_taker: take_text(&mut doc, "jobTaker"),
            amount: take_text(&mut doc, "amount"),
            job_giver: take_text(&mut doc, "jobGiver"),
            extra: doc,
        }
    }

    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Worker-supplied content attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionContent {
    pub update: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubmissionContent {
    pub fn from_document(mut doc: Map<String, Value>) -> Self {
        Self {
            update: take_text(&mut doc, "update"),
            extra: doc,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.extra.is_empty()
    }
}

fn take_text(doc: &mut Map<String, Value>, key: &str) -> String {
    match doc.remove(key) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
