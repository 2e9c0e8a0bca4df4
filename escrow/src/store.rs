use serde_json::{Map, Value};
use tracing::warn;

use crate::{error::Result, types::ContentHash};

/// Content-addressed document storage.
///
/// `publish` failures must stop any ledger step that would reference the
/// hash. Fetch failures never propagate through `fetch`: callers get an
/// empty document and treat missing fields as unknown.
#[allow(async_fn_in_trait)]
pub trait ContentStore {
    async fn publish(&self, content: &Value) -> Result<ContentHash>;

    /// Resolve a document, reporting why it could not be resolved.
    async fn try_fetch(&self, hash: &ContentHash) -> Result<Map<String, Value>>;

    async fn fetch(&self, hash: &ContentHash) -> Map<String, Value> {
        if hash.is_empty() {
            warn!("Skipping fetch of empty content hash");
            return Map::new();
        }
        match self.try_fetch(hash).await {
            Ok(doc) => doc,
            Err(err) => {
                warn!("Content {} unavailable, using empty document: {}", hash, err);
                Map::new()
            }
        }
    }
}

impl<S: ContentStore> ContentStore for &S {
    async fn publish(&self, content: &Value) -> Result<ContentHash> {
        (**self).publish(content).await
    }

    async fn try_fetch(&self, hash: &ContentHash) -> Result<Map<String, Value>> {
        (**self).try_fetch(hash).await
    }
}
