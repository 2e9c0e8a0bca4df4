use escrow::{
    error::{EscrowError, Result},
    store::ContentStore,
    types::ContentHash,
};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Content store reached over HTTP: documents are published by POSTing them
/// to a pinning endpoint and read back from an IPFS gateway.
#[derive(Clone)]
pub struct HttpContentStore {
    client: Client,
    pin_url: Url,
    gateway_url: Url,
}

impl HttpContentStore {
    pub fn new(pin_url: Url, gateway_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            pin_url,
            gateway_url,
        })
    }

    pub fn document_url(&self, hash: &ContentHash) -> std::result::Result<Url, url::ParseError> {
        let base = self.gateway_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/ipfs/{}", base, hash))
    }
}

/// Read the content address out of a pinning response. Pinata answers with
/// `IpfsHash`, the IPFS HTTP API with `Hash`, others with `cid`.
pub fn parse_pin_response(body: &[u8]) -> std::result::Result<ContentHash, String> {
    let v: Value = serde_json::from_slice(body).map_err(|e| format!("invalid response: {}", e))?;
    ["IpfsHash", "Hash", "cid"]
        .iter()
        .find_map(|key| v.get(*key).and_then(Value::as_str))
        .filter(|hash| !hash.is_empty())
        .map(|hash| ContentHash(hash.to_string()))
        .ok_or_else(|| "response carries no content hash".to_string())
}

/// A stored document must be a JSON object.
pub fn decode_document(body: &[u8]) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err("document is not a JSON object".to_string()),
        Err(e) => Err(format!("malformed JSON: {}", e)),
    }
}

impl ContentStore for HttpContentStore {
    #[instrument(skip_all, level = "debug")]
    async fn publish(&self, content: &Value) -> Result<ContentHash> {
        let response = self
            .client
            .post(self.pin_url.clone())
            .json(content)
            .send()
            .await
            .map_err(|e| EscrowError::Publish(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EscrowError::Publish(format!(
                "pinning endpoint answered {}",
                status
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| EscrowError::Publish(e.to_string()))?;
        let hash = parse_pin_response(&body).map_err(EscrowError::Publish)?;
        debug!("Pinned document as {}", hash);
        Ok(hash)
    }

    async fn try_fetch(&self, hash: &ContentHash) -> Result<Map<String, Value>> {
        let unresolvable = |reason: String| EscrowError::ContentUnresolvable {
            hash: hash.to_string(),
            reason,
        };
        let url = self
            .document_url(hash)
            .map_err(|e| unresolvable(e.to_string()))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unresolvable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unresolvable(format!("gateway answered {}", response.status())));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| unresolvable(e.to_string()))?;
        decode_document(&body).map_err(unresolvable)
    }
}
