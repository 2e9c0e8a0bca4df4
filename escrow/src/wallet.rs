use alloy::primitives::Address;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EscrowError, Result};

/// Source of authorized accounts, e.g. a browser-style JSON-RPC wallet or a
/// local signer.
#[allow(async_fn_in_trait)]
pub trait WalletProvider {
    /// Accounts already authorized for this client. Must not prompt.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Ask for authorization. May prompt the user.
    async fn request_accounts(&self) -> Result<Vec<Address>>;
}

/// Locally known wallet state. Not persisted; re-derive it with
/// [`WalletSessionManager::probe`] at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalletSession {
    address: Option<Address>,
}

impl WalletSession {
    pub fn connected(address: Address) -> Self {
        Self {
            address: Some(address),
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }
}

/// Drives a [`WalletSession`] through `Disconnected -> Connected ->
/// Disconnected`. A missing provider is a distinct state, not an error, until
/// someone tries to connect.
pub struct WalletSessionManager<W> {
    provider: Option<W>,
    session: WalletSession,
}

impl<W: WalletProvider> WalletSessionManager<W> {
    pub fn new(provider: Option<W>) -> Self {
        Self {
            provider,
            session: WalletSession::default(),
        }
    }

    pub fn session(&self) -> WalletSession {
        self.session
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Adopt an already-authorized account without prompting. Any provider
    /// failure leaves the session disconnected.
    pub async fn probe(&mut self) -> Option<Address> {
        let address = match &self.provider {
            None => {
                debug!("No wallet provider present");
                None
            }
            Some(provider) => match provider.accounts().await {
                Ok(accounts) => accounts.first().copied(),
                Err(err) => {
                    warn!("Wallet probe failed, treating as disconnected: {}", err);
                    None
                }
            },
        };
        self.session = WalletSession { address };
        address
    }

    pub async fn connect(&mut self) -> Result<Address> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            EscrowError::ProviderUnavailable("no wallet provider is configured".to_string())
        })?;
        let accounts = provider.request_accounts().await?;
        // an empty grant means the user dismissed the prompt
        let address = accounts.first().copied().ok_or(EscrowError::UserRejected)?;
        info!("Wallet connected as {}", address);
        self.session = WalletSession::connected(address);
        Ok(address)
    }

    /// Forget the local session. The provider keeps its authorization.
    pub fn disconnect(&mut self) {
        if let Some(address) = self.session.address.take() {
            info!("Wallet {} disconnected", address);
        }
    }
}
