use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use escrow::{error::EscrowError, wallet::WalletProvider};
use jsonrpsee::{
    core::ClientError,
    http_client::{HttpClient, HttpClientBuilder},
    proc_macros::rpc,
};
use url::Url;

use crate::ledger::USER_REJECTED_CODE;

#[rpc(client)]
pub trait WalletApi {
    #[method(name = "eth_accounts")]
    async fn accounts(&self) -> Result<Vec<Address>, jsonrpsee::types::ErrorObjectOwned>;

    #[method(name = "eth_requestAccounts")]
    async fn request_accounts(&self) -> Result<Vec<Address>, jsonrpsee::types::ErrorObjectOwned>;
}

/// Wallet reached over JSON-RPC, e.g. a node with managed accounts or a
/// signer daemon.
#[derive(Clone)]
pub struct RpcWallet {
    client: HttpClient,
}

impl RpcWallet {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = HttpClientBuilder::default().build(url)?;
        Ok(Self { client })
    }
}

pub fn wallet_error(err: ClientError) -> EscrowError {
    match err {
        ClientError::Call(obj) if i64::from(obj.code()) == USER_REJECTED_CODE => {
            EscrowError::UserRejected
        }
        other => EscrowError::ProviderUnavailable(other.to_string()),
    }
}

impl WalletProvider for RpcWallet {
    async fn accounts(&self) -> escrow::Result<Vec<Address>> {
        WalletApiClient::accounts(&self.client)
            .await
            .map_err(wallet_error)
    }

    async fn request_accounts(&self) -> escrow::Result<Vec<Address>> {
        WalletApiClient::request_accounts(&self.client)
            .await
            .map_err(wallet_error)
    }
}

/// A private key held by this process. Its account is always authorized.
#[derive(Clone)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
}

impl LocalWallet {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> PrivateKeySigner {
        self.signer.clone()
    }
}

impl WalletProvider for LocalWallet {
    async fn accounts(&self) -> escrow::Result<Vec<Address>> {
        Ok(vec![self.signer.address()])
    }

    async fn request_accounts(&self) -> escrow::Result<Vec<Address>> {
        self.accounts().await
    }
}

/// Either kind of wallet, picked from configuration at startup.
#[derive(Clone)]
pub enum Wallet {
    Local(LocalWallet),
    Rpc(RpcWallet),
}

impl WalletProvider for Wallet {
    async fn accounts(&self) -> escrow::Result<Vec<Address>> {
        match self {
            Wallet::Local(w) => w.accounts().await,
            Wallet::Rpc(w) => w.accounts().await,
        }
    }

    async fn request_accounts(&self) -> escrow::Result<Vec<Address>> {
        match self {
            Wallet::Local(w) => w.request_accounts().await,
            Wallet::Rpc(w) => w.request_accounts().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow::wallet::WalletSessionManager;
    use jsonrpsee::types::ErrorObjectOwned;

    #[test]
    fn rejection_code() {
        let rejected = ClientError::Call(ErrorObjectOwned::owned(
            4001,
            "User rejected the request.",
            None::<()>,
        ));
        assert!(matches!(wallet_error(rejected), EscrowError::UserRejected));

        let other = ClientError::Call(ErrorObjectOwned::owned(
            -32601,
            "method not found",
            None::<()>,
        ));
        assert!(matches!(
            wallet_error(other),
            EscrowError::ProviderUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn local_wallet_is_always_connected() {
        let signer = PrivateKeySigner::random();
        let address = signer.address();
        let mut manager = WalletSessionManager::new(Some(LocalWallet::new(signer)));
        assert_eq!(manager.probe().await, Some(address));
        manager.disconnect();
        assert_eq!(manager.connect().await.unwrap(), address);
    }

    #[tokio::test]
    async fn unreachable_rpc_wallet_probes_disconnected() {
        let wallet = RpcWallet::new(Url::parse("http://127.0.0.1:9").unwrap()).unwrap();
        let mut manager = WalletSessionManager::new(Some(Wallet::Rpc(wallet)));
        assert_eq!(manager.probe().await, None);
        assert!(matches!(
            manager.connect().await,
            Err(EscrowError::ProviderUnavailable(_))
        ));
    }
}
