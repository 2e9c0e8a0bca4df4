use alloy::{
    network::{Ethereum, EthereumWallet},
    providers::{Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use std::io::IsTerminal;
use time::macros::format_description;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    EnvFilter,
};
use url::Url;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Log to stderr so command output on stdout stays parseable JSON.
pub fn init_console_subscriber() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour repr:24]:[minute]:[second].[subsecond digits:3]Z"
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(timer)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

/// Provider for the escrow contract that signs funding transactions with
/// the employer's local key before broadcasting them to `url`.
pub fn create_provider(
    url: Url,
    employer: PrivateKeySigner,
) -> impl Provider<Http<Client>, Ethereum> + Clone {
    ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(employer))
        .on_http(url)
}

/// Provider without a local signer, used for reads and for wallets that
/// manage their own keys. Transactions go out as `eth_sendTransaction` and
/// are signed by whoever holds the `from` account behind `url`.
pub fn create_node_provider(url: Url) -> impl Provider<Http<Client>, Ethereum> + Clone {
    ProviderBuilder::new().with_recommended_fillers().on_http(url)
}
