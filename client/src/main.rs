use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use clap::Parser;
use escrow::{
    aggregator::JobAggregator,
    ledger::EscrowLedger,
    store::ContentStore,
    submitter::{JobForm, TransactionSubmitter},
    types::JobId,
    wallet::WalletSessionManager,
    EscrowError,
};
use escrow_client::{
    cli::{AccountsConfig, BaseConfig, Command, CreateConfig, JobConfig},
    content_store::HttpContentStore,
    env::{create_node_provider, create_provider, init_console_subscriber},
    ledger::AlloyLedger,
    wallet::{LocalWallet, RpcWallet, Wallet},
};
use serde::Serialize;
use std::{str::FromStr, time::Duration};
use tracing::{error, info, warn};

fn content_store(base: &BaseConfig) -> Result<HttpContentStore> {
    HttpContentStore::new(
        base.pin_url.clone(),
        base.gateway_url.clone(),
        Duration::from_secs(base.content_timeout),
    )
}

fn wallet(base: &BaseConfig) -> Result<Wallet> {
    match base.owner_key.as_deref() {
        Some(key) => {
            let signer = PrivateKeySigner::from_str(key)?;
            Ok(Wallet::Local(LocalWallet::new(signer)))
        }
        None => Ok(Wallet::Rpc(RpcWallet::new(base.wallet_url()?)?)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Probe first so an already-authorized account never triggers a prompt.
async fn connected_session(wallet: Wallet) -> Result<WalletSessionManager<Wallet>> {
    let mut manager = WalletSessionManager::new(Some(wallet));
    if manager.probe().await.is_none() {
        info!("No authorized account, requesting authorization from the wallet");
        manager.connect().await?;
    }
    Ok(manager)
}

async fn fund(
    store: impl ContentStore,
    ledger: impl EscrowLedger,
    wallet: Wallet,
    form: &JobForm,
) -> Result<JobId> {
    let manager = connected_session(wallet).await?;
    let submitter = TransactionSubmitter::new(store, ledger);
    match submitter.submit(form, &manager.session()).await {
        Ok(job_id) => Ok(job_id),
        Err(err) => {
            if err.funds_may_have_moved() {
                error!(
                    "Funds may already be escrowed, check transaction {:?} before retrying",
                    err.tx_hash()
                );
            }
            Err(err.into())
        }
    }
}

async fn create(config: CreateConfig) -> Result<JobId> {
    let base = &config.base;
    let store = content_store(base)?;
    let form = JobForm {
        title: config.title.clone(),
        description: config.description.clone(),
        job_type: config.job_type.clone(),
        counterparty: config.job_taker,
        amount: config.amount.clone(),
    };
    let tx_url = base.transaction_url()?;
    match wallet(base)? {
        Wallet::Local(local) => {
            let provider = create_provider(tx_url, local.signer());
            let ledger = AlloyLedger::new(base.escrow_address, provider, base.max_gas);
            fund(store, ledger, Wallet::Local(local), &form).await
        }
        rpc @ Wallet::Rpc(_) => {
            let provider = create_node_provider(tx_url);
            let ledger = AlloyLedger::new(base.escrow_address, provider, base.max_gas);
            fund(store, ledger, rpc, &form).await
        }
    }
}

async fn show(config: JobConfig, with_updates: bool) -> Result<()> {
    let base = &config.base;
    let ledger = AlloyLedger::new(
        base.escrow_address,
        create_node_provider(base.node_url()?),
        base.max_gas,
    );
    let aggregator = JobAggregator::new(content_store(base)?, ledger);
    let job_id = JobId(config.job_id.clone());
    if with_updates {
        let timeline = aggregator.load_timeline(&job_id).await?;
        let sparse = timeline.submissions.iter().filter(|s| s.is_sparse()).count();
        if sparse > 0 {
            warn!("{} of {} submissions are incomplete", sparse, timeline.submissions.len());
        }
        print_json(&timeline)
    } else {
        print_json(&aggregator.load_job(&job_id).await?)
    }
}

async fn accounts(config: AccountsConfig) -> Result<()> {
    let mut manager = WalletSessionManager::new(Some(wallet(&config.base)?));
    if manager.probe().await.is_none() && config.connect {
        match manager.connect().await {
            Ok(_) => {}
            Err(EscrowError::UserRejected) => warn!("Authorization request was rejected"),
            Err(err) => return Err(err.into()),
        }
    }
    print_json(&manager.session())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_console_subscriber();
    match Command::parse() {
        Command::Create(config) => {
            info!("{}", serde_json::to_string_pretty(&config)?);
            let job_id = create(config).await?;
            println!("{}", job_id);
            Ok(())
        }
        Command::Show(config) => {
            info!("{}", serde_json::to_string_pretty(&config)?);
            show(config, false).await
        }
        Command::Updates(config) => {
            info!("{}", serde_json::to_string_pretty(&config)?);
            show(config, true).await
        }
        Command::Accounts(config) => {
            info!("{}", serde_json::to_string_pretty(&config)?);
            accounts(config).await
        }
    }
}
