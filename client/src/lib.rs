pub mod cli;
pub mod content_store;
pub mod env;
pub mod ledger;
pub mod wallet;
