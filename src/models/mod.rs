// Data models module
pub mod achievement;
pub mod activity;
pub mod ledger;
pub mod reward;
