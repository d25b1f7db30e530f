pub mod azure;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gcp;
pub mod health;
pub mod models;
pub mod naming;
pub mod poll;
pub mod process;
pub mod terraform;
