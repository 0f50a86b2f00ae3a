// src/lib.rs

pub mod types;
pub mod proof;
pub mod ledger;
pub mod peers;
pub mod consensus;
pub mod sync;
pub mod runtime;
pub mod config;
pub mod api;
