//! Stockflow API Library
//!
//! Multi-tenant stock ledger, order fulfillment and marketplace
//! reconciliation engine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod crypto;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod marketplace;
pub mod message_queue;
pub mod migrator;
pub mod services;
