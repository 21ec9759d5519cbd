//! visitor-relay - anonymous visitor identification relay
//!
//! Collects per-page activity from visitors' browsers, stages it locally as
//! one row per (page, visitor IP, day) and forwards it in encrypted batches to
//! a remote analytics service.
//!
//! # Architecture
//! - `batcher`: client-side activity batching (time-on-page ticks, periodic flushes)
//! - `staging`: local staging table and its sea-orm store
//! - `services`: reconciler, consent gate, geo enrichment, remote client, sessions
//! - `transfer`: hourly bulk transfer of staged rows
//! - `crypto`: RSA-OAEP + AES-256-CBC envelope for every outbound payload
//! - `api`: HTTP services and middleware
//! - `config`: configuration management
//! - `runtime`: application lifecycle and execution modes
//! - `system`: logging

pub mod api;
pub mod batcher;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod runtime;
pub mod services;
pub mod staging;
pub mod structs;
pub mod system;
pub mod transfer;
pub mod utils;
