//! Multi-chain EVM log ingestion and usage evaluation for IndexFlow.
//!
//! This crate provides:
//! - A rate-limited RPC client that fails over across endpoints
//! - A retry executor shared by RPC calls and storage writes
//! - Log parsers for transfers, staking, PoI and contribution events
//! - A SQLite event store with a per-chain cursor that never regresses
//! - Backfill and live listener drivers over the same block processor
//! - An evaluation service producing sealed usage outputs
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  indexflow-indexer (per chain, tokio task)    │
//! │                                               │
//! │  ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ EndpointPool │ ←  │ RPC URLs (env/toml) │  │
//! │  │ + RateLimiter│    └─────────────────────┘  │
//! │  └──────┬───────┘                             │
//! │         │ getLogs / getBlock                  │
//! │  ┌──────▼─────────┐                           │
//! │  │ BlockProcessor │ ← Listener / Backfill     │
//! │  └──────┬─────────┘                           │
//! │         │ upsert (chain, tx, log_index)       │
//! │  ┌──────▼──────┐                              │
//! │  │  Storage    │ ← SQLite, cursor = MAX(..)   │
//! │  └──────┬──────┘                              │
//! └─────────┼─────────────────────────────────────┘
//!           │
//! ┌─────────▼─────────────────────────────────────┐
//! │  EvaluationService                            │
//! │  metrics: cache → db → rpc scan fallback      │
//! │  evaluator + proof hash: indexflow-core       │
//! └───────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backfill;
pub mod config;
pub mod evaluation;
pub mod listener;
pub mod logging;
pub mod retry;
pub mod rpc;
pub mod shutdown;
pub mod storage;

pub use indexflow_core::{types::*, *};
