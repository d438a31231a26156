//! Chain access, log decoding and the live listener.
//!
//! - [`events`]: typed event definitions and log parsers
//! - [`provider`]: the [`ChainSource`] seam over the endpoint pool
//! - [`processor`]: decode and persist logic shared with backfill
//! - [`sync`]: the polling listener

pub mod events;
pub mod processor;
pub mod provider;
pub mod sync;

pub use events::{decode_log, DecodeError};
pub use processor::{BatchStats, BlockProcessor, TargetKind, TopicTarget};
pub use provider::{ChainClient, ChainSource, HttpProvider};
pub use sync::{Listener, PollOutcome};
