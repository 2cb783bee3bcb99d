//! Query engine
//!
//! Public entry point: configuration, the serial worker and the façade a
//! document store embeds.
//!
//! # Concurrency
//!
//! All index mutation and query execution happen on one worker thread.
//! Callers get a `Pending` back and either `.await` it or `.wait()` on it.

mod config;
mod facade;
mod worker;

pub use config::EngineConfig;
pub use facade::{FindOptions, QueryEngine};
pub use worker::{Pending, WORKER_THREAD_NAME};
