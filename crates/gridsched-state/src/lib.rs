//! gridsched-state — cluster state store for the gridsched scheduler.
//!
//! Backed by [redb](https://docs.rs/redb), with an on-disk backend for
//! durable deployments and an in-memory backend for tests and single-shot
//! tooling. Nodes, jobs and allocations are JSON-serialized into redb's
//! `&[u8]` value columns.
//!
//! # Consistency
//!
//! `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and
//! is shared by every scheduling worker. Workers read through a
//! [`StateSnapshot`], which pins one redb read transaction so that all
//! queries made during an evaluation observe the same point in time.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{StateSnapshot, StateStore};
