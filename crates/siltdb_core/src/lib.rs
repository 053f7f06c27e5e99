//! # siltdb core
//!
//! A versioned, schema-validated, CRDT-backed KV storage engine with
//! migrate-on-read semantics.
//!
//! This crate provides:
//! - A compact key-value log: append-and-reclaim storage where each
//!   write supersedes the previous entry for its key, keeping storage
//!   proportional to current data rather than operation history
//! - An ordered schema version registry with first-match-wins union
//!   validation
//! - A migrate-on-read engine driven by one caller-supplied migration
//!   function per store
//! - Table- and KV-shaped accessors with batches and per-transaction
//!   change observers
//! - Deterministic conflict resolution for concurrent writes from
//!   partitioned replicas
//!
//! Reads always return a tagged [`ReadResult`]; writes never validate.
//! Replication itself — sequences, transactions, merge — lives in
//! [`siltdb_crdt`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod conflict;
mod error;
mod log;
mod migrate;
mod observer;
mod schema;
mod shape;
mod store;
mod types;
mod value;

pub use conflict::ResolutionPolicy;
pub use error::{StoreError, StoreResult};
pub use log::LogStats;
pub use migrate::Migrator;
pub use observer::{ChangeOrigin, ChangeSet, Subscription};
pub use schema::{Issue, SchemaRegistry, UnionOutcome, Validate, VersionIssues};
pub use shape::{FieldKind, Shape};
pub use store::{
    KvBatch, KvStore, KvStoreBuilder, ReadResult, TableBatch, TableStore, TableStoreBuilder,
};
pub use types::SchemaVersion;
pub use value::Value;
