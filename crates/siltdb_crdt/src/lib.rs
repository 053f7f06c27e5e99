//! # siltdb CRDT primitives
//!
//! The replicated primitives siltdb's storage layer is built on:
//!
//! - Ordered sequences with positional tombstones
//! - Lamport-stamped position identities with a deterministic total order
//! - A document grouping named sequences behind a single transaction
//!   boundary
//! - State-based merge via `encode_update` / `apply_update`
//!
//! All replicas that exchange updates converge to the same sequence
//! contents and the same structural order, regardless of delivery order.
//!
//! Distributed garbage collection of tombstone shells is out of scope:
//! a deleted item drops its payload immediately but keeps its identity
//! so late-arriving deletes from other replicas resolve correctly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod doc;
mod error;
mod id;
mod seq;
mod update;

pub use clock::LamportClock;
pub use doc::{Doc, DocSubscription, TxnOrigin, TxnRef, TxnSummary};
pub use error::{CrdtError, CrdtResult};
pub use id::{ItemId, ReplicaId};
pub use seq::{Item, Sequence};
