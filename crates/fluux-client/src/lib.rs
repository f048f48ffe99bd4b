// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! Core runtime of the Fluux messaging SDK.
//!
//! Owns one long-lived XMPP stream (through `fluux-xmpp`), multiplexes
//! the protocol modules onto it, projects their events into an
//! observable store, and survives network loss, system sleep and
//! process restarts with stream management and archive catch-up.

pub use cache::MessageCache;
pub use client::{FluuxClient, FluuxClientBuilder};
pub use connection::{Backoff, ConnectionState, ConnectionStatus, SystemState};
pub use event::{ClientEvent, SyncDirection};
pub use storage::{InMemoryStorage, StorageAdapter};
pub use store::{ApplyOutcome, Store};

pub mod cache;
pub mod client;
pub mod connection;
pub mod domain;
mod effects;
pub mod event;
pub mod mam_service;
pub mod presence;
mod session;
pub mod storage;
pub mod store;

pub use fluux_xmpp;
