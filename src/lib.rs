//! relaycast - anonymous relay/broadcast bot core.
//!
//! Every message a registered user sends is fanned out as copies to all other
//! registered users, with edits and deletions propagated across the copies.
//! The crate is split into the persistent store (directory, settings,
//! cooldowns, and the message mapping ledger), the admission controller, the
//! relay engine that performs the concurrent fan-out, and a thin chat
//! transport boundary.

pub mod admission;
pub mod config;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod store;
pub mod transport;
