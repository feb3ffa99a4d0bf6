//! Core domain and optimistic synchronization engine for token boards.
//!
//! A board is a per-child document (token balance plus reward list) owned by
//! the server. This crate keeps a locally-predicted view of the selected board
//! in step with server snapshots: local actions are applied immediately,
//! tagged with a per-session sequence number, and pruned once the server
//! reports that sequence as processed.

pub mod boards;
pub mod errors;
pub mod events;
pub mod settings;
pub mod sync;
pub mod users;

pub use errors::{Error, RemoteCallError, RemoteErrorKind, Result};
