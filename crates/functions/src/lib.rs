//! Remote board collaborators for the token board sync engine.
//!
//! - [`HttpBoardGateway`]: calls the board cloud functions over HTTP and
//!   follows a board document with a polling listener.
//! - [`InMemoryBoardBackend`]: the same transactional semantics held in
//!   process, for tests and local development.

mod client;
mod config;
mod error;
mod gateway;
mod listener;
mod memory;
mod types;

pub use client::BoardFunctionsClient;
pub use config::FunctionsConfig;
pub use error::{ApiRetryClass, FunctionsError, Result};
pub use gateway::HttpBoardGateway;
pub use listener::{spawn_board_listener, BoardListener};
pub use memory::{InMemoryBoardBackend, InMemoryBoardGateway};
pub use types::{CallableErrorBody, CallableRequest, CallableResponse};
