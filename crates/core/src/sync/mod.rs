//! Optimistic board synchronization.

mod board_gateway;
mod board_sync_engine;
mod board_sync_model;
mod optimistic_projector;
mod pending_action_log;
mod sequence_allocator;

pub use board_gateway::*;
pub use board_sync_engine::*;
pub use board_sync_model::*;
pub use optimistic_projector::*;
pub use pending_action_log::*;
pub use sequence_allocator::*;

#[cfg(test)]
mod tests;
