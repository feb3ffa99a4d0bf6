//! Board domain models, wire documents and local actions.

mod board_action;
mod boards_model;

pub use board_action::*;
pub use boards_model::*;
