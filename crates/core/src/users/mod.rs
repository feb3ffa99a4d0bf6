//! Signed-in user context consumed by the sync engine.

use serde::{Deserialize, Serialize};

use crate::boards::{BoardId, UserId};

/// Role of a user on their boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Parent,
    Child,
}

/// Resolved user identity and the boards it can access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub role: UserRole,
    pub boards: Vec<BoardId>,
}

impl UserProfile {
    pub fn new(id: impl Into<UserId>, role: UserRole, boards: Vec<BoardId>) -> Self {
        Self {
            id: id.into(),
            role,
            boards,
        }
    }

    pub fn is_parent(&self) -> bool {
        self.role == UserRole::Parent
    }

    pub fn has_board(&self, board_id: &BoardId) -> bool {
        self.boards.contains(board_id)
    }
}
