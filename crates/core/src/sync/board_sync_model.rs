//! Sync engine state and view models.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::boards::{Board, BoardId};

/// Lifecycle phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    NoUser,
    /// User resolved but has no boards.
    NoBoard,
    /// Subscribed, waiting for the first snapshot.
    LoadingBoard,
    BoardReady,
}

/// Effective board view delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardView {
    /// No board loaded or selected.
    NoBoard,
    Board(Arc<Board>),
}

impl BoardView {
    pub fn board(&self) -> Option<&Arc<Board>> {
        match self {
            BoardView::NoBoard => None,
            BoardView::Board(board) => Some(board),
        }
    }

    pub fn is_no_board(&self) -> bool {
        matches!(self, BoardView::NoBoard)
    }
}

/// Diagnostic snapshot of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub phase: SyncPhase,
    pub board_id: Option<BoardId>,
    pub pending_actions: usize,
    pub next_sequence: u64,
    /// Last sequence the server reported for the current user.
    pub last_confirmed_sequence: Option<u64>,
}
