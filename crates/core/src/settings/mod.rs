//! Local preferences consumed by the sync engine.

use std::sync::Mutex;

use crate::boards::BoardId;
use crate::errors::Result;

/// Setting key under which the last selected board is persisted.
pub const LAST_SELECTED_BOARD_KEY: &str = "last_selected_board";

/// Persistence for the board a multi-board user last switched to.
pub trait BoardSelectionStore: Send + Sync {
    fn last_selected_board(&self) -> Result<Option<BoardId>>;
    fn set_last_selected_board(&self, board_id: &BoardId) -> Result<()>;
}

/// Process-local selection store; the value is lost when dropped.
#[derive(Debug, Default)]
pub struct InMemoryBoardSelectionStore {
    value: Mutex<Option<BoardId>>,
}

impl InMemoryBoardSelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(board_id: impl Into<BoardId>) -> Self {
        Self {
            value: Mutex::new(Some(board_id.into())),
        }
    }
}

impl BoardSelectionStore for InMemoryBoardSelectionStore {
    fn last_selected_board(&self) -> Result<Option<BoardId>> {
        Ok(self.value.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set_last_selected_board(&self, board_id: &BoardId) -> Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(board_id.clone());
        Ok(())
    }
}
