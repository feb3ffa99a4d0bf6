//! Effective-view projection.

use std::sync::Arc;

use super::board_sync_model::BoardView;
use super::pending_action_log::PendingAction;
use crate::boards::Board;

/// Fold `pending` over a copy of `confirmed`.
///
/// Returns `BoardView::NoBoard` when there is no confirmed base, regardless of
/// pending actions. The base is never mutated and every call allocates a new
/// `Arc`, so subscribers can detect changes with `Arc::ptr_eq`.
pub fn project(confirmed: Option<&Board>, pending: &[PendingAction]) -> BoardView {
    let Some(base) = confirmed else {
        return BoardView::NoBoard;
    };
    let board = pending
        .iter()
        .fold(base.clone(), |board, entry| entry.action.apply(board));
    BoardView::Board(Arc::new(board))
}
