//! Board sync engine: optimistic actions, snapshot reconciliation and
//! subscriber notification.
//!
//! The engine keeps the last server-confirmed board plus a log of local
//! actions the server has not acknowledged yet. Subscribers always see the
//! confirmed board with the pending actions folded in. Acknowledgment is
//! detected through `lastActionSequences[user]` in later snapshots; a failed
//! remote call removes exactly its own action.
//!
//! Remote calls run on Tokio tasks; actions issued outside a Tokio runtime are
//! skipped. The state lock is never held while calling the gateway or a
//! subscriber handler.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use super::board_gateway::{BoardGateway, RemoteSubscription, SnapshotSink};
use super::board_sync_model::{BoardView, SyncEngineStatus, SyncPhase};
use super::optimistic_projector::project;
use super::pending_action_log::{PendingAction, PendingActionLog};
use super::sequence_allocator::SequenceAllocator;
use crate::boards::{Board, BoardAction, BoardDocument, BoardId, RewardId};
use crate::errors::{Error, Result};
use crate::events::{ObserverList, Subscription};
use crate::settings::BoardSelectionStore;
use crate::users::UserProfile;

struct EngineState {
    phase: SyncPhase,
    user: Option<UserProfile>,
    board_id: Option<BoardId>,
    confirmed: Option<Board>,
    pending: PendingActionLog,
    sequences: SequenceAllocator,
    last_token_update_time: Option<DateTime<Utc>>,
    subscription: Option<Box<dyn RemoteSubscription>>,
    /// Bumped whenever the board subscription is torn down. Snapshots and
    /// rollbacks carrying an older generation are ignored.
    generation: u64,
    disposed: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            phase: SyncPhase::NoUser,
            user: None,
            board_id: None,
            confirmed: None,
            pending: PendingActionLog::new(),
            sequences: SequenceAllocator::new(),
            last_token_update_time: None,
            subscription: None,
            generation: 0,
            disposed: false,
        }
    }

    fn project(&self) -> BoardView {
        project(self.confirmed.as_ref(), self.pending.as_slice())
    }

    /// Forget everything tied to the current board and return the old
    /// subscription for the caller to close outside the lock.
    fn clear_board(&mut self) -> Option<Box<dyn RemoteSubscription>> {
        self.generation += 1;
        self.board_id = None;
        self.confirmed = None;
        self.pending.clear();
        self.last_token_update_time = None;
        self.subscription.take()
    }
}

struct EngineInner {
    gateway: Arc<dyn BoardGateway>,
    selection_store: Arc<dyn BoardSelectionStore>,
    state: Mutex<EngineState>,
    board_observers: ObserverList<BoardView>,
    token_observers: ObserverList<()>,
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve_initial_board(&self, user: &UserProfile) -> Option<BoardId> {
        let preferred = match self.selection_store.last_selected_board() {
            Ok(value) => value,
            Err(err) => {
                log::warn!("[BoardSync] Failed to read last selected board: {}", err);
                None
            }
        };
        preferred
            .filter(|board_id| user.has_board(board_id))
            .or_else(|| user.boards.first().cloned())
    }

    fn switch_board(self: &Arc<Self>, board_id: BoardId) {
        let (previous, generation) = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            let previous = state.clear_board();
            state.board_id = Some(board_id.clone());
            state.phase = SyncPhase::LoadingBoard;
            (previous, state.generation)
        };

        // The old subscription must be closed before the new one can deliver.
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        self.board_observers.notify(&BoardView::NoBoard);

        info!("[BoardSync] Subscribing to board {}", board_id);
        let weak = Arc::downgrade(self);
        let sink: SnapshotSink = Arc::new(move |document: BoardDocument| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_snapshot(generation, document);
            }
        });

        match self.gateway.subscribe(&board_id, sink) {
            Ok(subscription) => {
                let mut state = self.lock();
                if state.generation == generation && !state.disposed {
                    state.subscription = Some(subscription);
                } else {
                    drop(state);
                    debug!(
                        "[BoardSync] Board {} was replaced while subscribing; closing subscription",
                        board_id
                    );
                    subscription.unsubscribe();
                }
            }
            Err(err) => {
                log::warn!(
                    "[BoardSync] Failed to subscribe to board {}: {}",
                    board_id,
                    err
                );
            }
        }
    }

    fn apply_snapshot(&self, generation: u64, document: BoardDocument) {
        let board = match Board::try_from(document) {
            Ok(board) => board,
            Err(err) => {
                log::warn!("[BoardSync] Ignoring snapshot: {}", err);
                return;
            }
        };

        let (view, celebrate) = {
            let mut state = self.lock();
            if state.disposed || state.generation != generation {
                debug!(
                    "[BoardSync] Ignoring stale snapshot for board {} (generation {} != {})",
                    board.id, generation, state.generation
                );
                return;
            }
            if state.board_id.as_ref() != Some(&board.id) {
                log::warn!(
                    "[BoardSync] Ignoring snapshot for board {} while {:?} is selected",
                    board.id,
                    state.board_id
                );
                return;
            }

            let previous = state.last_token_update_time;
            let celebrate = matches!(
                (previous, board.last_token_update_time),
                (Some(before), Some(after)) if before != after
            );
            state.last_token_update_time = board.last_token_update_time;

            let last_processed = state
                .user
                .as_ref()
                .and_then(|user| board.last_sequence_for(&user.id));
            if let Some(last_processed) = last_processed {
                let pruned = state.pending.prune_up_to(last_processed);
                state.sequences.resync(last_processed);
                if pruned > 0 {
                    debug!(
                        "[BoardSync] Server acknowledged up to seq={} ({} pending pruned, {} remaining)",
                        last_processed,
                        pruned,
                        state.pending.len()
                    );
                }
            }

            state.confirmed = Some(board);
            state.phase = SyncPhase::BoardReady;
            (state.project(), celebrate)
        };

        self.board_observers.notify(&view);
        if celebrate {
            self.token_observers.notify(&());
        }
    }

    fn roll_back(&self, generation: u64, sequence: u64) {
        let view = {
            let mut state = self.lock();
            if state.generation != generation || !state.pending.remove(sequence) {
                return;
            }
            state.project()
        };
        self.board_observers.notify(&view);
    }
}

/// Owns the confirmed board, the pending action log and the sequence
/// allocator for one signed-in session.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct BoardSyncEngine {
    inner: Arc<EngineInner>,
}

impl BoardSyncEngine {
    pub fn new(
        gateway: Arc<dyn BoardGateway>,
        selection_store: Arc<dyn BoardSelectionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                gateway,
                selection_store,
                state: Mutex::new(EngineState::new()),
                board_observers: ObserverList::new(),
                token_observers: ObserverList::new(),
            }),
        }
    }

    /// Subscribe to effective-view changes. The handler is called on every
    /// change, not with the current value; use `current_view` for that.
    pub fn on_current_board_updated<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BoardView) + Send + Sync + 'static,
    {
        self.inner.board_observers.subscribe(handler)
    }

    /// Subscribe to the "play celebration" signal fired when a token is added.
    pub fn on_new_token<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.token_observers.subscribe(move |_: &()| handler())
    }

    /// Resolve the signed-in user, or `None` when signed out.
    ///
    /// A user with boards gets the last selected board when it is still one
    /// of theirs, else their first board. Re-resolving the same user keeps
    /// the current board while it remains accessible.
    pub fn set_user(&self, user: Option<UserProfile>) {
        let target = user
            .as_ref()
            .and_then(|user| self.inner.resolve_initial_board(user));

        let previous = {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }

            let same_user = state.user.as_ref().map(|u| &u.id) == user.as_ref().map(|u| &u.id);
            let keep_current = same_user
                && match (&user, &state.board_id) {
                    (Some(user), Some(board_id)) => user.has_board(board_id),
                    _ => false,
                };
            state.user = user;

            if keep_current {
                return;
            }

            match target {
                Some(board_id) => {
                    drop(state);
                    self.inner.switch_board(board_id);
                    return;
                }
                None => {
                    let previous = state.clear_board();
                    state.phase = if state.user.is_some() {
                        SyncPhase::NoBoard
                    } else {
                        SyncPhase::NoUser
                    };
                    previous
                }
            }
        };

        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        info!("[BoardSync] No board available; cleared board state");
        self.inner.board_observers.notify(&BoardView::NoBoard);
    }

    /// Switch to another of the user's boards and remember the choice.
    pub fn select_board(&self, board_id: &BoardId) -> Result<()> {
        {
            let state = self.inner.lock();
            if state.disposed {
                return Ok(());
            }
            let user = state
                .user
                .as_ref()
                .ok_or_else(|| Error::invalid_input("no signed-in user"))?;
            if !user.has_board(board_id) {
                return Err(Error::invalid_input(format!(
                    "board {} is not available to user {}",
                    board_id, user.id
                )));
            }
            if state.board_id.as_ref() == Some(board_id) {
                return Ok(());
            }
        }

        if let Err(err) = self.inner.selection_store.set_last_selected_board(board_id) {
            log::warn!(
                "[BoardSync] Failed to persist selected board {}: {}",
                board_id,
                err
            );
        }
        self.inner.switch_board(board_id.clone());
        Ok(())
    }

    /// Apply `action` locally, notify subscribers, then confirm it remotely in
    /// the background.
    ///
    /// Returns `None` without any effect when no user is signed in, no board
    /// has been confirmed by a snapshot yet, or no Tokio runtime is running.
    /// The returned handle resolves once the remote call, and the rollback on
    /// failure, have completed.
    pub fn perform_optimistic_action(
        &self,
        action: BoardAction,
        trigger_celebration: bool,
    ) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!(
                "[BoardSync] Skipping {}: no async runtime to run the remote call",
                action.name()
            );
            return None;
        };

        let (call, generation, view) = {
            let mut state = self.inner.lock();
            if state.disposed || state.user.is_none() {
                debug!("[BoardSync] Skipping {}: no user", action.name());
                return None;
            }
            let Some(board_id) = state.board_id.clone() else {
                debug!("[BoardSync] Skipping {}: no board selected", action.name());
                return None;
            };
            // Sequences are only valid once resynced from a snapshot.
            if state.confirmed.is_none() {
                debug!(
                    "[BoardSync] Skipping {}: board {} is still loading",
                    action.name(),
                    board_id
                );
                return None;
            }

            let sequence = state.sequences.next();
            let call = action.remote_call(&board_id, sequence);
            state.pending.append(PendingAction::new(sequence, action));
            (call, state.generation, state.project())
        };

        self.inner.board_observers.notify(&view);
        if trigger_celebration {
            self.inner.token_observers.notify(&());
        }

        let inner = Arc::clone(&self.inner);
        Some(runtime.spawn(async move {
            let sequence = call.sequence();
            let function_name = call.function_name();
            debug!(
                "[BoardSync] Calling {} for board {} seq={}",
                function_name,
                call.board_id(),
                sequence
            );
            if let Err(err) = inner.gateway.call(call).await {
                log::warn!(
                    "[BoardSync] {} seq={} failed ({}); rolling back: {}",
                    function_name,
                    sequence,
                    err.code(),
                    err
                );
                inner.roll_back(generation, sequence);
            }
        }))
    }

    pub fn add_new_token(&self) -> Option<JoinHandle<()>> {
        self.perform_optimistic_action(BoardAction::AddToken, true)
    }

    pub fn toggle_reward_selection(&self, reward_id: &RewardId) -> Option<JoinHandle<()>> {
        self.perform_optimistic_action(BoardAction::ToggleReward(reward_id.clone()), false)
    }

    pub fn validate_reward(&self, reward_id: &RewardId) -> Option<JoinHandle<()>> {
        self.perform_optimistic_action(BoardAction::ValidateReward(reward_id.clone()), false)
    }

    pub fn current_view(&self) -> BoardView {
        self.inner.lock().project()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.lock().phase
    }

    pub fn selected_board(&self) -> Option<BoardId> {
        self.inner.lock().board_id.clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.lock().user.clone()
    }

    pub fn status(&self) -> SyncEngineStatus {
        let state = self.inner.lock();
        let last_confirmed_sequence = match (&state.confirmed, &state.user) {
            (Some(board), Some(user)) => board.last_sequence_for(&user.id),
            _ => None,
        };
        SyncEngineStatus {
            phase: state.phase,
            board_id: state.board_id.clone(),
            pending_actions: state.pending.len(),
            next_sequence: state.sequences.peek(),
            last_confirmed_sequence,
        }
    }

    /// Close the board subscription, drop all state and all subscribers.
    /// Every later operation is a no-op.
    pub fn dispose(&self) {
        let previous = {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.user = None;
            state.phase = SyncPhase::NoUser;
            state.clear_board()
        };
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        self.inner.board_observers.clear();
        self.inner.token_observers.clear();
        info!("[BoardSync] Engine disposed");
    }
}
