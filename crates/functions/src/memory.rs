//! In-process board backend with the cloud functions' transaction rules.
//!
//! Each mutating call validates the caller, applies the change and stamps
//! `lastActionSequences[caller]` as one step under the backend lock, or
//! rejects without touching the board. Listeners receive the committed
//! document after the lock is released.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokenboard_core::boards::{Board, BoardCall, BoardDocument, BoardId, RewardId, UserId};
use tokenboard_core::sync::{BoardGateway, RemoteSubscription, SnapshotSink};
use tokenboard_core::users::{UserProfile, UserRole};
use tokenboard_core::{Error, RemoteCallError, RemoteErrorKind, Result};

struct Listener {
    board_id: BoardId,
    sink: SnapshotSink,
    active: AtomicBool,
    /// Revision of the last delivered document. Held while the sink runs so
    /// a listener never sees revisions out of order.
    delivered: Mutex<u64>,
}

impl Listener {
    fn deliver(&self, revision: u64, document: BoardDocument) {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        if revision <= *delivered || !self.active.load(Ordering::SeqCst) {
            return;
        }
        *delivered = revision;
        (self.sink)(document);
    }
}

struct StoredBoard {
    board: Board,
    revision: u64,
}

#[derive(Default)]
struct BackendState {
    boards: HashMap<BoardId, StoredBoard>,
    users: HashMap<UserId, UserProfile>,
    listeners: HashMap<u64, Arc<Listener>>,
    next_listener_id: u64,
    injected_failures: VecDeque<RemoteCallError>,
    calls: Vec<(UserId, BoardCall)>,
}

impl BackendState {
    fn caller(&self, user_id: &UserId) -> std::result::Result<&UserProfile, RemoteCallError> {
        self.users.get(user_id).ok_or_else(|| {
            RemoteCallError::new(
                RemoteErrorKind::Unauthenticated,
                format!("unknown user {}", user_id),
            )
        })
    }

    fn board_for(
        &mut self,
        caller: &UserProfile,
        board_id: &BoardId,
    ) -> std::result::Result<&mut StoredBoard, RemoteCallError> {
        if !caller.has_board(board_id) {
            return Err(RemoteCallError::permission_denied(format!(
                "user {} has no access to board {}",
                caller.id, board_id
            )));
        }
        self.boards
            .get_mut(board_id)
            .ok_or_else(|| RemoteCallError::not_found(format!("board {} not found", board_id)))
    }

    fn listeners_for(&self, board_id: &BoardId) -> Vec<Arc<Listener>> {
        let mut ids = self
            .listeners
            .iter()
            .filter(|(_, listener)| &listener.board_id == board_id)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids.iter()
            .filter_map(|id| self.listeners.get(id).cloned())
            .collect()
    }

    /// Run `call` for `user_id` as one transaction. Returns the committed
    /// document and its revision.
    fn execute(
        &mut self,
        user_id: &UserId,
        call: &BoardCall,
    ) -> std::result::Result<(BoardDocument, u64), RemoteCallError> {
        self.calls.push((user_id.clone(), call.clone()));
        if let Some(err) = self.injected_failures.pop_front() {
            return Err(err);
        }

        let caller = self.caller(user_id)?.clone();
        let stored = self.board_for(&caller, call.board_id())?;
        let mut board = stored.board.clone();

        match call {
            BoardCall::AddToken(_) => {
                require_parent(&caller, "add tokens")?;
                board.total_token = board.total_token.saturating_add(1);
                board.last_token_update_time =
                    Some(next_token_time(board.last_token_update_time));
            }
            BoardCall::ToggleReward(req) => {
                let total = board.total_token;
                let reward = board.rewards.get_mut(&req.reward_id).ok_or_else(|| {
                    RemoteCallError::not_found(format!("reward {} not found", req.reward_id))
                })?;
                if reward.pending {
                    reward.pending = false;
                    board.total_token = total.saturating_add(reward.cost);
                } else if total >= reward.cost {
                    reward.pending = true;
                    board.total_token = total - reward.cost;
                } else {
                    return Err(RemoteCallError::failed_precondition(format!(
                        "not enough tokens for reward {} ({} < {})",
                        req.reward_id, total, reward.cost
                    )));
                }
            }
            BoardCall::ConfirmReward(req) => {
                require_parent(&caller, "confirm rewards")?;
                let reward = board.rewards.get_mut(&req.reward_id).ok_or_else(|| {
                    RemoteCallError::not_found(format!("reward {} not found", req.reward_id))
                })?;
                reward.pending = false;
            }
        }

        board
            .last_action_sequences
            .insert(caller.id.clone(), call.sequence());
        stored.board = board;
        stored.revision += 1;
        Ok((BoardDocument::from(&stored.board), stored.revision))
    }
}

fn require_parent(caller: &UserProfile, what: &str) -> std::result::Result<(), RemoteCallError> {
    if caller.role == UserRole::Parent {
        Ok(())
    } else {
        Err(RemoteCallError::permission_denied(format!(
            "only parents can {}",
            what
        )))
    }
}

/// Token timestamps strictly increase even when the clock does not.
fn next_token_time(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(previous) if now <= previous => previous + ChronoDuration::milliseconds(1),
        _ => now,
    }
}

/// Shared in-memory board store.
///
/// Cloning yields another handle to the same store. Use
/// [`gateway_for`](Self::gateway_for) to act as a given user.
#[derive(Clone, Default)]
pub struct InMemoryBoardBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBoardBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, board_id: &BoardId, document: BoardDocument, revision: u64) {
        let listeners = self.lock().listeners_for(board_id);
        for listener in listeners {
            listener.deliver(revision, document.clone());
        }
    }

    /// Create or replace a board and notify its listeners.
    pub fn insert_board(&self, board: Board) {
        let board_id = board.id.clone();
        let (document, revision) = {
            let mut state = self.lock();
            let revision = state
                .boards
                .get(&board_id)
                .map(|stored| stored.revision + 1)
                .unwrap_or(1);
            let document = BoardDocument::from(&board);
            state
                .boards
                .insert(board_id.clone(), StoredBoard { board, revision });
            (document, revision)
        };
        self.publish(&board_id, document, revision);
    }

    pub fn add_user(&self, user_id: impl Into<UserId>, role: UserRole, boards: Vec<BoardId>) {
        let profile = UserProfile::new(user_id, role, boards);
        self.lock().users.insert(profile.id.clone(), profile);
    }

    /// Profile of a registered user, as the sign-in flow would resolve it.
    pub fn user(&self, user_id: &UserId) -> Option<UserProfile> {
        self.lock().users.get(user_id).cloned()
    }

    /// Delete a reward, as another client editing the board would.
    pub fn remove_reward(&self, board_id: &BoardId, reward_id: &RewardId) -> bool {
        let published = {
            let mut state = self.lock();
            let Some(stored) = state.boards.get_mut(board_id) else {
                return false;
            };
            if stored.board.rewards.remove(reward_id).is_none() {
                return false;
            }
            stored.revision += 1;
            (BoardDocument::from(&stored.board), stored.revision)
        };
        self.publish(board_id, published.0, published.1);
        true
    }

    pub fn board(&self, board_id: &BoardId) -> Option<Board> {
        self.lock()
            .boards
            .get(board_id)
            .map(|stored| stored.board.clone())
    }

    /// Reject the next mutating call with `error`, whoever makes it.
    pub fn fail_next_call(&self, error: RemoteCallError) {
        self.lock().injected_failures.push_back(error);
    }

    /// Every call received so far, rejected ones included.
    pub fn calls(&self) -> Vec<(UserId, BoardCall)> {
        self.lock().calls.clone()
    }

    pub fn listener_count(&self, board_id: &BoardId) -> usize {
        self.lock().listeners_for(board_id).len()
    }

    pub fn gateway_for(&self, user_id: impl Into<UserId>) -> InMemoryBoardGateway {
        InMemoryBoardGateway {
            backend: self.clone(),
            user_id: user_id.into(),
        }
    }
}

struct InMemorySubscription {
    backend: InMemoryBoardBackend,
    id: u64,
}

impl RemoteSubscription for InMemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        if let Some(listener) = self.backend.lock().listeners.remove(&self.id) {
            listener.active.store(false, Ordering::SeqCst);
        }
    }
}

/// `BoardGateway` acting as one user against an [`InMemoryBoardBackend`].
#[derive(Clone)]
pub struct InMemoryBoardGateway {
    backend: InMemoryBoardBackend,
    user_id: UserId,
}

impl InMemoryBoardGateway {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

#[async_trait]
impl BoardGateway for InMemoryBoardGateway {
    fn subscribe(
        &self,
        board_id: &BoardId,
        sink: SnapshotSink,
    ) -> Result<Box<dyn RemoteSubscription>> {
        let (id, listener, current) = {
            let mut state = self.backend.lock();
            let current = state
                .boards
                .get(board_id)
                .map(|stored| (BoardDocument::from(&stored.board), stored.revision));

            let id = state.next_listener_id;
            state.next_listener_id += 1;
            let listener = Arc::new(Listener {
                board_id: board_id.clone(),
                sink,
                active: AtomicBool::new(true),
                delivered: Mutex::new(0),
            });
            state.listeners.insert(id, Arc::clone(&listener));
            (id, listener, current)
        };

        debug!(
            "[Functions] {} listening to in-memory board {}",
            self.user_id, board_id
        );
        if let Some((document, revision)) = current {
            listener.deliver(revision, document);
        }

        Ok(Box::new(InMemorySubscription {
            backend: self.backend.clone(),
            id,
        }))
    }

    async fn call(&self, call: BoardCall) -> Result<()> {
        let committed = self.backend.lock().execute(&self.user_id, &call);
        match committed {
            Ok((document, revision)) => {
                self.backend.publish(call.board_id(), document, revision);
                Ok(())
            }
            Err(err) => {
                debug!(
                    "[Functions] {} rejected for {}: {}",
                    call.function_name(),
                    self.user_id,
                    err
                );
                Err(Error::Remote(err))
            }
        }
    }
}
