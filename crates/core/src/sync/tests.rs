use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use super::*;
use crate::boards::{BoardCall, BoardDocument, BoardId, RewardDocument, RewardId};
use crate::errors::{Error, RemoteCallError, Result};
use crate::settings::{BoardSelectionStore, InMemoryBoardSelectionStore};
use crate::users::{UserProfile, UserRole};

const USER: &str = "child-1";

type SinkEntry = (u64, BoardId, SnapshotSink);

/// Gateway whose call outcomes are decided by the test.
#[derive(Default)]
struct ScriptedGateway {
    documents: Mutex<HashMap<BoardId, BoardDocument>>,
    active_sinks: Arc<Mutex<Vec<SinkEntry>>>,
    all_sinks: Mutex<Vec<SinkEntry>>,
    next_subscription: AtomicU64,
    replies: Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>,
    calls: Mutex<Vec<BoardCall>>,
    journal: Arc<Mutex<Vec<String>>>,
}

struct ScriptedSubscription {
    id: u64,
    board_id: BoardId,
    sinks: Arc<Mutex<Vec<SinkEntry>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RemoteSubscription for ScriptedSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.sinks
            .lock()
            .unwrap()
            .retain(|(id, _, _)| *id != self.id);
        self.journal
            .lock()
            .unwrap()
            .push(format!("unsubscribe:{}", self.board_id));
    }
}

impl ScriptedGateway {
    fn with_document(self, document: BoardDocument) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(BoardId::from(document.id.as_str()), document);
        self
    }

    /// Deliver `document` to live subscribers of its board.
    fn push(&self, document: BoardDocument) {
        let board_id = BoardId::from(document.id.as_str());
        let sinks = self
            .active_sinks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, id, _)| *id == board_id)
            .map(|(_, _, sink)| Arc::clone(sink))
            .collect::<Vec<_>>();
        for sink in sinks {
            sink(document.clone());
        }
    }

    /// Deliver `document` through every sink ever registered for its board,
    /// including unsubscribed ones.
    fn push_to_stale_sinks(&self, document: BoardDocument) {
        let board_id = BoardId::from(document.id.as_str());
        let sinks = self
            .all_sinks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, id, _)| *id == board_id)
            .map(|(_, _, sink)| Arc::clone(sink))
            .collect::<Vec<_>>();
        for sink in sinks {
            sink(document.clone());
        }
    }

    /// Resolve the in-flight call tagged with `sequence`.
    async fn reply(&self, sequence: u64, result: Result<()>) {
        for _ in 0..100 {
            let sender = self.replies.lock().unwrap().remove(&sequence);
            if let Some(sender) = sender {
                let _ = sender.send(result);
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no in-flight call with seq={sequence}");
    }

    fn call_sequences(&self) -> Vec<u64> {
        let mut sequences = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.sequence())
            .collect::<Vec<_>>();
        sequences.sort_unstable();
        sequences
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn active_subscriptions(&self) -> usize {
        self.active_sinks.lock().unwrap().len()
    }
}

#[async_trait]
impl BoardGateway for ScriptedGateway {
    fn subscribe(
        &self,
        board_id: &BoardId,
        sink: SnapshotSink,
    ) -> Result<Box<dyn RemoteSubscription>> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.journal
            .lock()
            .unwrap()
            .push(format!("subscribe:{}", board_id));
        self.active_sinks
            .lock()
            .unwrap()
            .push((id, board_id.clone(), Arc::clone(&sink)));
        self.all_sinks
            .lock()
            .unwrap()
            .push((id, board_id.clone(), Arc::clone(&sink)));

        let initial = self.documents.lock().unwrap().get(board_id).cloned();
        if let Some(document) = initial {
            sink(document);
        }

        Ok(Box::new(ScriptedSubscription {
            id,
            board_id: board_id.clone(),
            sinks: Arc::clone(&self.active_sinks),
            journal: Arc::clone(&self.journal),
        }))
    }

    async fn call(&self, call: BoardCall) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().insert(call.sequence(), tx);
        self.calls.lock().unwrap().push(call);
        rx.await
            .unwrap_or_else(|_| Err(RemoteCallError::unavailable("dropped").into()))
    }
}

fn document(board_id: &str, total: i64) -> BoardDocument {
    BoardDocument {
        id: board_id.to_string(),
        owner: Some("parent-1".to_string()),
        total_token: total,
        rewards: HashMap::new(),
        last_token_update_time: None,
        last_action_sequences: HashMap::new(),
    }
}

fn with_reward(mut doc: BoardDocument, reward_id: &str, cost: i64, pending: bool) -> BoardDocument {
    doc.rewards.insert(
        reward_id.to_string(),
        RewardDocument {
            name: format!("Reward {reward_id}"),
            cost,
            icon: "⭐".to_string(),
            pending,
        },
    );
    doc
}

fn with_sequence(mut doc: BoardDocument, sequence: i64) -> BoardDocument {
    doc.last_action_sequences.insert(USER.to_string(), sequence);
    doc
}

fn with_token_time(mut doc: BoardDocument, secs: i64) -> BoardDocument {
    doc.last_token_update_time = Utc.timestamp_opt(secs, 0).single();
    doc
}

fn child(boards: &[&str]) -> UserProfile {
    UserProfile::new(
        USER,
        UserRole::Child,
        boards.iter().map(|b| BoardId::from(*b)).collect(),
    )
}

/// Let spawned remote calls reach the gateway.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

struct Harness {
    engine: BoardSyncEngine,
    gateway: Arc<ScriptedGateway>,
    store: Arc<InMemoryBoardSelectionStore>,
    views: Arc<Mutex<Vec<BoardView>>>,
    celebrations: Arc<AtomicUsize>,
}

impl Harness {
    fn new(gateway: ScriptedGateway) -> Self {
        Self::with_store(gateway, InMemoryBoardSelectionStore::new())
    }

    fn with_store(gateway: ScriptedGateway, store: InMemoryBoardSelectionStore) -> Self {
        let gateway = Arc::new(gateway);
        let store = Arc::new(store);
        let engine = BoardSyncEngine::new(gateway.clone(), store.clone());

        let views = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&views);
        let _ = engine.on_current_board_updated(move |view| {
            recorded.lock().unwrap().push(view.clone());
        });

        let celebrations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&celebrations);
        let _ = engine.on_new_token(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        Self {
            engine,
            gateway,
            store,
            views,
            celebrations,
        }
    }

    fn last_view(&self) -> BoardView {
        self.views.lock().unwrap().last().cloned().expect("a view")
    }

    fn view_count(&self) -> usize {
        self.views.lock().unwrap().len()
    }

    fn total(&self) -> u64 {
        self.engine
            .current_view()
            .board()
            .map(|b| b.total_token)
            .expect("board view")
    }

    fn pending_flag(&self, reward_id: &str) -> bool {
        self.engine
            .current_view()
            .board()
            .and_then(|b| b.reward(&RewardId::from(reward_id)).map(|r| r.pending))
            .expect("reward")
    }

    fn celebrations(&self) -> usize {
        self.celebrations.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn user_without_boards_receives_no_board_sentinel() {
    let h = Harness::new(ScriptedGateway::default());

    h.engine.set_user(Some(child(&[])));

    assert_eq!(h.engine.phase(), SyncPhase::NoBoard);
    assert_eq!(h.last_view(), BoardView::NoBoard);
    assert!(h.engine.add_new_token().is_none());
    assert_eq!(h.gateway.active_subscriptions(), 0);
}

#[tokio::test]
async fn first_snapshot_makes_board_ready() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 8)));

    h.engine.set_user(Some(child(&["b1"])));

    assert_eq!(h.engine.phase(), SyncPhase::BoardReady);
    assert_eq!(h.engine.selected_board(), Some(BoardId::from("b1")));
    assert_eq!(h.total(), 8);
    // NoBoard while loading, then the board.
    assert_eq!(h.view_count(), 2);
    assert!(h.views.lock().unwrap()[0].is_no_board());
}

#[tokio::test]
async fn optimistic_action_is_visible_before_the_round_trip() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 2)));
    h.engine.set_user(Some(child(&["b1"])));

    let handle = h.engine.add_new_token().expect("action issued");

    assert_eq!(h.total(), 3);
    assert_eq!(h.celebrations(), 1);
    assert_eq!(h.engine.status().pending_actions, 1);

    h.gateway.reply(1, Ok(())).await;
    handle.await.expect("task");
    // Still pending until a snapshot acknowledges seq 1.
    assert_eq!(h.engine.status().pending_actions, 1);
    assert_eq!(h.total(), 3);
}

#[tokio::test]
async fn snapshot_prunes_acknowledged_sequences() {
    let h = Harness::new(
        ScriptedGateway::default().with_document(with_sequence(document("b1", 10), 2)),
    );
    h.engine.set_user(Some(child(&["b1"])));

    let handles = (0..3)
        .map(|_| h.engine.add_new_token().expect("action issued"))
        .collect::<Vec<_>>();
    settle().await;
    assert_eq!(h.gateway.call_sequences(), vec![3, 4, 5]);
    assert_eq!(h.total(), 13);

    h.gateway.push(with_sequence(document("b1", 12), 4));

    let status = h.engine.status();
    assert_eq!(status.pending_actions, 1);
    assert_eq!(status.last_confirmed_sequence, Some(4));
    assert_eq!(h.total(), 13);

    for (sequence, handle) in (3..=5).zip(handles) {
        h.gateway.reply(sequence, Ok(())).await;
        handle.await.expect("task");
    }
}

#[tokio::test]
async fn failed_call_rolls_back_only_its_own_action() {
    let h = Harness::new(
        ScriptedGateway::default().with_document(with_sequence(document("b1", 10), 2)),
    );
    h.engine.set_user(Some(child(&["b1"])));

    let first = h.engine.add_new_token().expect("seq 3");
    let second = h.engine.add_new_token().expect("seq 4");
    assert_eq!(h.total(), 12);

    h.gateway
        .reply(
            3,
            Err(Error::from(RemoteCallError::permission_denied("parents only"))),
        )
        .await;
    first.await.expect("task");

    assert_eq!(h.engine.status().pending_actions, 1);
    assert_eq!(h.total(), 11);

    h.gateway.reply(4, Ok(())).await;
    second.await.expect("task");
    h.gateway.push(with_sequence(document("b1", 11), 4));

    assert_eq!(h.engine.status().pending_actions, 0);
    assert_eq!(h.total(), 11);
}

#[tokio::test]
async fn toggle_round_trip_has_no_flicker() {
    let base = with_reward(document("b1", 50), "r1", 15, false);
    let h = Harness::new(ScriptedGateway::default().with_document(base));
    h.engine.set_user(Some(child(&["b1"])));
    let views_before_action = h.view_count();

    let handle = h
        .engine
        .toggle_reward_selection(&RewardId::from("r1"))
        .expect("action issued");
    assert_eq!(h.total(), 35);
    assert!(h.pending_flag("r1"));

    h.gateway.reply(1, Ok(())).await;
    handle.await.expect("task");

    let confirmed = with_sequence(with_reward(document("b1", 35), "r1", 15, true), 1);
    h.gateway.push(confirmed);

    assert_eq!(h.engine.status().pending_actions, 0);
    let views = h.views.lock().unwrap()[views_before_action..].to_vec();
    assert_eq!(views.len(), 2);
    for view in views {
        let board = view.board().expect("board view");
        assert_eq!(board.total_token, 35);
        assert!(board.rewards[&RewardId::from("r1")].pending);
    }
    assert_eq!(h.celebrations(), 0);
}

#[tokio::test]
async fn toggle_without_enough_tokens_leaves_view_unchanged() {
    let base = with_reward(document("b1", 5), "r1", 10, false);
    let h = Harness::new(ScriptedGateway::default().with_document(base));
    h.engine.set_user(Some(child(&["b1"])));

    let handle = h
        .engine
        .toggle_reward_selection(&RewardId::from("r1"))
        .expect("action issued");

    assert_eq!(h.total(), 5);
    assert!(!h.pending_flag("r1"));

    h.gateway
        .reply(
            1,
            Err(RemoteCallError::failed_precondition("not enough tokens").into()),
        )
        .await;
    handle.await.expect("task");
    assert_eq!(h.total(), 5);
}

#[tokio::test]
async fn token_time_change_fires_one_celebration() {
    let h = Harness::new(
        ScriptedGateway::default().with_document(with_token_time(document("b1", 1), 100)),
    );
    h.engine.set_user(Some(child(&["b1"])));
    assert_eq!(h.celebrations(), 0);

    h.gateway.push(with_token_time(document("b1", 2), 160));
    assert_eq!(h.celebrations(), 1);

    // Unrelated update with the same timestamp.
    h.gateway
        .push(with_reward(with_token_time(document("b1", 2), 160), "r1", 1, false));
    assert_eq!(h.celebrations(), 1);
}

#[tokio::test]
async fn own_confirmed_token_celebrates_again() {
    let h = Harness::new(
        ScriptedGateway::default().with_document(with_token_time(document("b1", 1), 100)),
    );
    h.engine.set_user(Some(child(&["b1"])));

    let handle = h.engine.add_new_token().expect("action issued");
    assert_eq!(h.celebrations(), 1);

    h.gateway.reply(1, Ok(())).await;
    handle.await.expect("task");
    h.gateway
        .push(with_sequence(with_token_time(document("b1", 2), 101), 1));

    assert_eq!(h.celebrations(), 2);
    assert_eq!(h.total(), 2);
}

#[tokio::test]
async fn snapshot_resyncs_sequences_from_previous_session() {
    let h = Harness::new(
        ScriptedGateway::default().with_document(with_sequence(document("b1", 0), 41)),
    );
    h.engine.set_user(Some(child(&["b1"])));
    assert_eq!(h.engine.status().next_sequence, 42);

    let handle = h.engine.add_new_token().expect("action issued");
    h.gateway.reply(42, Ok(())).await;
    handle.await.expect("task");
    assert_eq!(h.gateway.call_sequences(), vec![42]);
}

#[tokio::test]
async fn actions_wait_for_the_first_snapshot() {
    let h = Harness::new(ScriptedGateway::default());
    h.engine.set_user(Some(child(&["b1"])));
    assert_eq!(h.engine.phase(), SyncPhase::LoadingBoard);

    assert!(h.engine.add_new_token().is_none());
    assert!(h
        .engine
        .toggle_reward_selection(&RewardId::from("r1"))
        .is_none());
    settle().await;
    assert!(h.gateway.call_sequences().is_empty());
    assert_eq!(h.engine.status().pending_actions, 0);
    assert_eq!(h.celebrations(), 0);

    h.gateway.push(with_sequence(document("b1", 10), 41));
    assert_eq!(h.engine.phase(), SyncPhase::BoardReady);

    let handle = h.engine.add_new_token().expect("action issued");
    assert_eq!(h.engine.status().pending_actions, 1);
    assert_eq!(h.total(), 11);
    h.gateway.reply(42, Ok(())).await;
    handle.await.expect("task");
    assert_eq!(h.gateway.call_sequences(), vec![42]);
}

#[test]
fn actions_outside_a_runtime_are_skipped() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 3)));
    h.engine.set_user(Some(child(&["b1"])));
    assert_eq!(h.engine.phase(), SyncPhase::BoardReady);
    let views = h.view_count();

    assert!(h.engine.add_new_token().is_none());
    assert!(h.engine.validate_reward(&RewardId::from("r1")).is_none());

    assert_eq!(h.engine.status().pending_actions, 0);
    assert_eq!(h.engine.status().next_sequence, 1);
    assert_eq!(h.view_count(), views);
    assert_eq!(h.celebrations(), 0);
    assert_eq!(h.total(), 3);
}

#[tokio::test]
async fn actions_without_user_or_board_are_no_ops() {
    let h = Harness::new(ScriptedGateway::default());

    assert!(h.engine.add_new_token().is_none());
    assert!(h
        .engine
        .toggle_reward_selection(&RewardId::from("r1"))
        .is_none());
    assert!(h.engine.validate_reward(&RewardId::from("r1")).is_none());
    assert_eq!(h.view_count(), 0);
    assert_eq!(h.celebrations(), 0);
    assert_eq!(h.engine.phase(), SyncPhase::NoUser);
}

#[tokio::test]
async fn initial_board_follows_valid_preference() {
    let gateway = ScriptedGateway::default()
        .with_document(document("b1", 1))
        .with_document(document("b2", 2));
    let h = Harness::with_store(gateway, InMemoryBoardSelectionStore::with_board("b2"));

    h.engine.set_user(Some(child(&["b1", "b2"])));

    assert_eq!(h.engine.selected_board(), Some(BoardId::from("b2")));
    assert_eq!(h.total(), 2);
}

#[tokio::test]
async fn stale_preference_falls_back_to_first_board() {
    let gateway = ScriptedGateway::default().with_document(document("b1", 1));
    let h = Harness::with_store(gateway, InMemoryBoardSelectionStore::with_board("gone"));

    h.engine.set_user(Some(child(&["b1", "b2"])));

    assert_eq!(h.engine.selected_board(), Some(BoardId::from("b1")));
}

#[tokio::test]
async fn switching_boards_tears_down_before_subscribing() {
    let gateway = ScriptedGateway::default()
        .with_document(with_sequence(document("b1", 1), 2))
        .with_document(document("b2", 20));
    let h = Harness::new(gateway);
    h.engine.set_user(Some(child(&["b1", "b2"])));
    let pending = h.engine.add_new_token().expect("action issued");

    h.engine.select_board(&BoardId::from("b2")).expect("select");

    assert_eq!(
        h.gateway.journal(),
        vec!["subscribe:b1", "unsubscribe:b1", "subscribe:b2"]
    );
    assert_eq!(
        h.store.last_selected_board().expect("store"),
        Some(BoardId::from("b2"))
    );
    assert_eq!(h.engine.status().pending_actions, 0);
    assert_eq!(h.total(), 20);

    // A late snapshot from the discarded subscription must not resurface.
    h.gateway.push_to_stale_sinks(document("b1", 99));
    assert_eq!(h.total(), 20);

    // Nor does the old board's failing call touch the new board.
    let views = h.view_count();
    h.gateway
        .reply(3, Err(RemoteCallError::unavailable("offline").into()))
        .await;
    pending.await.expect("task");
    assert_eq!(h.view_count(), views);
    assert_eq!(h.total(), 20);
}

#[tokio::test]
async fn selecting_an_unknown_board_is_rejected() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 1)));

    assert!(h.engine.select_board(&BoardId::from("b1")).is_err());

    h.engine.set_user(Some(child(&["b1"])));
    let err = h
        .engine
        .select_board(&BoardId::from("someone-else"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(h.engine.selected_board(), Some(BoardId::from("b1")));

    // Re-selecting the current board keeps the subscription.
    h.engine.select_board(&BoardId::from("b1")).expect("select");
    assert_eq!(h.gateway.journal(), vec!["subscribe:b1"]);
}

#[tokio::test]
async fn resolving_the_same_user_keeps_the_subscription() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 1)));
    h.engine.set_user(Some(child(&["b1"])));
    h.engine.set_user(Some(child(&["b1", "b3"])));

    assert_eq!(h.gateway.journal(), vec!["subscribe:b1"]);
    assert_eq!(h.engine.phase(), SyncPhase::BoardReady);
}

#[tokio::test]
async fn signing_out_clears_the_board() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 1)));
    h.engine.set_user(Some(child(&["b1"])));

    h.engine.set_user(None);

    assert_eq!(h.engine.phase(), SyncPhase::NoUser);
    assert_eq!(h.last_view(), BoardView::NoBoard);
    assert_eq!(h.engine.current_view(), BoardView::NoBoard);
    assert_eq!(h.gateway.active_subscriptions(), 0);
}

#[tokio::test]
async fn invalid_snapshot_is_ignored() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 4)));
    h.engine.set_user(Some(child(&["b1"])));
    let views = h.view_count();

    h.gateway.push(document("b1", -3));

    assert_eq!(h.view_count(), views);
    assert_eq!(h.total(), 4);
}

#[tokio::test]
async fn dispose_stops_everything() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 4)));
    h.engine.set_user(Some(child(&["b1"])));

    h.engine.dispose();

    assert_eq!(h.gateway.active_subscriptions(), 0);
    assert!(h.engine.add_new_token().is_none());
    h.engine.set_user(Some(child(&["b1"])));
    assert_eq!(h.engine.phase(), SyncPhase::NoUser);
    assert_eq!(h.gateway.journal(), vec!["subscribe:b1", "unsubscribe:b1"]);
}

#[tokio::test]
async fn handler_may_act_on_the_engine() {
    let h = Harness::new(ScriptedGateway::default().with_document(document("b1", 0)));
    let engine = h.engine.clone();
    let issued = Arc::new(Mutex::new(Vec::new()));
    let handles = Arc::clone(&issued);
    let subscription = h.engine.on_current_board_updated(move |view| {
        if view.board().is_some_and(|b| b.total_token == 0) {
            if let Some(handle) = engine.add_new_token() {
                handles.lock().unwrap().push(handle);
            }
        }
    });

    h.engine.set_user(Some(child(&["b1"])));
    subscription.unsubscribe();

    assert_eq!(h.total(), 1);
    h.gateway.reply(1, Ok(())).await;
    let handle = issued.lock().unwrap().pop().expect("handle");
    handle.await.expect("task");
}
