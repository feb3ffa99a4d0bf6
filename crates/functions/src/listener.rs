//! Polling listener that follows one board document.

use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

use tokenboard_core::boards::{BoardDocument, BoardId};
use tokenboard_core::sync::{RemoteSubscription, SnapshotSink};

use crate::client::BoardFunctionsClient;
use crate::error::{ApiRetryClass, Result};

/// Maximum jitter added to each poll, as a fraction of the interval.
const POLL_JITTER_DIVISOR: u32 = 10;
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Delay before the next poll after `consecutive_failures` failed fetches.
pub(crate) fn backoff_delay(poll_interval: Duration, consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.min(MAX_BACKOFF_EXPONENT);
    poll_interval.saturating_mul(2_u32.pow(exponent))
}

fn jitter(poll_interval: Duration) -> Duration {
    let bound = (poll_interval / POLL_JITTER_DIVISOR).as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}

/// Background task delivering a board document to a sink.
///
/// Aborted on `unsubscribe` and on drop.
#[derive(Debug)]
pub struct BoardListener {
    board_id: BoardId,
    handle: JoinHandle<()>,
}

impl BoardListener {
    pub fn board_id(&self) -> &BoardId {
        &self.board_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl RemoteSubscription for BoardListener {
    fn unsubscribe(self: Box<Self>) {
        debug!("[Functions] Stopping listener for board {}", self.board_id);
        self.handle.abort();
    }
}

impl Drop for BoardListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start polling `board_id` through `client`.
///
/// The first successful fetch is always delivered; later fetches only when
/// the document changed. Failed fetches back off exponentially.
pub fn spawn_board_listener(
    client: BoardFunctionsClient,
    board_id: BoardId,
    poll_interval: Duration,
    sink: SnapshotSink,
) -> BoardListener {
    let fetch_id = board_id.clone();
    let fetch = move || {
        let client = client.clone();
        let board_id = fetch_id.clone();
        async move { client.fetch_board(&board_id).await }
    };
    spawn_polling(board_id, poll_interval, fetch, sink)
}

pub(crate) fn spawn_polling<F, Fut>(
    board_id: BoardId,
    poll_interval: Duration,
    fetch: F,
    sink: SnapshotSink,
) -> BoardListener
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<BoardDocument>> + Send + 'static,
{
    let task_board_id = board_id.clone();
    let handle = tokio::spawn(async move {
        let board_id = task_board_id;
        let mut last_delivered: Option<BoardDocument> = None;
        let mut consecutive_failures = 0_u32;

        loop {
            let delay = match fetch().await {
                Ok(doc) => {
                    consecutive_failures = 0;
                    if last_delivered.as_ref() != Some(&doc) {
                        last_delivered = Some(doc.clone());
                        sink(doc);
                    }
                    poll_interval + jitter(poll_interval)
                }
                Err(err) => {
                    let delay = backoff_delay(poll_interval, consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    match err.retry_class() {
                        ApiRetryClass::Retryable => debug!(
                            "[Functions] Fetch of board {} failed, retrying in {:?}: {}",
                            board_id, delay, err
                        ),
                        ApiRetryClass::Permanent | ApiRetryClass::ReauthRequired => warn!(
                            "[Functions] Fetch of board {} failed ({:?}), retrying in {:?}: {}",
                            board_id,
                            err.retry_class(),
                            delay,
                            err
                        ),
                    }
                    delay + jitter(poll_interval)
                }
            };
            tokio::time::sleep(delay).await;
        }
    });

    BoardListener { board_id, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FunctionsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn doc(total: i64) -> BoardDocument {
        serde_json::from_value(serde_json::json!({ "id": "board-1", "totalToken": total }))
            .expect("decode")
    }

    fn recording_sink() -> (SnapshotSink, Arc<Mutex<Vec<i64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: SnapshotSink = Arc::new(move |doc: BoardDocument| {
            sink_seen.lock().unwrap().push(doc.total_token);
        });
        (sink, seen)
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<i64>>>, len: usize) {
        for _ in 0..200 {
            if seen.lock().unwrap().len() >= len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 40), backoff_delay(base, MAX_BACKOFF_EXPONENT));
    }

    #[tokio::test]
    async fn delivers_first_document_and_only_changes_after() {
        let polls = Arc::new(AtomicUsize::new(0));
        let fetch_polls = Arc::clone(&polls);
        let fetch = move || {
            let n = fetch_polls.fetch_add(1, Ordering::SeqCst);
            // 1, 1, 1, 2, 2, 2, ...
            let total = 1 + (n / 3) as i64;
            async move { Ok(doc(total)) }
        };
        let (sink, seen) = recording_sink();

        let listener = spawn_polling(
            BoardId::from("board-1"),
            Duration::from_millis(1),
            fetch,
            sink,
        );
        wait_for(&seen, 2).await;
        Box::new(listener).unsubscribe();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(&seen[..2], &[1, 2]);
        assert!(polls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_listener() {
        let polls = Arc::new(AtomicUsize::new(0));
        let fetch_polls = Arc::clone(&polls);
        let fetch = move || {
            let n = fetch_polls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FunctionsError::api(503, "unavailable"))
                } else {
                    Ok(doc(5))
                }
            }
        };
        let (sink, seen) = recording_sink();

        let listener = spawn_polling(
            BoardId::from("board-1"),
            Duration::from_millis(1),
            fetch,
            sink,
        );
        wait_for(&seen, 1).await;
        assert_eq!(seen.lock().unwrap().first().copied(), Some(5));
        assert!(!listener.is_finished());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let polls = Arc::new(AtomicUsize::new(0));
        let fetch_polls = Arc::clone(&polls);
        let fetch = move || {
            let n = fetch_polls.fetch_add(1, Ordering::SeqCst) as i64;
            async move { Ok(doc(n)) }
        };
        let (sink, seen) = recording_sink();

        let listener = spawn_polling(
            BoardId::from("board-1"),
            Duration::from_millis(1),
            fetch,
            sink,
        );
        wait_for(&seen, 1).await;
        Box::new(listener).unsubscribe();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let after_unsubscribe = seen.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(seen.lock().unwrap().len(), after_unsubscribe);
    }
}
