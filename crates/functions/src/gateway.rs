//! `BoardGateway` over the board cloud functions.

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

use tokenboard_core::boards::{BoardCall, BoardId};
use tokenboard_core::sync::{BoardGateway, RemoteSubscription, SnapshotSink};
use tokenboard_core::Error;

use crate::client::BoardFunctionsClient;
use crate::config::FunctionsConfig;
use crate::listener::spawn_board_listener;

/// Remote board gateway backed by HTTP callables and a polling listener.
///
/// `subscribe` must be called from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct HttpBoardGateway {
    client: BoardFunctionsClient,
    poll_interval: Duration,
}

impl HttpBoardGateway {
    pub fn new(config: &FunctionsConfig) -> crate::Result<Self> {
        Ok(Self {
            client: BoardFunctionsClient::new(config)?,
            poll_interval: config.poll_interval,
        })
    }

    pub fn from_client(client: BoardFunctionsClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Underlying client, e.g. to refresh the id token after sign-in.
    pub fn client(&self) -> &BoardFunctionsClient {
        &self.client
    }
}

#[async_trait]
impl BoardGateway for HttpBoardGateway {
    fn subscribe(
        &self,
        board_id: &BoardId,
        sink: SnapshotSink,
    ) -> tokenboard_core::Result<Box<dyn RemoteSubscription>> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::Subscription(format!(
                "no async runtime to follow board {}",
                board_id
            )));
        }

        debug!("[Functions] Listening to board {}", board_id);
        let listener = spawn_board_listener(
            self.client.clone(),
            board_id.clone(),
            self.poll_interval,
            sink,
        );
        Ok(Box::new(listener))
    }

    async fn call(&self, call: BoardCall) -> tokenboard_core::Result<()> {
        debug!(
            "[Functions] {} on board {} (seq {})",
            call.function_name(),
            call.board_id(),
            call.sequence()
        );
        self.client.call(&call).await.map_err(|err| {
            warn!(
                "[Functions] {} on board {} rejected: {}",
                call.function_name(),
                call.board_id(),
                err
            );
            Error::from(err)
        })
    }
}
