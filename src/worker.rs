//! Background request dispatch.
//!
//! Every request runs as its own task on the tokio runtime so the session loop never blocks on
//! the network. Results come back as [`UiEvent`]s over a channel whose only consumer is the
//! session loop; tasks never touch session state. There is no cancellation, retry or
//! deduplication: two requests in flight complete independently and whichever finishes last
//! becomes the shown result.

use std::sync::mpsc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::client::{ApiClient, KeyUsage};
use crate::prompt::{ChatRequest, OutputMode};
use crate::view::ResultView;

/// Everything the session loop reacts to.
#[derive(Debug)]
pub enum UiEvent {
    /// A line typed by the user.
    Input(String),
    /// stdin closed.
    InputClosed,
    /// A capture request finished, successfully or not.
    Completed { id: u64, view: ResultView },
    /// A key-usage refresh finished.
    Usage(Result<KeyUsage, String>),
}

pub type EventSender = mpsc::Sender<UiEvent>;

pub struct Dispatcher {
    runtime: Handle,
    client: ApiClient,
    events: EventSender,
    next_id: u64,
}

impl Dispatcher {
    pub fn new(runtime: Handle, client: ApiClient, events: EventSender) -> Self {
        Self {
            runtime,
            client,
            events,
            next_id: 1,
        }
    }

    /// Spawns the request and returns its id; the result arrives as [`UiEvent::Completed`].
    pub fn submit(&mut self, mode: OutputMode, request: ChatRequest) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let client = self.client.clone();
        let events = self.events.clone();
        debug!(id, model = %request.model, %mode, "Dispatching request");
        self.runtime.spawn(async move {
            let view = match client.complete(&request).await {
                Ok(raw) => ResultView::from_response(mode, &raw),
                Err(err) => {
                    warn!(id, error = %err, "Request failed");
                    ResultView::from_error(err)
                }
            };
            if !deliver(&events, UiEvent::Completed { id, view }) {
                debug!(id, "Session gone, dropping result");
            }
        });
        id
    }

    /// Fetches key usage in the background; the result arrives as [`UiEvent::Usage`].
    pub fn refresh_usage(&self) {
        let client = self.client.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let usage = client.key_usage().await.map_err(|e| e.to_string());
            if !deliver(&events, UiEvent::Usage(usage)) {
                debug!("Session gone, dropping usage");
            }
        });
    }
}

/// Hands `event` to the session loop. Returns `false` once the receiver is gone.
fn deliver(events: &EventSender, event: UiEvent) -> bool {
    events.send(event).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_client() -> ApiClient {
        // Port 9 (discard) is closed on test machines: connection refused.
        ApiClient::new("sk-test-0000000000000000", "http://127.0.0.1:9".into()).unwrap()
    }

    #[test]
    fn test_failed_request_delivers_error_view() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut dispatcher = Dispatcher::new(runtime.handle().clone(), unreachable_client(), tx);

        let request = ChatRequest::new("openai/gpt-4.1-mini", "prompt".into(), b"png");
        let first = dispatcher.submit(OutputMode::Excel, request.clone());
        let second = dispatcher.submit(OutputMode::Docs, request);
        assert_eq!((first, second), (1, 2));

        let mut ids = Vec::new();
        for _ in 0..2 {
            match rx.recv_timeout(Duration::from_secs(30)).unwrap() {
                UiEvent::Completed { id, view } => {
                    assert!(view.is_error(), "unexpected view {view:?}");
                    assert!(view.to_string().starts_with("Error: "));
                    ids.push(id);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_deliver_after_session_closed() {
        let (tx, rx) = mpsc::channel();
        assert!(deliver(&tx, UiEvent::InputClosed));
        drop(rx);
        assert!(!deliver(&tx, UiEvent::Usage(Err("offline".into()))));
    }

    #[test]
    fn test_results_after_session_closed_are_dropped() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut dispatcher = Dispatcher::new(runtime.handle().clone(), unreachable_client(), tx);
        drop(rx);

        dispatcher.refresh_usage();
        let request = ChatRequest::new("openai/gpt-4.1-mini", "prompt".into(), b"png");
        assert_eq!(dispatcher.submit(OutputMode::Excel, request), 1);
        runtime.shutdown_timeout(Duration::from_secs(30));
    }

    #[test]
    fn test_usage_refresh_reports_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(runtime.handle().clone(), unreachable_client(), tx);

        dispatcher.refresh_usage();
        match rx.recv_timeout(Duration::from_secs(30)).unwrap() {
            UiEvent::Usage(result) => assert!(result.is_err()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
