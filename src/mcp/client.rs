//! Server-to-client requests (elicitation).
//!
//! Mirrors the pending-request table of a request/response client: each
//! outgoing request parks a `oneshot` sender under its id until the reader
//! loop routes the matching response back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::protocol::{JsonRpcClientResponse, JsonRpcErrorData, OutgoingRequest, RequestId};
use super::transport::Outbound;
use crate::{Error, Result};

type Reply = std::result::Result<Value, JsonRpcErrorData>;

#[derive(Default)]
struct Table {
    /// Set once the client can no longer answer.
    closed: bool,
    waiting: HashMap<RequestId, oneshot::Sender<Reply>>,
}

/// Server-initiated requests waiting for the client's answer.
#[derive(Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    table: Mutex<Table>,
}

/// Removes its entry when the waiting request goes away, answered or not.
struct Waiter<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.pending.table().waiting.remove(&self.id);
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self) -> Result<(Waiter<'_>, oneshot::Receiver<Reply>)> {
        let mut table = self.table();
        if table.closed {
            return Err(Error::Elicitation("client input is closed".to_string()));
        }
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = RequestId::String(format!("srv-{n}"));
        let (tx, rx) = oneshot::channel();
        table.waiting.insert(id.clone(), tx);
        Ok((Waiter { pending: self, id }, rx))
    }

    /// Routes a client response to its waiter. Returns `false` for unknown ids.
    pub fn resolve(&self, response: JsonRpcClientResponse) -> bool {
        let Some(sender) = self.table().waiting.remove(&response.id) else {
            warn!(id = %response.id, "Received response for unknown request");
            return false;
        };
        let reply = match (response.result, response.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        };
        if sender.send(reply).is_err() {
            debug!(id = %response.id, "Requester stopped waiting");
        }
        true
    }

    /// Fails every waiter and refuses new requests: no answer can arrive
    /// any more.
    pub fn abandon_all(&self) -> usize {
        let mut table = self.table();
        table.closed = true;
        let n = table.waiting.len();
        table.waiting.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.table().waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    Accept,
    Decline,
    Cancel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitAction,
    #[serde(default)]
    pub content: Option<Map<String, Value>>,
}

/// Lets a handler ask the connected client something and suspend until it
/// answers.
#[derive(Clone)]
pub struct ClientRequester {
    outbound: Outbound,
    pending: Arc<PendingRequests>,
    supports_elicitation: bool,
    timeout: Duration,
}

impl ClientRequester {
    pub fn new(
        outbound: Outbound,
        pending: Arc<PendingRequests>,
        supports_elicitation: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            pending,
            supports_elicitation,
            timeout,
        }
    }

    pub fn supports_elicitation(&self) -> bool {
        self.supports_elicitation
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (waiter, rx) = self.pending.register()?;
        debug!(id = %waiter.id, method, "Sending request to client");
        self.outbound
            .send(&OutgoingRequest::new(waiter.id.clone(), method, params))?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(Error::Elicitation(format!(
                "client returned error {}: {}",
                error.code, error.message
            ))),
            Ok(Err(_)) => Err(Error::Elicitation("client request dropped".to_string())),
            Err(_) => Err(Error::Elicitation(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Sends `elicitation/create` with a flat object schema.
    pub async fn elicit(&self, message: &str, requested_schema: Value) -> Result<ElicitResult> {
        if !self.supports_elicitation {
            return Err(Error::Elicitation(
                "client does not support elicitation".to_string(),
            ));
        }
        let result = self
            .request(
                "elicitation/create",
                json!({ "message": message, "requestedSchema": requested_schema }),
            )
            .await?;
        serde_json::from_value(result)
            .map_err(|e| Error::Elicitation(format!("malformed elicitation result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn requester(supports: bool, timeout_ms: u64) -> (ClientRequester, Arc<PendingRequests>, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = Outbound::channel();
        let pending = Arc::new(PendingRequests::new());
        let client = ClientRequester::new(
            outbound,
            Arc::clone(&pending),
            supports,
            Duration::from_millis(timeout_ms),
        );
        (client, pending, rx)
    }

    #[tokio::test]
    async fn test_elicit_round_trip() {
        let (client, pending, mut rx) = requester(true, 1_000);

        let answering = tokio::spawn(async move {
            let line = rx.recv().await.unwrap();
            let sent: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(sent["method"], "elicitation/create");
            let id: RequestId = serde_json::from_value(sent["id"].clone()).unwrap();
            pending.resolve(JsonRpcClientResponse {
                jsonrpc: "2.0".to_string(),
                id,
                result: Some(json!({"action": "accept", "content": {"answer": 12}})),
                error: None,
            })
        });

        let result = client.elicit("What is 3 * 4?", json!({"type": "object"})).await.unwrap();
        assert!(answering.await.unwrap());
        assert_eq!(result.action, ElicitAction::Accept);
        assert_eq!(result.content.unwrap()["answer"], 12);
    }

    #[tokio::test]
    async fn test_elicit_requires_capability() {
        let (client, _pending, _rx) = requester(false, 1_000);
        assert_matches!(
            client.elicit("?", json!({})).await,
            Err(Error::Elicitation(msg)) if msg.contains("does not support")
        );
    }

    #[tokio::test]
    async fn test_request_times_out_and_forgets() {
        let (client, pending, _rx) = requester(true, 20);
        assert_matches!(client.request("ping", json!({})).await, Err(Error::Elicitation(_)));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_request_fails_fast() {
        let (client, pending, mut rx) = requester(true, 60_000);
        let waiting = tokio::spawn(async move { client.request("elicitation/create", json!({})).await });
        rx.recv().await.unwrap();
        while pending.is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(pending.abandon_all(), 1);
        assert_matches!(waiting.await.unwrap(), Err(Error::Elicitation(msg)) if msg.contains("dropped"));
    }

    #[test]
    fn test_resolve_unknown_id() {
        let pending = PendingRequests::new();
        let resolved = pending.resolve(JsonRpcClientResponse {
            jsonrpc: "2.0".to_string(),
            id: RequestId::from("srv-99"),
            result: Some(json!({})),
            error: None,
        });
        assert!(!resolved);
    }

    #[tokio::test]
    async fn test_requests_after_close_fail_immediately() {
        let (client, pending, mut rx) = requester(true, 60_000);
        assert_eq!(pending.abandon_all(), 0);

        let started = std::time::Instant::now();
        assert_matches!(
            client.elicit("What is 2 + 2?", json!({"type": "object"})).await,
            Err(Error::Elicitation(msg)) if msg.contains("closed")
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_request_forgets_its_entry() {
        let (client, pending, mut rx) = requester(true, 60_000);
        let waiting = tokio::spawn(async move { client.request("elicitation/create", json!({})).await });
        rx.recv().await.unwrap();
        assert_eq!(pending.len(), 1);

        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());
        assert!(pending.is_empty());
    }
}
