use tracing::warn;

use super::client::ClientRequester;
use super::protocol::{OutgoingNotification, RequestId};
use super::transport::Outbound;

/// Progress sink for one request. Each `report` queues exactly one
/// `notifications/progress` envelope tagged with the request id.
#[derive(Clone)]
pub struct ProgressReporter {
    request_id: RequestId,
    outbound: Outbound,
}

impl ProgressReporter {
    pub fn new(request_id: RequestId, outbound: Outbound) -> Self {
        Self {
            request_id,
            outbound,
        }
    }

    pub fn report(&self, percent: u8, message: Option<&str>) {
        let notification = OutgoingNotification::progress(&self.request_id, percent, message);
        if let Err(e) = self.outbound.send(&notification) {
            warn!(request_id = %self.request_id, error = %e, "Failed to queue progress notification");
        }
    }
}

/// What a handler receives besides its arguments.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub progress: ProgressReporter,
    pub client: ClientRequester,
}

impl RequestContext {
    pub fn new(request_id: RequestId, outbound: Outbound, client: ClientRequester) -> Self {
        Self {
            progress: ProgressReporter::new(request_id.clone(), outbound),
            request_id,
            client,
        }
    }
}

#[cfg(test)]
impl RequestContext {
    /// Context wired to a fresh channel, without elicitation support.
    pub(crate) fn for_test(
        request_id: impl Into<RequestId>,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        use std::sync::Arc;
        use std::time::Duration;

        use super::client::PendingRequests;

        let (outbound, rx) = Outbound::channel();
        let client = ClientRequester::new(
            outbound.clone(),
            Arc::new(PendingRequests::new()),
            false,
            Duration::from_secs(1),
        );
        (Self::new(request_id.into(), outbound, client), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_reports_are_queued_in_order() {
        let (ctx, mut rx) = RequestContext::for_test(7);
        ctx.progress.report(10, Some("first"));
        ctx.progress.report(90, None);

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["params"]["progressToken"], 7);
        assert_eq!(first["params"]["progress"], 10);
        assert_eq!(first["params"]["message"], "first");
        assert_eq!(second["params"]["progress"], 90);
    }

    #[test]
    fn test_report_after_close_does_not_panic() {
        let (ctx, rx) = RequestContext::for_test("gone");
        drop(rx);
        ctx.progress.report(50, None);
    }
}
