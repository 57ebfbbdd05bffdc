use crate::Result;
use async_trait::async_trait;

/// Inbound side of the MCP transport, abstracted to enable testing with mocks
#[async_trait]
pub trait McpTransportTrait: Send {
    /// Read the next envelope line; `None` once the peer closed the stream.
    ///
    /// Implementations must be cancel-safe.
    async fn read_line(&mut self) -> Result<Option<String>>;
}
