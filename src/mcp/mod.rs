pub mod client;
pub mod context;
pub mod dispatcher;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod schema;
pub mod tools;
pub mod transport;
pub mod transport_trait;
pub mod uri_template;

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::calc::ServerState;
use crate::config::{MalformedInputPolicy, ServerConfig};
use crate::{Error, Result};
use dispatcher::Dispatcher;
use protocol::{parse_message, IncomingMessage, JsonRpcError};
use registry::Registry;
use transport::{LineReader, Outbound};
use transport_trait::McpTransportTrait;

/// Why the read loop stopped.
enum Ending {
    EndOfInput,
    Signal,
    Malformed(Error),
    ReadFailed(Error),
}

pub struct McpServer {
    malformed_input: MalformedInputPolicy,
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    /// Builds the registry. Fails on a duplicate registration.
    pub fn new(config: ServerConfig) -> Result<Self> {
        info!("Initializing MCP server");

        let state = Arc::new(ServerState::new());
        let mut registry = Registry::new();
        tools::register_all(&mut registry, &state, &config)?;
        resources::register_all(&mut registry, &state)?;
        prompts::register_all(&mut registry)?;
        info!(
            tools = registry.tools().len(),
            prompts = registry.prompts().len(),
            "Registered operations"
        );

        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), state, &config));
        Ok(Self {
            malformed_input: config.malformed_input,
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serves stdin/stdout until end of input or a termination signal.
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server on stdio");
        self.serve_io(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
            .await
    }

    pub async fn serve_io<R, W, S>(self, reader: R, writer: W, shutdown: S) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        self.serve_transport(Box::new(LineReader::new(reader)), writer, shutdown)
            .await
    }

    /// Read loop: every request except `initialize` runs in its own task, so
    /// a suspended handler never holds up the next line.
    pub async fn serve_transport<W, S>(
        self,
        mut transport: Box<dyn McpTransportTrait>,
        writer: W,
        shutdown: S,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()> + Send,
    {
        let (outbound, rx) = Outbound::channel();
        let writer_task = tokio::spawn(transport::write_loop(writer, rx));
        let mut handlers: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        let ending = loop {
            tokio::select! {
                _ = &mut shutdown => break Ending::Signal,

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Request task failed");
                    }
                }

                line = transport.read_line() => match line {
                    Ok(Some(line)) => {
                        if let Err(err) = self.accept_line(&line, &outbound, &mut handlers).await {
                            break Ending::Malformed(err);
                        }
                    }
                    Ok(None) => break Ending::EndOfInput,
                    Err(err) => break Ending::ReadFailed(err),
                },
            }
        };

        let result = match ending {
            Ending::EndOfInput => {
                info!(in_flight = handlers.len(), "Input closed, finishing in-flight requests");
                self.drain(&mut handlers).await;
                Ok(())
            }
            Ending::Malformed(err) => {
                info!(in_flight = handlers.len(), "Stopped reading, finishing in-flight requests");
                self.drain(&mut handlers).await;
                Err(err)
            }
            Ending::Signal => {
                info!(in_flight = handlers.len(), "Shutdown requested, aborting in-flight requests");
                handlers.shutdown().await;
                Ok(())
            }
            Ending::ReadFailed(err) => {
                error!(error = %err, "Failed to read input");
                handlers.shutdown().await;
                Err(err)
            }
        };

        drop(outbound);
        writer_task
            .await
            .map_err(|e| Error::Internal(format!("writer task failed: {e}")))??;
        info!("MCP server stopped");
        result
    }

    async fn drain(&self, handlers: &mut JoinSet<()>) {
        // The client can no longer answer elicitations.
        self.dispatcher.abandon_client_requests();
        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Request task failed");
            }
        }
    }

    /// Classifies one line. Returns an error only when the stream must close.
    async fn accept_line(
        &self,
        line: &str,
        outbound: &Outbound,
        handlers: &mut JoinSet<()>,
    ) -> Result<()> {
        trace!("Received message: {}", line);
        match parse_message(line) {
            // Capabilities must be recorded before any later line is routed.
            Ok(IncomingMessage::Request(request)) if request.method == "initialize" => {
                self.dispatcher.handle_request(request, outbound.clone()).await;
            }
            Ok(IncomingMessage::Request(request)) => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let outbound = outbound.clone();
                handlers.spawn(async move { dispatcher.handle_request(request, outbound).await });
            }
            Ok(IncomingMessage::Notification(notification)) => {
                self.dispatcher.handle_notification(notification).await;
            }
            Ok(IncomingMessage::Response(response)) => {
                debug!(id = %response.id, "Received client response");
                self.dispatcher.resolve_client_response(response);
            }
            Err(err) => match self.malformed_input {
                MalformedInputPolicy::Exit => {
                    error!(reason = %err, "Malformed envelope, closing input");
                    return Err(err.into());
                }
                MalformedInputPolicy::Reject => {
                    warn!(reason = %err, "Rejecting malformed envelope");
                    if let Err(e) = outbound.send(&JsonRpcError::parse_error()) {
                        warn!(error = %e, "Failed to queue parse error");
                    }
                }
            },
        }
        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Could not install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                warn!(error = %e, "Could not install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use serde_json::Value;
    use tokio::io::AsyncBufReadExt;

    mock! {
        pub Transport {}

        #[async_trait::async_trait]
        impl McpTransportTrait for Transport {
            async fn read_line(&mut self) -> Result<Option<String>>;
        }
    }

    #[test]
    fn test_server_builds_registry() {
        let server = McpServer::new(ServerConfig::default()).unwrap();
        assert_eq!(server.dispatcher().state().stats.request_count(), 0);
    }

    #[tokio::test]
    async fn test_serve_transport_with_mock() {
        let mut transport = MockTransport::new();
        let mut lines = vec![
            Some(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string()),
            None,
        ]
        .into_iter();
        transport
            .expect_read_line()
            .times(2)
            .returning(move || Ok(lines.next().flatten()));

        let (client, server_side) = tokio::io::duplex(4096);
        let server = McpServer::new(ServerConfig::default()).unwrap();
        server
            .serve_transport(Box::new(transport), server_side, std::future::pending())
            .await
            .unwrap();

        let mut reader = tokio::io::BufReader::new(client).lines();
        let line = reader.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_read_failure_is_fatal() {
        let mut transport = MockTransport::new();
        transport.expect_read_line().returning(|| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )))
        });

        let (_client, server_side) = tokio::io::duplex(64);
        let server = McpServer::new(ServerConfig::default()).unwrap();
        let err = server
            .serve_transport(Box::new(transport), server_side, std::future::pending())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 70);
    }
}
