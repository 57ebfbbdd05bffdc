pub mod calc;
pub mod config;
pub mod error;
pub mod mcp;

pub use config::ServerConfig;
pub use error::Error;
pub use mcp::McpServer;

pub type Result<T> = std::result::Result<T, Error>;

pub async fn serve(config: ServerConfig) -> Result<()> {
    let server = McpServer::new(config)?;
    server.run().await
}
