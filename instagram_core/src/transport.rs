use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::error::ConnectorError;
use crate::mcp_server::JsonRpcHandler;

/// Line-delimited JSON-RPC transport for the MCP server
pub struct StdioTransport {
    handler: JsonRpcHandler,
}

impl StdioTransport {
    pub fn new(handler: JsonRpcHandler) -> Self {
        Self { handler }
    }

    /// Run the transport on stdin/stdout until stdin closes
    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve requests from any line reader to any writer
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.process_line(&line).await {
                Self::write_response(&mut writer, &response).await?;
            }
        }
        debug!("EOF reached on input");
        Ok(())
    }

    /// Process a single line of input
    async fn process_line(&self, line: &str) -> Option<Value> {
        debug!("Processing line: {}", line);

        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handler.handle_request(request).await,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                Some(serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": ConnectorError::ParseError.to_jsonrpc_error(),
                    "id": null
                }))
            }
        }
    }

    async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> io::Result<()> {
        let response_str = serde_json::to_string(response)?;

        writer.write_all(response_str.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        debug!("Sent response: {}", response_str);

        Ok(())
    }
}
