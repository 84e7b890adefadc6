use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::{ConnectorError, ProviderRegistry};
use rmcp::model::*;

/// MCP Server implementation that wraps the ProviderRegistry
pub struct McpServer {
    registry: Arc<ProviderRegistry>,
}

impl McpServer {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Get aggregated capabilities from all connectors
    pub async fn get_capabilities(&self) -> ServerCapabilities {
        let mut capabilities = ServerCapabilities::default();

        for connector in self.registry.providers.values() {
            let conn_caps = connector.capabilities().await;
            if conn_caps.tools.is_some() {
                capabilities.tools = conn_caps.tools;
            }
            if conn_caps.resources.is_some() {
                capabilities.resources = conn_caps.resources;
            }
        }

        capabilities
    }

    pub async fn handle_initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!("MCP Server initializing");

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.get_capabilities().await,
            server_info: Implementation {
                name: "instagram".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some("Read-only Instagram insights captured when the server started. Call the tools without arguments.".to_string()),
        })
    }

    /// Handle list_resources request - aggregates from all connectors
    pub async fn handle_list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        let mut all_resources = Vec::new();

        for (name, connector) in self.registry.providers.iter() {
            match connector.list_resources(request.clone()).await {
                Ok(response) => all_resources.extend(response.resources),
                Err(e) => error!("Error listing resources from connector {}: {:?}", name, e),
            }
        }

        Ok(ListResourcesResult {
            resources: all_resources,
            next_cursor: None,
        })
    }

    /// Handle read_resource request - routes to the connector that owns the URI
    pub async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError> {
        for connector in self.registry.providers.values() {
            match connector.read_resource(request.clone()).await {
                Ok(contents) => return Ok(contents),
                Err(ConnectorError::ResourceNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ConnectorError::ResourceNotFound)
    }

    /// Handle list_tools request - aggregates from all connectors
    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let mut all_tools = Vec::new();

        for (connector_name, connector) in self.registry.providers.iter() {
            match connector.list_tools(request.clone()).await {
                Ok(response) => {
                    // Prefix tool names with connector name to avoid conflicts
                    all_tools.extend(response.tools.into_iter().map(|mut tool| {
                        tool.name = format!("{}/{}", connector_name, tool.name).into();
                        tool
                    }));
                }
                Err(e) => {
                    error!(
                        "Error listing tools from connector {}: {:?}",
                        connector_name, e
                    );
                }
            }
        }

        Ok(ListToolsResult {
            tools: all_tools,
            next_cursor: None,
        })
    }

    /// Handle call_tool request. Accepts `connector/tool`, or a bare tool name
    /// when exactly one connector provides it.
    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let (connector_name, tool_name) = match request.name.split_once('/') {
            Some((connector, tool)) => (connector.to_string(), tool.to_string()),
            None => (self.owner_of(&request.name).await?, request.name.to_string()),
        };

        let connector = self.registry.get_provider(&connector_name).ok_or_else(|| {
            ConnectorError::InvalidInput(format!("Unknown connector: {}", connector_name))
        })?;

        debug!(connector = %connector_name, tool = %tool_name, "Calling tool");
        connector
            .call_tool(CallToolRequestParam {
                name: tool_name.into(),
                arguments: request.arguments,
            })
            .await
    }

    async fn owner_of(&self, tool_name: &str) -> Result<String, ConnectorError> {
        let mut owners = Vec::new();
        for (name, connector) in self.registry.providers.iter() {
            if let Ok(response) = connector.list_tools(None).await {
                if response.tools.iter().any(|t| t.name == tool_name) {
                    owners.push(name.clone());
                }
            }
        }
        match owners.len() {
            0 => Err(ConnectorError::ToolNotFound),
            1 => Ok(owners.remove(0)),
            _ => Err(ConnectorError::InvalidInput(format!(
                "Tool '{}' is provided by several connectors ({}); use 'connector/tool'",
                tool_name,
                owners.join(", ")
            ))),
        }
    }
}

fn to_json<T: serde::Serialize>(result: Result<T, ConnectorError>) -> Result<Value, Value> {
    result
        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
        .map_err(|e| e.to_jsonrpc_error())
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, Value> {
    serde_json::from_value(params)
        .map_err(|e| ConnectorError::InvalidParams(e.to_string()).to_jsonrpc_error())
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process a JSON-RPC message. Notifications (no `id`) produce no response.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        debug!("Handling JSON-RPC request: {:?}", request);

        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = match request.get("params") {
            Some(Value::Null) | None => json!({}),
            Some(p) => p.clone(),
        };

        if id.is_none() {
            debug!(method, "Ignoring notification");
            return None;
        }

        let result = match method {
            "initialize" => match parse_params::<InitializeRequestParam>(params) {
                Ok(req) => to_json(self.server.handle_initialize(req).await),
                Err(e) => Err(e),
            },
            "ping" => Ok(json!({})),
            "resources/list" => match parse_params::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => to_json(self.server.handle_list_resources(req).await),
                Err(e) => Err(e),
            },
            "resources/read" => match parse_params::<ReadResourceRequestParam>(params) {
                Ok(req) => to_json(
                    self.server
                        .handle_read_resource(req)
                        .await
                        .map(|contents| json!({ "contents": contents })),
                ),
                Err(e) => Err(e),
            },
            "tools/list" => match parse_params::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => to_json(self.server.handle_list_tools(req).await),
                Err(e) => Err(e),
            },
            "tools/call" => match parse_params::<CallToolRequestParam>(params) {
                Ok(req) => to_json(self.server.handle_call_tool(req).await),
                Err(e) => Err(e),
            },
            _ => Err(ConnectorError::MethodNotFound.to_jsonrpc_error()),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::instagram::InstagramConnector;
    use crate::insights::InsightsSnapshot;

    fn handler() -> JsonRpcHandler {
        let snapshot = InsightsSnapshot::new(
            json!({ "impressions_metric_count": 321 }),
            vec![json!({ "reach_count": 10 }), json!({ "reach_count": 5 })],
        );
        let mut registry = ProviderRegistry::new();
        registry.register_provider(Arc::new(InstagramConnector::new(Arc::new(snapshot))));
        JsonRpcHandler::new(McpServer::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn lists_prefixed_tools() {
        let response = handler()
            .handle_request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await
            .unwrap();
        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "instagram/get_insights_account",
                "instagram/get_insights_media_feed_all"
            ]
        );
    }

    #[tokio::test]
    async fn calls_tool_by_prefixed_and_bare_name() {
        let h = handler();
        for name in ["instagram/get_insights_account", "get_insights_account"] {
            let response = h
                .handle_request(json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "method": "tools/call",
                    "params": { "name": name, "arguments": {} }
                }))
                .await
                .unwrap();
            assert_eq!(
                response["result"]["content"][0]["text"],
                r#"{"impressions_metric_count":321}"#
            );
            assert_eq!(response["id"], 2);
        }
    }

    #[tokio::test]
    async fn media_tool_joins_posts() {
        let response = handler()
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": "m",
                "method": "tools/call",
                "params": { "name": "get_insights_media_feed_all" }
            }))
            .await
            .unwrap();
        assert_eq!(
            response["result"]["content"][0]["text"],
            "{\"reach_count\":10}\n---\n{\"reach_count\":5}"
        );
    }

    #[tokio::test]
    async fn unknown_method_and_tool_errors() {
        let h = handler();
        let response = h
            .handle_request(json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);

        let response = h
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": "get_user_medias" }
            }))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = handler()
            .handle_request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialize_reports_tools_capability() {
        let response = handler()
            .handle_request(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": { "name": "test-host", "version": "1.0" }
                }
            }))
            .await
            .unwrap();
        assert_eq!(response["result"]["serverInfo"]["name"], "instagram");
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }
}
