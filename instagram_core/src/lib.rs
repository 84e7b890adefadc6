// src/lib.rs
pub mod auth;
pub mod client;
pub mod config;
pub mod connectors;
pub mod error;
pub mod insights;
pub mod mcp_server;
pub mod transport;
use std::sync::Arc;

// Re-export types from rmcp that users of the library need
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
    ProtocolVersion, RawResource, ReadResourceRequestParam, Resource, ResourceContents,
    ServerCapabilities, Tool,
};

pub use crate::error::ConnectorError;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique name of the connector, used as the tool prefix.
    fn name(&self) -> &'static str;

    /// Returns a description of the connector.
    fn description(&self) -> &'static str;

    /// Returns the MCP capabilities of this connector.
    async fn capabilities(&self) -> ServerCapabilities;

    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError>;
    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError>;
    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError>;
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;
}

/// Connectors keyed by name. Connectors are read-only once registered.
pub struct ProviderRegistry {
    pub providers: BTreeMap<String, Arc<dyn Connector>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: BTreeMap::new(),
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Connector>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<&Arc<dyn Connector>> {
        self.providers.get(name)
    }

    pub fn list_providers(&self) -> Vec<ServerInfo> {
        self.providers
            .iter()
            .map(|(name, connector)| ServerInfo {
                name: name.clone(),
                description: connector.description().to_string(),
            })
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub description: String,
}
