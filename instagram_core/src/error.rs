// src/error.rs
use serde_json::json;

/// Errors raised while exposing insights over MCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidInput(_) => "invalid_input",
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::ResourceNotFound => "not_found",
            ConnectorError::ToolNotFound => "tool_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::ParseError => "parse_error",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ResourceNotFound => (-32602, "Resource not found".to_string()),
            ConnectorError::ToolNotFound => (-32602, "Tool not found".to_string()),
            ConnectorError::InternalError(msg) => (-32603, msg.to_string()),
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::InvalidInput(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::ParseError => (-32700, "Parse error".to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
            "data": { "kind": self.code_str() },
        })
    }
}

/// Missing or malformed environment configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required but was not set")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Failure of a single call against the platform.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("unexpected status {status} from {endpoint}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("unexpected response shape from {endpoint}: missing '{field}'")]
    UnexpectedResponse {
        endpoint: String,
        field: &'static str,
    },

    #[error("session file error: {0}")]
    Session(String),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The only errors that leave the session authenticator.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("login failed after {attempts} attempt(s): {last_cause}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_cause: ClientError,
    },
}
