#[derive(Debug, thiserror::Error)]
pub enum MailgraphError {
    #[error("Not signed in. Run: mailgraph auth (or call the 'authenticate' tool)")]
    AuthenticationRequired,

    #[error("Authentication service unavailable: {0}")]
    TemporaryAuthFailure(String),

    #[error("Authorization grant rejected: {0}")]
    InvalidGrant(String),

    #[error("Identity provider returned {status}: {detail}")]
    Provider { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Token cache error: {0}")]
    Persistence(String),

    #[error("Graph API returned {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{}", format_unknown_tool(.name, .suggestion.as_deref()))]
    UnknownTool {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Invalid arguments for '{tool}': {detail}")]
    InvalidArguments { tool: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_unknown_tool(name: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(s) => format!("Unknown tool '{name}'. Did you mean '{s}'?"),
        None => format!("Unknown tool '{name}'."),
    }
}

impl MailgraphError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            MailgraphError::AuthenticationRequired => "auth_required",
            MailgraphError::TemporaryAuthFailure(_) => "auth_unavailable",
            MailgraphError::InvalidGrant(_) => "invalid_grant",
            MailgraphError::Provider { .. } => "provider_error",
            MailgraphError::Network(_) => "network_error",
            MailgraphError::Persistence(_) => "persistence_error",
            MailgraphError::Api { .. } => "api_error",
            MailgraphError::UnknownTool { .. } => "not_found",
            MailgraphError::InvalidArguments { .. } => "invalid_arguments",
            MailgraphError::Config(_) => "config_error",
            MailgraphError::Protocol(_) => "parse_error",
            MailgraphError::IoError(_) => "io_error",
        }
    }

    /// True for failures the caller may retry without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MailgraphError::TemporaryAuthFailure(_) | MailgraphError::Network(_)
        )
    }

    /// Produce a structured JSON error object for tool results.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
