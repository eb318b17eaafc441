use std::env;
use std::path::PathBuf;

use crate::error::MailgraphError;

/// Graph permission scopes requested on every grant. `offline_access`
/// guarantees the token endpoint issues a refresh token.
pub const GRAPH_SCOPES: &[&str] = &[
    "offline_access",
    "https://graph.microsoft.com/User.Read",
    "https://graph.microsoft.com/Mail.ReadWrite",
    "https://graph.microsoft.com/Mail.Send",
    "https://graph.microsoft.com/Calendars.ReadWrite",
    "https://graph.microsoft.com/Contacts.Read",
];

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3333/auth/callback";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    /// Base URL of the identity provider, without a trailing slash.
    /// Defaults to the Microsoft identity platform endpoint for the tenant.
    pub authority: String,
    /// Base URL of the Graph API, without a trailing slash.
    pub graph_url: String,
    pub redirect_uri: String,
    pub token_cache: PathBuf,
}

impl Config {
    /// Load configuration from the environment. Missing credentials fail
    /// here, at startup, rather than mid-flow on the first tool call.
    pub fn from_env() -> Result<Self, MailgraphError> {
        let client_id = required_var("MAILGRAPH_CLIENT_ID")?;
        let client_secret = required_var("MAILGRAPH_CLIENT_SECRET")?;
        let tenant_id = required_var("MAILGRAPH_TENANT_ID")?;

        let authority = match env::var("MAILGRAPH_AUTHORITY") {
            Ok(v) if !v.is_empty() => v.trim_end_matches('/').to_string(),
            _ => format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0"),
        };
        let graph_url = match env::var("MAILGRAPH_GRAPH_URL") {
            Ok(v) if !v.is_empty() => v.trim_end_matches('/').to_string(),
            _ => DEFAULT_GRAPH_URL.to_string(),
        };
        let redirect_uri = match env::var("MAILGRAPH_REDIRECT_URI") {
            Ok(v) if !v.is_empty() => v,
            _ => DEFAULT_REDIRECT_URI.to_string(),
        };
        let token_cache = match env::var("MAILGRAPH_TOKEN_CACHE") {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => default_token_cache(),
        };

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
            authority,
            graph_url,
            redirect_uri,
            token_cache,
        })
    }

    /// The loopback port the interactive redirect URI points at.
    pub fn redirect_port(&self) -> Result<u16, MailgraphError> {
        let rest = self
            .redirect_uri
            .strip_prefix("http://")
            .or_else(|| self.redirect_uri.strip_prefix("https://"))
            .ok_or_else(|| {
                MailgraphError::Config(format!(
                    "Redirect URI '{}' is not an http(s) URL",
                    self.redirect_uri
                ))
            })?;
        let host_port = rest.split('/').next().unwrap_or(rest);
        match host_port.split_once(':') {
            Some((_, port)) => port.parse().map_err(|_| {
                MailgraphError::Config(format!(
                    "Redirect URI '{}' has an invalid port",
                    self.redirect_uri
                ))
            }),
            None => Ok(80),
        }
    }
}

fn required_var(name: &str) -> Result<String, MailgraphError> {
    match env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(MailgraphError::Config(format!(
            "Environment variable '{name}' is not set"
        ))),
    }
}

fn default_token_cache() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mailgraph")
        .join("tokens.json")
}
