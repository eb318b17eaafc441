use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;

use crate::auth::TokenManager;
use crate::error::MailgraphError;

/// Authorized dispatcher for Graph REST calls.
///
/// Obtains a bearer token from the lifecycle manager per request (free when
/// already authenticated), issues exactly one HTTP call, and reshapes the
/// Graph error envelope on non-2xx. No retries, no pagination.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

/// Graph's standard error envelope.
#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    code: String,
    message: String,
}

impl GraphClient {
    pub fn new(base_url: &str, tokens: Arc<TokenManager>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// GET `path` with query pairs, expecting a JSON body.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, MailgraphError> {
        self.execute(Method::GET, path, query, None).await
    }

    /// POST a JSON body. Graph answers some writes (sendMail) with an empty
    /// 202, which maps to `null`.
    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, MailgraphError> {
        self.execute(Method::POST, path, &[], Some(body)).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, MailgraphError> {
        self.execute(Method::PATCH, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<serde_json::Value, MailgraphError> {
        self.execute(Method::DELETE, path, &[], None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, MailgraphError> {
        let token = self.tokens.get_access_token().await?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MailgraphError::Network("Graph request timed out".into())
            } else if e.is_connect() {
                MailgraphError::Network("could not connect to Graph".into())
            } else {
                MailgraphError::Network("Graph request failed".into())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(parse_graph_error(status.as_u16(), &text));
        }

        // 202/204 responses have no body.
        let text = resp.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| MailgraphError::Protocol(format!("unparsable Graph response: {e}")))
    }
}

fn parse_graph_error(status: u16, body: &str) -> MailgraphError {
    match serde_json::from_str::<GraphErrorEnvelope>(body) {
        Ok(envelope) => MailgraphError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => MailgraphError::Api {
            status,
            code: "UnknownError".into(),
            message: format!("Graph returned status {status}"),
        },
    }
}
