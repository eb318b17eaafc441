use chrono::Utc;
use serde::Deserialize;

use crate::auth::record::AuthorizationResult;
use crate::config::Config;
use crate::error::MailgraphError;

/// Drives the two supported OAuth2 grants against the identity provider:
/// the interactive authorization-code exchange and the silent refresh.
///
/// Every failure is classified here, at the provider boundary. Raw transport
/// errors and credential values never leave this module.
pub struct TokenAcquirer {
    http: reqwest::Client,
    authority: String,
    client_id: String,
    client_secret: String,
}

/// Raw token response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Error body the provider returns on a rejected token request.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenAcquirer {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority: config.authority.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.authority)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/token", self.authority)
    }

    /// Construct the interactive consent URL. Pure function of configuration
    /// and inputs; no network call.
    pub fn build_authorization_url(
        &self,
        scopes: &[&str],
        redirect_uri: &str,
        code_challenge: &str,
        state: &str,
    ) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&response_mode=query&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.authorize_endpoint(),
            urlencoded(&self.client_id),
            urlencoded(redirect_uri),
            urlencoded(&scopes.join(" ")),
            urlencoded(state),
            urlencoded(code_challenge),
        )
    }

    /// Authorization-code grant: one-time code from the redirect, plus the
    /// PKCE verifier for the attempt that produced it.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        scopes: &[&str],
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthorizationResult, MailgraphError> {
        let scope = scopes.join(" ");
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        self.request_token(&form).await
    }

    /// Refresh-token grant. An `InvalidGrant` result means the refresh token
    /// itself is revoked or expired and interactive authorization must be
    /// redone.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &[&str],
    ) -> Result<AuthorizationResult, MailgraphError> {
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&form).await
    }

    /// Single round-trip to the token endpoint; no internal retry. Retry
    /// policy belongs to the caller.
    async fn request_token(
        &self,
        form: &[(&str, &str)],
    ) -> Result<AuthorizationResult, MailgraphError> {
        let resp = self
            .http
            .post(self.token_endpoint())
            .form(form)
            .send()
            .await
            .map_err(|e| MailgraphError::Network(describe_transport_error(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_provider_error(status.as_u16(), &body));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|_| MailgraphError::Provider {
                status: status.as_u16(),
                detail: "unparsable token response".into(),
            })?;

        Ok(AuthorizationResult {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_on: Utc::now() + chrono::Duration::seconds(token.expires_in.unwrap_or(3600)),
        })
    }
}

/// Short, token-free description of a transport failure.
fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request to identity provider timed out".into()
    } else if e.is_connect() {
        "could not connect to identity provider".into()
    } else {
        "request to identity provider failed".into()
    }
}

/// Map a non-2xx token response into the error taxonomy. Provider-supplied
/// error code and description are preserved; anything unrecognized is
/// summarized rather than echoed.
fn classify_provider_error(status: u16, body: &str) -> MailgraphError {
    let parsed: Option<ProviderErrorBody> = serde_json::from_str(body).ok();
    match parsed {
        Some(err) => {
            let code = err.error.unwrap_or_else(|| "unknown_error".into());
            let detail = match err.error_description {
                Some(desc) => format!("{code}: {desc}"),
                None => code.clone(),
            };
            if code == "invalid_grant" {
                MailgraphError::InvalidGrant(detail)
            } else {
                MailgraphError::Provider { status, detail }
            }
        }
        None => MailgraphError::Provider {
            status,
            detail: "unrecognized error response".into(),
        },
    }
}

fn urlencoded(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            _ => {
                result.push('%');
                result.push_str(&format!("{b:02X}"));
            }
        }
    }
    result
}
