use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::MailgraphError;

/// Parameters delivered to the loopback redirect by the browser.
#[derive(Debug)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// Listen on the loopback redirect port for a single authorization callback.
pub async fn listen_for_callback(
    port: u16,
    timeout: Duration,
) -> Result<CallbackParams, MailgraphError> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;

    let accept_future = async {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let parsed = parse_callback_request(&request);

        let body = match &parsed {
            Ok(_) => {
                "<!DOCTYPE html><html><body><h1>Sign-in complete</h1>\
                 <p>You can close this window and return to the terminal.</p></body></html>"
            }
            Err(_) => {
                "<!DOCTYPE html><html><body><h1>Sign-in failed</h1>\
                 <p>Authorization was not granted. Check the terminal for details.</p></body></html>"
            }
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.shutdown().await?;

        parsed
    };

    tokio::time::timeout(timeout, accept_future)
        .await
        .map_err(|_| {
            MailgraphError::TemporaryAuthFailure(format!(
                "timed out waiting for the authorization callback after {}s",
                timeout.as_secs()
            ))
        })?
}

fn parse_callback_request(request: &str) -> Result<CallbackParams, MailgraphError> {
    let first_line = request.lines().next().unwrap_or_default();
    let path = first_line.split_whitespace().nth(1).unwrap_or_default();
    let query = path.split('?').nth(1).unwrap_or_default();

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for param in query.split('&') {
        if let Some(value) = param.strip_prefix("code=") {
            let decoded = urldecode(value);
            if !decoded.is_empty() {
                code = Some(decoded);
            }
        } else if let Some(value) = param.strip_prefix("state=") {
            state = Some(urldecode(value));
        } else if let Some(value) = param.strip_prefix("error=") {
            error = Some(urldecode(value));
        }
    }

    if let Some(error) = error {
        return Err(MailgraphError::InvalidGrant(error));
    }
    match code {
        Some(code) => Ok(CallbackParams { code, state }),
        None => Err(MailgraphError::Protocol(
            "no authorization code in callback request".into(),
        )),
    }
}

fn urldecode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.bytes();
    while let Some(b) = chars.next() {
        if b == b'%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(h), Some(l)) = (hi, lo) {
                let hex = [h, l];
                if let Ok(s) = std::str::from_utf8(&hex) {
                    if let Ok(val) = u8::from_str_radix(s, 16) {
                        result.push(val as char);
                        continue;
                    }
                }
            }
            result.push('%');
        } else if b == b'+' {
            result.push(' ');
        } else {
            result.push(b as char);
        }
    }
    result
}
