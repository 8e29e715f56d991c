//! Request plumbing shared by the external-service clients.

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Error, Result, Service};

/// Build the HTTP client shared by every external-service client.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
}

/// Send a request and classify transport failures and non-success statuses.
pub(crate) async fn send(service: Service, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| Error::transport(service, e))?;
    check_response(service, resp).await
}

/// Send a request and decode a JSON body.
pub(crate) async fn send_json<R: DeserializeOwned>(
    service: Service,
    req: reqwest::RequestBuilder,
) -> Result<R> {
    let resp = send(service, req).await?;
    let body = resp
        .bytes()
        .await
        .map_err(|e| Error::transport(service, e))?;
    serde_json::from_slice(&body).map_err(|e| Error::Decode {
        service,
        message: e.to_string(),
    })
}

/// Turn a response into an error unless its status is a success.
async fn check_response(service: Service, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("{service} returned {status}");
    Err(Error::from_status(service, status, truncate_body(body)))
}

/// Keep upstream error bodies short enough for a log line.
fn truncate_body(mut body: String) -> String {
    const MAX_BODY: usize = 500;
    if body.len() > MAX_BODY {
        let mut end = MAX_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short_unchanged() {
        assert_eq!(truncate_body("oops".into()), "oops");
    }

    #[test]
    fn test_truncate_body_unicode_safe() {
        let body = "é".repeat(400);
        let out = truncate_body(body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 503);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://x/", "/v1/embeddings"), "http://x/v1/embeddings");
        assert_eq!(join_url("http://x", "api/chat"), "http://x/api/chat");
    }
}
