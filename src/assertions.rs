// Assertion helpers for checks run against containers.
// Failures are plain `anyhow` errors; a `Mismatch` anywhere in the chain
// carries actual/expected values into the debug report.

use crate::errors::{HarnessError, Result as HarnessResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Longest body excerpt kept in a mismatch report
const MAX_BODY_EXCERPT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected '{expected}', got '{actual}'")]
pub struct Mismatch {
    pub actual: String,
    pub expected: String,
}

impl Mismatch {
    pub fn new(actual: impl Display, expected: impl Display) -> Self {
        Self {
            actual: actual.to_string(),
            expected: expected.to_string(),
        }
    }
}

pub fn expect_eq<T>(actual: T, expected: T) -> Result<(), Mismatch>
where
    T: PartialEq + Display,
{
    if actual == expected {
        Ok(())
    } else {
        Err(Mismatch::new(actual, expected))
    }
}

pub fn expect_contains(haystack: &str, needle: &str) -> Result<(), Mismatch> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(Mismatch::new(
            excerpt(haystack),
            format!("text containing '{}'", needle),
        ))
    }
}

pub fn expect_not_contains(haystack: &str, needle: &str) -> Result<(), Mismatch> {
    if haystack.contains(needle) {
        Err(Mismatch::new(
            excerpt(haystack),
            format!("text without '{}'", needle),
        ))
    } else {
        Ok(())
    }
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Trailing newlines are dropped; interior line breaks become spaces
pub fn normalize_newlines(text: &str) -> String {
    text.trim_end_matches(['\r', '\n'])
        .replace("\r\n", " ")
        .replace('\n', " ")
}

/// Client for polling applications. Every request is bounded by `timeout`,
/// so a socket that is accepted but never answered fails the attempt.
pub fn http_client(timeout: Duration) -> HarnessResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| HarnessError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Expected HTTP response from a running application
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpExpectation {
    pub path: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
}

impl Default for HttpExpectation {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            status: 200,
            body_contains: None,
        }
    }
}

impl HttpExpectation {
    pub fn url(&self, host_port: u16) -> String {
        let path = self.path.trim();
        if path.starts_with('/') {
            format!("http://localhost:{}{}", host_port, path)
        } else {
            format!("http://localhost:{}/{}", host_port, path)
        }
    }

    /// Issue the request and compare status and body
    pub async fn check(&self, client: &reqwest::Client, host_port: u16) -> anyhow::Result<()> {
        let url = self.url(host_port);
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        expect_eq(response.status().as_u16(), self.status)
            .with_context(|| format!("unexpected status from {}", url))?;

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {}", url))?;

        if let Some(needle) = &self.body_contains {
            expect_contains(&body, needle)
                .with_context(|| format!("unexpected body from {}", url))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::ports::next_free_port;
    use crate::orchestrator::{classify, Failure};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response, returning the port
    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        port
    }

    #[test]
    fn test_expect_eq() {
        assert!(expect_eq(222, 222).is_ok());
        let err = expect_eq("Python 3.6.8", "Python 3.7.3").unwrap_err();
        assert_eq!(err.actual, "Python 3.6.8");
        assert_eq!(err.expected, "Python 3.7.3");
    }

    #[test]
    fn test_expect_contains() {
        assert!(expect_contains("Hello World!", "World").is_ok());
        let err = expect_contains("Hello", "World").unwrap_err();
        assert_eq!(err.expected, "text containing 'World'");
    }

    #[test]
    fn test_expect_not_contains() {
        assert!(expect_not_contains("Version: 0.2, Commit: abc", "unspecified").is_ok());
        assert!(expect_not_contains("Commit: unspecified", "unspecified").is_err());
    }

    #[test]
    fn test_excerpt_truncates_long_text() {
        let long = "a".repeat(2000);
        let err = expect_contains(&long, "b").unwrap_err();
        assert_eq!(err.actual.len(), MAX_BODY_EXCERPT + 3);
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("Python 3.7.3\n"), "Python 3.7.3");
        assert_eq!(normalize_newlines("a\r\nb\n"), "a b");
    }

    #[test]
    fn test_url() {
        let mut expectation = HttpExpectation::default();
        assert_eq!(expectation.url(32774), "http://localhost:32774/");
        expectation.path = "api/health".to_string();
        assert_eq!(expectation.url(8080), "http://localhost:8080/api/health");
    }

    #[tokio::test]
    async fn test_check_passes() {
        let port = serve_once("200 OK", "Hello World!").await;
        let expectation = HttpExpectation {
            body_contains: Some("Hello World!".to_string()),
            ..Default::default()
        };
        expectation
            .check(&reqwest::Client::new(), port)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_check_status_mismatch_is_fatal() {
        let port = serve_once("500 Internal Server Error", "boom").await;
        let err = HttpExpectation::default()
            .check(&reqwest::Client::new(), port)
            .await
            .unwrap_err();

        let mismatch = err.downcast_ref::<Mismatch>().unwrap();
        assert_eq!(mismatch.actual, "500");
        assert_eq!(mismatch.expected, "200");
        assert_eq!(classify(&err), Failure::Fatal);
    }

    #[tokio::test]
    async fn test_check_body_mismatch() {
        let port = serve_once("200 OK", "Welcome").await;
        let expectation = HttpExpectation {
            body_contains: Some("Hello World!".to_string()),
            ..Default::default()
        };
        let err = expectation
            .check(&reqwest::Client::new(), port)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Mismatch>().unwrap().actual, "Welcome");
    }

    #[tokio::test]
    async fn test_closed_without_response_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        });

        let err = HttpExpectation::default()
            .check(&reqwest::Client::new(), port)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<Mismatch>().is_none());
        assert_eq!(classify(&err), Failure::Transient);
    }

    #[tokio::test]
    async fn test_silent_server_times_out_as_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (held_tx, held_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = held_rx.await;
            drop(socket);
        });

        let client = http_client(Duration::from_millis(200)).unwrap();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            HttpExpectation::default().check(&client, port),
        )
        .await
        .expect("request timeout did not fire")
        .unwrap_err();
        let _ = held_tx.send(());

        assert_eq!(classify(&err), Failure::Transient);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let port = next_free_port().unwrap();
        let err = HttpExpectation::default()
            .check(&reqwest::Client::new(), port)
            .await
            .unwrap_err();
        assert_eq!(classify(&err), Failure::Transient);
    }
}
