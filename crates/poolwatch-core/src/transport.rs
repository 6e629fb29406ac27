//! Minimal JSON-over-HTTP/1.1 client.
//!
//! One connection per call, no pooling and no retries. Every call runs
//! under a hard timeout; when it fires the exchange is abandoned and the
//! caller decides what to do (both the reporter and the dispatcher simply
//! report the failure).

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid uri {0}: only http:// with a host is supported")]
    InvalidUri(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("http exchange with {addr} failed: {reason}")]
    Exchange { addr: String, reason: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpReply {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> TransportResult<T> {
        serde_json::from_slice(&self.body).map_err(TransportError::Decode)
    }
}

/// POST `body` as JSON to `uri`, giving up after `timeout`.
pub async fn post_json<T>(uri: &Uri, body: &T, timeout: Duration) -> TransportResult<HttpReply>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(body).map_err(TransportError::Encode)?;
    let addr = socket_addr(uri)?;

    match tokio::time::timeout(timeout, exchange(uri, &addr, payload)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%uri, ?timeout, "http exchange timed out");
            Err(TransportError::Timeout(timeout))
        }
    }
}

async fn exchange(uri: &Uri, addr: &str, payload: Vec<u8>) -> TransportResult<HttpReply> {
    let exchange_err = |e: &dyn std::fmt::Display| TransportError::Exchange {
        addr: addr.to_string(),
        reason: e.to_string(),
    };

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| exchange_err(&e))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    let req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(HOST, addr)
        .header(CONTENT_TYPE, "application/json")
        .header(USER_AGENT, "poolwatch/0.1")
        .body(Full::new(Bytes::from(payload)))
        .map_err(|e| exchange_err(&e))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| exchange_err(&e))?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| exchange_err(&e))?
        .to_bytes();

    Ok(HttpReply { status, body })
}

/// `host:port` for an `http://` URI, defaulting the port to 80.
fn socket_addr(uri: &Uri) -> TransportResult<String> {
    if uri.scheme_str() != Some("http") {
        return Err(TransportError::InvalidUri(uri.to_string()));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| TransportError::InvalidUri(uri.to_string()))?;
    Ok(format!(
        "{}:{}",
        authority.host(),
        authority.port_u16().unwrap_or(80)
    ))
}
