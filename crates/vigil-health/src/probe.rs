//! A single HTTP GET against a peer's health endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use http_body_util::BodyExt;
use thiserror::Error;
use tracing::debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What came back from one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Why a probe attempt produced no response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading body failed: {0}")]
    Body(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Transport used by the poller; swapped out in tests.
pub trait HealthProbe: Send + Sync {
    fn get<'a>(
        &'a self,
        address: &'a str,
        path: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ProbeError>>;
}

/// Plain HTTP/1 probe over a fresh TCP connection per attempt.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe;

impl HealthProbe for HttpProbe {
    fn get<'a>(
        &'a self,
        address: &'a str,
        path: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ProbeError>> {
        Box::pin(http_get(address, path, timeout))
    }
}

/// `GET http://{address}{path}`, giving up after `timeout` overall.
pub async fn http_get(
    address: &str,
    path: &str,
    timeout: Duration,
) -> Result<ProbeResponse, ProbeError> {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "vigil-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::Body(e.to_string()))?
            .to_bytes();

        Ok::<_, ProbeError>(ProbeResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    })
    .await;

    match result {
        Ok(outcome) => {
            if let Err(e) = &outcome {
                debug!(error = %e, %uri, "health probe failed");
            }
            outcome
        }
        Err(_) => {
            debug!(%uri, "health probe timed out");
            Err(ProbeError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_to_closed_port_fails() {
        let result = http_get("127.0.0.1:1", "/health", Duration::from_millis(500)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn probe_reads_body_from_live_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, crate::server::health_router()).await.unwrap();
        });

        let resp = HttpProbe
            .get(&addr.to_string(), "/health", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "ok");
    }

    #[tokio::test]
    async fn probe_reports_non_2xx_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, crate::server::health_router()).await.unwrap();
        });

        let resp = http_get(&addr.to_string(), "/nope", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
    }
}
