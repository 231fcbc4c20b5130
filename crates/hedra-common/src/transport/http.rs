//! HTTP Channel
//!
//! A [`Channel`] implementation that issues every unary call as an HTTP/1.1
//! POST to `http://<authority>/<service>/<method>`.
//!
//! # Status Mapping
//!
//! | HTTP status         | fault                                  |
//! |---------------------|----------------------------------------|
//! | 2xx                 | body returned as the response bytes    |
//! | 401                 | [`TransportFault::Unauthenticated`]    |
//! | 429                 | [`TransportFault::ResourceExhausted`]  |
//! | 503                 | [`TransportFault::Unavailable`]        |
//! | 500                 | [`TransportFault::Internal`] with body |
//! | connection failure  | [`TransportFault::Unavailable`]        |
//! | timeout             | [`TransportFault::DeadlineExceeded`]   |
//! | anything else       | [`TransportFault::Other`]              |

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::transport::channel::{Channel, ServiceKind, TransportFault};

pub struct HttpChannel {
    authority: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpChannel {
    /// Creates a channel for `authority` (`host:port`).
    ///
    /// No connection is made until the first call.
    pub fn new(authority: impl Into<String>, timeout: Duration) -> Self {
        Self {
            authority: authority.into(),
            timeout,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn url(&self, service: ServiceKind, method: &str) -> String {
        format!("http://{}/{}/{}", self.authority, service.path(), method)
    }

    fn fault_for_status(status: StatusCode, body: &[u8]) -> TransportFault {
        let message = String::from_utf8_lossy(body).into_owned();
        match status {
            StatusCode::UNAUTHORIZED => TransportFault::Unauthenticated,
            StatusCode::TOO_MANY_REQUESTS => TransportFault::ResourceExhausted,
            StatusCode::SERVICE_UNAVAILABLE => TransportFault::Unavailable,
            StatusCode::INTERNAL_SERVER_ERROR => TransportFault::Internal(message),
            other => TransportFault::Other(format!("HTTP {}: {}", other, message)),
        }
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn call(
        &self,
        service: ServiceKind,
        method: &str,
        request: Bytes,
    ) -> std::result::Result<Bytes, TransportFault> {
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.url(service, method))
            .header("Content-Type", "application/octet-stream")
            .body(Full::new(request))
            .map_err(|e| TransportFault::Other(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(http_request))
            .await
            .map_err(|_| TransportFault::DeadlineExceeded)?
            .map_err(|e| {
                if e.is_connect() {
                    TransportFault::Unavailable
                } else {
                    TransportFault::Other(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = tokio::time::timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| TransportFault::DeadlineExceeded)?
            .map_err(|e| TransportFault::Other(format!("Failed to read response: {}", e)))?
            .to_bytes();

        if status.is_success() {
            Ok(body)
        } else {
            tracing::debug!(authority = %self.authority, %status, "node answered with HTTP error");
            Err(Self::fault_for_status(status, &body))
        }
    }
}

impl std::fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish()
    }
}
