//! HTTP transport: `GET <endpoint>/<key>` with bearer authentication.
//!
//! Suits plain HTTP cache servers and gateways in front of a key-value
//! store. The response body is streamed, never buffered whole.
//!
//! | HTTP status | Mapped code |
//! |-------------|-------------|
//! | 2xx | success |
//! | 404 | `NotFound` |
//! | 401 | `Unauthenticated` |
//! | 403 | `PermissionDenied` |
//! | 408, 504 | `DeadlineExceeded` |
//! | 429 | `ResourceExhausted` |
//! | 502, 503 | `Unavailable` |
//! | other 5xx | `Internal` |
//! | anything else | `Unknown` |

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::client::ClientOptions;
use crate::endpoint::Endpoint;
use crate::error::{RemoteStatus, StatusCode};
use crate::models::AccessCredential;
use crate::traits::{KvConnection, KvTransport, ObjectStream};

/// Dials HTTP endpoints (`http://` and `https://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

#[async_trait]
impl KvTransport for HttpTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ClientOptions,
    ) -> Result<Box<dyn KvConnection>, RemoteStatus> {
        let base = Url::parse(&endpoint.origin())
            .map_err(|e| RemoteStatus::new(StatusCode::InvalidArgument, e.to_string()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(options.dial_timeout)
            .user_agent(format!("{}/{}", options.client_name, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteStatus::new(StatusCode::Internal, e.to_string()))?;

        Ok(Box::new(HttpConnection { client, base }))
    }
}

struct HttpConnection {
    client: reqwest::Client,
    base: Url,
}

impl HttpConnection {
    fn object_url(&self, key: &str) -> Result<Url, RemoteStatus> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteStatus::new(StatusCode::InvalidArgument, "endpoint cannot carry a path"))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl KvConnection for HttpConnection {
    async fn get(
        &mut self,
        key: &str,
        credential: &AccessCredential,
    ) -> Result<ObjectStream, RemoteStatus> {
        let url = self.object_url(key)?;
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(op = "kv.http.get", url = %url, request_id = %request_id, "sending GET");

        let resp = self
            .client
            .get(url)
            .bearer_auth(credential.expose())
            .header("x-request-id", &request_id)
            .send()
            .await
            .map_err(status_from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteStatus::new(
                status_code_for(status.as_u16()),
                format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                ),
            ));
        }

        let chunks = resp
            .bytes_stream()
            .map_err(|e| status_from_reqwest(e).into_io());
        Ok(Box::pin(StreamReader::new(chunks)))
    }
}

fn status_code_for(http_status: u16) -> StatusCode {
    match http_status {
        404 => StatusCode::NotFound,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        408 | 504 => StatusCode::DeadlineExceeded,
        429 => StatusCode::ResourceExhausted,
        502 | 503 => StatusCode::Unavailable,
        500..=599 => StatusCode::Internal,
        _ => StatusCode::Unknown,
    }
}

fn status_from_reqwest(err: reqwest::Error) -> RemoteStatus {
    let code = if err.is_timeout() {
        StatusCode::DeadlineExceeded
    } else if err.is_connect() {
        StatusCode::Unavailable
    } else {
        StatusCode::Unknown
    };
    RemoteStatus::new(code, err.to_string())
}
