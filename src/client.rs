//! Remote cache client: one bounded connection, one `get`.
//!
//! This is the only place where a remote status turns into
//! [`FetchError::NotFound`]; every other status becomes a
//! [`TransportFailure`] carrying the original code and message.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{Endpoint, Protocol};
use crate::error::{FailureCode, FetchError, RemoteStatus, StatusCode, TransportFailure};
use crate::models::AccessCredential;
use crate::traits::{KvConnection, KvTransport, ObjectStream};
use crate::transport_grpc::GrpcTransport;
use crate::transport_http::HttpTransport;

/// Dial timeout used when nothing else is configured.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction values for a [`RemoteCacheClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound on connection establishment. Always enforced.
    pub dial_timeout: Duration,
    /// Sent to the remote so it can attribute traffic.
    pub client_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            client_name: "kv".to_string(),
        }
    }
}

/// Built-in transport that picks gRPC or HTTP from the endpoint scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkTransport;

#[async_trait]
impl KvTransport for NetworkTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ClientOptions,
    ) -> Result<Box<dyn KvConnection>, RemoteStatus> {
        match endpoint.protocol {
            Protocol::Grpc => GrpcTransport.connect(endpoint, options).await,
            Protocol::Http => HttpTransport.connect(endpoint, options).await,
        }
    }
}

/// Fetches objects from a remote key-value store.
pub struct RemoteCacheClient<T = NetworkTransport> {
    transport: T,
    options: ClientOptions,
}

impl RemoteCacheClient<NetworkTransport> {
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(NetworkTransport, options)
    }
}

impl<T: KvTransport> RemoteCacheClient<T> {
    pub fn with_transport(transport: T, options: ClientOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Opens a connection to `endpoint` and requests `key`.
    ///
    /// The connection is dropped before this returns; on success the
    /// stream holds the only remaining handle to the channel.
    pub async fn get(
        &self,
        endpoint: &Endpoint,
        key: &str,
        credential: &AccessCredential,
    ) -> Result<ObjectStream, FetchError> {
        if credential.is_empty() {
            return Err(TransportFailure::new(
                FailureCode::Unauthenticated,
                "no access credential supplied",
            )
            .into());
        }

        let dial = self.transport.connect(endpoint, &self.options);
        let mut connection = match tokio::time::timeout(self.options.dial_timeout, dial).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(status)) => return Err(classify(status, key)),
            Err(_) => {
                return Err(TransportFailure::new(
                    FailureCode::DeadlineExceeded,
                    format!(
                        "dial {} timed out after {:?}",
                        endpoint, self.options.dial_timeout
                    ),
                )
                .into())
            }
        };

        debug!(op = "kv.get", endpoint = %endpoint, key = %key, "requesting object");
        connection
            .get(key, credential)
            .await
            .map_err(|status| classify(status, key))
    }
}

/// Maps a remote status to a fetch error. Only `NotFound` becomes
/// [`FetchError::NotFound`].
pub fn classify(status: RemoteStatus, key: &str) -> FetchError {
    let code = match status.code {
        StatusCode::NotFound => {
            return FetchError::NotFound {
                key: key.to_string(),
            }
        }
        StatusCode::Unauthenticated => FailureCode::Unauthenticated,
        StatusCode::PermissionDenied => FailureCode::PermissionDenied,
        StatusCode::Unavailable => FailureCode::Unavailable,
        StatusCode::DeadlineExceeded => FailureCode::DeadlineExceeded,
        StatusCode::ResourceExhausted => FailureCode::ResourceExhausted,
        StatusCode::InvalidArgument => FailureCode::InvalidArgument,
        StatusCode::Cancelled => FailureCode::Cancelled,
        StatusCode::Internal => FailureCode::Internal,
        StatusCode::Unknown => FailureCode::Unknown,
    };
    FetchError::Transport(TransportFailure::new(code, status.message))
}

/// Classifies an I/O error raised while streaming an object.
///
/// Errors that carry a [`RemoteStatus`] are classified like any other
/// status; plain I/O errors are local write or read failures.
pub fn classify_io(err: io::Error, key: &str) -> FetchError {
    if let Some(status) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<RemoteStatus>())
    {
        return classify(status.clone(), key);
    }
    FetchError::Transport(TransportFailure::new(FailureCode::LocalIo, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    struct ScriptedTransport {
        connects: Arc<AtomicUsize>,
        connect_delay: Option<Duration>,
        get_result: Result<&'static [u8], RemoteStatus>,
    }

    struct ScriptedConnection {
        get_result: Result<&'static [u8], RemoteStatus>,
    }

    #[async_trait]
    impl KvTransport for ScriptedTransport {
        async fn connect(
            &self,
            _endpoint: &Endpoint,
            _options: &ClientOptions,
        ) -> Result<Box<dyn KvConnection>, RemoteStatus> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.connect_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Box::new(ScriptedConnection {
                get_result: self.get_result.clone(),
            }))
        }
    }

    #[async_trait]
    impl KvConnection for ScriptedConnection {
        async fn get(
            &mut self,
            _key: &str,
            _credential: &AccessCredential,
        ) -> Result<ObjectStream, RemoteStatus> {
            match &self.get_result {
                Ok(bytes) => Ok(Box::pin(*bytes)),
                Err(status) => Err(status.clone()),
            }
        }
    }

    fn transport(get_result: Result<&'static [u8], RemoteStatus>) -> ScriptedTransport {
        ScriptedTransport {
            connects: Arc::new(AtomicUsize::new(0)),
            connect_delay: None,
            get_result,
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("grpc://127.0.0.1:9092").unwrap()
    }

    fn token() -> AccessCredential {
        AccessCredential::new("token")
    }

    #[test]
    fn test_classify_not_found_only() {
        assert_eq!(
            classify(RemoteStatus::new(StatusCode::NotFound, "missing"), "k"),
            FetchError::NotFound {
                key: "k".to_string()
            }
        );
        for code in [
            StatusCode::Unavailable,
            StatusCode::PermissionDenied,
            StatusCode::Unauthenticated,
            StatusCode::DeadlineExceeded,
            StatusCode::ResourceExhausted,
            StatusCode::Internal,
            StatusCode::Unknown,
        ] {
            let err = classify(RemoteStatus::new(code, "boom"), "k");
            match err {
                FetchError::Transport(failure) => assert_eq!(failure.message, "boom"),
                other => panic!("{:?} classified as {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_classify_io_plain_error_is_local() {
        let err = classify_io(io::Error::new(io::ErrorKind::NotFound, "disk gone"), "k");
        assert!(matches!(
            err,
            FetchError::Transport(TransportFailure {
                code: FailureCode::LocalIo,
                ..
            })
        ));
    }

    #[test]
    fn test_classify_io_wrapped_status() {
        let err = classify_io(
            RemoteStatus::new(StatusCode::NotFound, "no such key").into_io(),
            "k",
        );
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_streams_object() {
        let client = RemoteCacheClient::with_transport(transport(Ok(b"ABCDEF")), ClientOptions::default());
        let mut stream = client.get(&endpoint(), "key", &token()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"ABCDEF");
    }

    #[tokio::test]
    async fn test_get_unavailable_is_transport_failure() {
        let client = RemoteCacheClient::with_transport(
            transport(Err(RemoteStatus::new(StatusCode::Unavailable, "down"))),
            ClientOptions::default(),
        );
        let err = client.get(&endpoint(), "key", &token()).await.err().unwrap();
        assert!(matches!(
            err,
            FetchError::Transport(TransportFailure {
                code: FailureCode::Unavailable,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_never_dials() {
        let t = transport(Ok(b""));
        let connects = t.connects.clone();
        let client = RemoteCacheClient::with_transport(t, ClientOptions::default());
        let err = client
            .get(&endpoint(), "key", &AccessCredential::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            FetchError::Transport(TransportFailure {
                code: FailureCode::Unauthenticated,
                ..
            })
        ));
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dial_timeout_enforced() {
        let mut t = transport(Ok(b""));
        t.connect_delay = Some(Duration::from_secs(30));
        let client = RemoteCacheClient::with_transport(
            t,
            ClientOptions {
                dial_timeout: Duration::from_millis(50),
                ..ClientOptions::default()
            },
        );
        let err = client.get(&endpoint(), "key", &token()).await.err().unwrap();
        assert!(matches!(
            err,
            FetchError::Transport(TransportFailure {
                code: FailureCode::DeadlineExceeded,
                ..
            })
        ));
    }
}
