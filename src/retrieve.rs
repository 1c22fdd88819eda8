//! Retrieval orchestration: one request, one round trip, one outcome.
//!
//! Validates the endpoint, creates the destination, streams the remote
//! object into it and reports a [`RetrievalOutcome`]. No retries happen
//! here; a `NotFound` will not change on retry, a transport failure might,
//! and only the caller knows which it wants.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{classify_io, ClientOptions, NetworkTransport, RemoteCacheClient};
use crate::endpoint::Endpoint;
use crate::error::{EndpointError, FailureCode, FetchError, TransportFailure};
use crate::models::{RetrievalOutcome, RetrievalRequest};
use crate::traits::KvTransport;

/// Downloads cached artifacts to local paths.
pub struct Retriever<T = NetworkTransport> {
    client: RemoteCacheClient<T>,
}

impl Retriever<NetworkTransport> {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            client: RemoteCacheClient::new(options),
        }
    }
}

impl<T: KvTransport> Retriever<T> {
    pub fn with_client(client: RemoteCacheClient<T>) -> Self {
        Self { client }
    }

    /// Runs one retrieval.
    ///
    /// Fails only when the endpoint string is malformed, in which case
    /// nothing is touched on disk or on the network. Every other result is
    /// a [`RetrievalOutcome`].
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome, EndpointError> {
        let endpoint = Endpoint::parse(&request.endpoint)?;

        info!(
            op = "retrieve.started",
            endpoint = %endpoint,
            key = %request.cache_key,
            destination = %request.destination.display(),
            "downloading cache object"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Transport(TransportFailure::new(
                FailureCode::Cancelled,
                "retrieval cancelled",
            ))),
            r = self.transfer(&endpoint, request) => r,
        };

        let outcome = match result {
            Ok(bytes_written) => {
                info!(
                    op = "retrieve.success",
                    key = %request.cache_key,
                    bytes = bytes_written,
                    "cache object downloaded"
                );
                RetrievalOutcome::Success { bytes_written }
            }
            Err(FetchError::NotFound { .. }) => {
                info!(op = "retrieve.not_found", key = %request.cache_key, "no cache object for key");
                RetrievalOutcome::NotFound
            }
            Err(FetchError::Transport(failure)) => {
                warn!(
                    op = "retrieve.failed",
                    key = %request.cache_key,
                    code = %failure.code,
                    error = %failure.message,
                    "cache download failed"
                );
                RetrievalOutcome::TransportFailure(failure)
            }
        };
        Ok(outcome)
    }

    async fn transfer(
        &self,
        endpoint: &Endpoint,
        request: &RetrievalRequest,
    ) -> Result<u64, FetchError> {
        let key = request.cache_key.as_str();
        let mut file = create_destination(&request.destination).await?;

        let mut stream = self
            .client
            .get(endpoint, key, &request.credential)
            .await?;

        let bytes_written = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| classify_io(e, key))?;
        file.flush().await.map_err(|e| classify_io(e, key))?;

        Ok(bytes_written)
    }
}

async fn create_destination(path: &Path) -> Result<File, FetchError> {
    File::create(path).await.map_err(|e| {
        FetchError::Transport(TransportFailure::new(
            FailureCode::LocalIo,
            format!("create {}: {}", path.display(), e),
        ))
    })
}
