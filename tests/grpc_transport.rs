//! Retrieval over the built-in gRPC ByteStream transport against a loopback
//! tonic server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use kvfetch::client::ClientOptions;
use kvfetch::error::FailureCode;
use kvfetch::models::{AccessCredential, RetrievalOutcome, RetrievalRequest};
use kvfetch::retrieve::Retriever;
use kvfetch::transport_grpc::{ReadRequest, ReadResponse};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Context, Poll, Service, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService};
use tonic::{Request, Response, Status};

const TOKEN: &str = "let-me-in";

// ─── Fake ByteStream service ────────────────────────────────────────

#[derive(Clone)]
enum Blob {
    /// Served as one response per chunk.
    Chunks(Vec<&'static [u8]>),
    /// Sends `prefix`, then ends the stream with `UNAVAILABLE`.
    Interrupted(&'static [u8]),
}

/// Metadata seen on the last `Read` call.
#[derive(Default, Clone)]
struct SeenHeaders {
    client_name: Option<String>,
    request_id: Option<String>,
}

#[derive(Clone)]
struct ByteStreamService {
    blobs: Arc<HashMap<String, Blob>>,
    seen: Arc<Mutex<SeenHeaders>>,
}

impl NamedService for ByteStreamService {
    const NAME: &'static str = "google.bytestream.ByteStream";
}

struct ReadSvc(ByteStreamService);

impl ServerStreamingService<ReadRequest> for ReadSvc {
    type Response = ReadResponse;
    type ResponseStream = BoxStream<'static, Result<ReadResponse, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<ReadRequest>) -> Self::Future {
        let service = self.0.clone();
        Box::pin(async move {
            let header = |name: &str| {
                request
                    .metadata()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            if header("authorization").as_deref() != Some(&format!("Bearer {}", TOKEN)[..]) {
                return Err(Status::unauthenticated("bad token"));
            }
            *service.seen.lock().unwrap() = SeenHeaders {
                client_name: header("x-client-name"),
                request_id: header("x-request-id"),
            };

            let key = request.into_inner().resource_name;
            let chunks: Vec<Result<ReadResponse, Status>> = match service.blobs.get(&key) {
                None => return Err(Status::not_found(format!("{} not stored", key))),
                Some(Blob::Chunks(parts)) => parts
                    .iter()
                    .map(|p| Ok(ReadResponse { data: p.to_vec() }))
                    .collect(),
                Some(Blob::Interrupted(prefix)) => vec![
                    Ok(ReadResponse {
                        data: prefix.to_vec(),
                    }),
                    Err(Status::unavailable("backend went away")),
                ],
            };
            Ok(Response::new(stream::iter(chunks).boxed()))
        })
    }
}

impl<B> Service<http::Request<B>> for ByteStreamService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let service = self.clone();
        match req.uri().path() {
            "/google.bytestream.ByteStream/Read" => Box::pin(async move {
                let codec: tonic::codec::ProstCodec<ReadResponse, ReadRequest> =
                    tonic::codec::ProstCodec::default();
                let mut grpc = Grpc::new(codec);
                Ok(grpc.server_streaming(ReadSvc(service), req).await)
            }),
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", (tonic::Code::Unimplemented as i32).to_string())
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .unwrap())
            }),
        }
    }
}

async fn start_server() -> (SocketAddr, Arc<Mutex<SeenHeaders>>) {
    let mut blobs = HashMap::new();
    blobs.insert("present".to_string(), Blob::Chunks(vec![&b"ABC"[..], &b"DEF"[..]]));
    blobs.insert("flaky".to_string(), Blob::Interrupted(b"ABC"));
    let seen = Arc::new(Mutex::new(SeenHeaders::default()));

    let service = ByteStreamService {
        blobs: Arc::new(blobs),
        seen: seen.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = Box::pin(stream::unfold(listener, |listener| async move {
        let conn = listener.accept().await.map(|(socket, _)| socket);
        Some((conn, listener))
    }));
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });
    (addr, seen)
}

async fn fetch(addr: SocketAddr, key: &str, token: &str, tmp: &TempDir) -> (RetrievalOutcome, RetrievalRequest) {
    let req = RetrievalRequest::new(
        format!("grpc://{}", addr),
        key,
        AccessCredential::new(token),
        tmp.path().join(format!("{}.bin", key)),
    );
    let retriever = Retriever::new(ClientOptions {
        dial_timeout: Duration::from_secs(2),
        client_name: "kv-test".to_string(),
    });
    let outcome = retriever
        .retrieve(&req, &CancellationToken::new())
        .await
        .unwrap();
    (outcome, req)
}

fn failure_code(outcome: &RetrievalOutcome) -> FailureCode {
    match outcome {
        RetrievalOutcome::TransportFailure(f) => f.code,
        other => panic!("expected a transport failure, got {:?}", other),
    }
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_grpc_present_key_reassembles_chunks() {
    let (addr, seen) = start_server().await;
    let tmp = TempDir::new().unwrap();

    let (outcome, req) = fetch(addr, "present", TOKEN, &tmp).await;
    assert_eq!(outcome, RetrievalOutcome::Success { bytes_written: 6 });
    assert_eq!(std::fs::read(&req.destination).unwrap(), b"ABCDEF");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.client_name.as_deref(), Some("kv-test"));
    assert!(!seen.request_id.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_grpc_not_found_status() {
    let (addr, _) = start_server().await;
    let tmp = TempDir::new().unwrap();
    let (outcome, _) = fetch(addr, "absent", TOKEN, &tmp).await;
    assert_eq!(outcome, RetrievalOutcome::NotFound);
}

#[tokio::test]
async fn test_grpc_bad_token_is_authorization_failure() {
    let (addr, _) = start_server().await;
    let tmp = TempDir::new().unwrap();
    let (outcome, _) = fetch(addr, "present", "wrong", &tmp).await;
    assert_eq!(failure_code(&outcome), FailureCode::Unauthenticated);
}

#[tokio::test]
async fn test_grpc_unavailable_mid_stream() {
    let (addr, _) = start_server().await;
    let tmp = TempDir::new().unwrap();
    let (outcome, _) = fetch(addr, "flaky", TOKEN, &tmp).await;
    assert_eq!(failure_code(&outcome), FailureCode::Unavailable);
}

#[tokio::test]
async fn test_grpc_connection_refused_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let tmp = TempDir::new().unwrap();
    let (outcome, _) = fetch(addr, "present", TOKEN, &tmp).await;
    assert_eq!(failure_code(&outcome), FailureCode::Unavailable);
}
