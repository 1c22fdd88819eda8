//! Transport traits for the remote key-value store.
//!
//! The retrieval core never speaks a wire protocol directly. It asks a
//! [`KvTransport`] for a connection and a [`KvConnection`] for an object
//! stream, so tests can substitute an in-memory store and new protocols
//! can be added without touching error classification.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            RemoteCacheClient             │
//! │   dial timeout · credential check ·      │
//! │   status classification                  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          KvTransport::connect()
//!                ▼
//! ┌──────────────────────────────────────────┐
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐  │
//! │  │  gRPC   │ │  HTTP   │ │  Custom /  │  │
//! │  │ByteStrm │ │  GET    │ │  in-memory │  │
//! │  └─────────┘ └─────────┘ └────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          KvConnection::get() → ObjectStream
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use kvfetch::client::ClientOptions;
//! use kvfetch::endpoint::Endpoint;
//! use kvfetch::error::{RemoteStatus, StatusCode};
//! use kvfetch::models::AccessCredential;
//! use kvfetch::traits::{KvConnection, KvTransport, ObjectStream};
//!
//! struct EmptyStore;
//!
//! #[async_trait]
//! impl KvTransport for EmptyStore {
//!     async fn connect(
//!         &self,
//!         _endpoint: &Endpoint,
//!         _options: &ClientOptions,
//!     ) -> Result<Box<dyn KvConnection>, RemoteStatus> {
//!         Ok(Box::new(EmptyStore))
//!     }
//! }
//!
//! #[async_trait]
//! impl KvConnection for EmptyStore {
//!     async fn get(
//!         &mut self,
//!         key: &str,
//!         _credential: &AccessCredential,
//!     ) -> Result<ObjectStream, RemoteStatus> {
//!         Err(RemoteStatus::new(StatusCode::NotFound, format!("{} not stored", key)))
//!     }
//! }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::client::ClientOptions;
use crate::endpoint::Endpoint;
use crate::error::RemoteStatus;
use crate::models::AccessCredential;

/// Byte stream of a remote object.
///
/// A status the remote reports mid-stream arrives as an `io::Error`
/// wrapping a [`RemoteStatus`] (see [`RemoteStatus::into_io`]).
pub type ObjectStream = Pin<Box<dyn AsyncRead + Send>>;

/// Opens connections to a remote key-value endpoint.
#[async_trait]
pub trait KvTransport: Send + Sync {
    /// Establishes a connection. Implementations should honour
    /// `options.dial_timeout`; the client enforces it again on top.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ClientOptions,
    ) -> Result<Box<dyn KvConnection>, RemoteStatus>;
}

/// A single open connection. Dropping it releases the underlying channel.
#[async_trait]
pub trait KvConnection: Send {
    /// Issues one `get` for `key`. The returned stream owns whatever it
    /// needs to keep reading after the connection itself is dropped.
    async fn get(
        &mut self,
        key: &str,
        credential: &AccessCredential,
    ) -> Result<ObjectStream, RemoteStatus>;
}
