//! # kvfetch
//!
//! Fingerprinting and retrieval primitives for a CI build cache.
//!
//! kvfetch establishes a content fingerprint for a local build-output tree
//! and fetches previously cached artifacts from a remote content-addressable
//! key-value store. A remote "key does not exist" answer is kept strictly
//! apart from transient or infrastructure failures, because callers decide
//! between rebuilding and retrying on exactly that distinction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐
//! │  Build tree │──▶│ Fingerprint  │──▶ Manifest (path, sha256, mtime)
//! └─────────────┘   └──────────────┘
//!
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Retriever  │──▶│ RemoteCache  │──▶│ KvTransport  │──▶ gRPC / HTTP
//! │ (one shot)  │   │   Client     │   │              │
//! └──────┬──────┘   └──────────────┘   └──────────────┘
//!        ▼
//!   destination file
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kvf fingerprint ./build --output manifest.json
//! KVF_ACCESS_TOKEN=... kvf fetch my-key ./artifact.tar --endpoint grpcs://cache.example.com:443
//! kvf ci-info
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Manifest, records, request and outcome types |
//! | [`error`] | Typed error taxonomy |
//! | [`hasher`] | Per-file content hashing |
//! | [`fingerprint`] | Tree walking and manifest assembly |
//! | [`endpoint`] | `scheme://host:port` parsing |
//! | [`traits`] | Transport seam |
//! | [`client`] | Dial timeout, credentials, status classification |
//! | [`transport_grpc`] | ByteStream gRPC transport |
//! | [`transport_http`] | HTTP GET transport |
//! | [`retrieve`] | Download orchestration |
//! | [`ci`] | CI provider metadata |

pub mod ci;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod models;
pub mod retrieve;
pub mod traits;
pub mod transport_grpc;
pub mod transport_http;
