//! Client for an account server that manages applications, their
//! collaborators, access keys and AppEUIs.
//!
//! # Overview
//! `AccountClient` represents one session: a server URL and an access token.
//! Every operation is a blocking request/response pair. It either returns the
//! decoded entity or a typed `AccountError`; nothing is retried or cached.
//!
//! # Design
//! - Each operation is split into `build_*` (validates arguments, produces an
//!   `HttpRequest`) and `parse_*` (consumes an `HttpResponse`), so hosts can
//!   run the I/O themselves.
//! - The plain operation methods run both halves around a `Transport`;
//!   `UreqTransport` is the default.
//! - Identifiers are percent-escaped into path segments.
//! - Types are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use client::AccountClient;
pub use config::ClientConfig;
pub use error::{AccountError, Resource};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use types::{AccessKey, AppEui, Application, Collaborator, CreateApplication, Right};
