//! # Conduit Core
//!
//! Core types for the Conduit framework.
//!
//! This crate provides the foundational types used throughout Conduit:
//!
//! - [`context`] - Ambient, tree-scoped context store bound to the running task
//! - [`Request`] / [`Response`] - Transport-independent request and response shell
//! - [`RequestId`] - UUID v7 request identifier
//! - [`ConduitError`] - Standard error types
//! - [`events`] - Event buffer released on commit, discarded on rollback

#![doc(html_root_url = "https://docs.rs/conduit-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
mod error;
pub mod events;
mod request;
mod response;

pub use context::{Scope, ScopeValues};
pub use error::{ConduitError, ConduitResult, ErrorCategory};
pub use events::{EventBuffer, EventPublisher, TransactionOutcome};
pub use request::{Protocol, Request, RequestBuilder, RequestId};
pub use response::Response;
