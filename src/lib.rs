//! `safereq` is a blocking HTTP request engine that resolves and validates the
//! destination address before connecting, follows redirects under a bounded
//! policy and retries transport failures with jittered exponential backoff.
//!
//! # Quick Start
//!
//! ```no_run
//! use safereq::prelude::HttpClient;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: u64,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .base_uri("https://api.example.com/v1")
//!         .timeout_secs(5.0)
//!         .max_retries(2)
//!         .try_build()?;
//!
//!     let item: Item = client
//!         .post("/items")
//!         .json(&serde_json::json!({ "name": "demo" }))?
//!         .send_json()?;
//!
//!     println!("created id={}", item.id);
//!     Ok(())
//! }
//! ```
//!
//! # Target Resolution
//!
//! Host names are resolved through a [`Resolver`] before any connection is
//! made; the request is sent to the validated IP while `Host` and TLS keep the
//! original name. Hosts passed to `trust_hosts` and IP literals skip the
//! resolver entirely. The default [`SystemResolver`] refuses loopback,
//! private, link-local and other internal ranges.

mod client;
mod config;
mod error;
mod execution;
mod extensions;
mod guard;
mod location;
mod redirect;
mod request;
mod resolver;
mod response;
mod retry;
mod transport;
mod util;

pub use crate::client::{HttpClient, HttpClientBuilder};
pub use crate::config::{ClientConfig, TransportOptions};
pub use crate::error::{Error, ErrorCode};
pub use crate::execution::ExecutionState;
pub use crate::extensions::{Sleeper, ThreadSleeper};
pub use crate::guard::{ResolutionError, Resolver, parse_ip_literal, resolve_target};
pub use crate::location::{UrlParts, replace_host, resolve_location};
pub use crate::redirect::{RedirectPolicy, RedirectStep, next_redirect_step, redirect_method};
pub use crate::request::{Method, RequestBody, RequestBuilder, RequestSpec};
pub use crate::resolver::{AddressPolicy, SystemResolver};
pub use crate::response::Response;
pub use crate::retry::RetryPolicy;
pub use crate::transport::{
    BlockingTransport, RawResponse, Transport, TransportErrorKind, TransportFailure,
    TransportRequest,
};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AddressPolicy, ClientConfig, Error, ErrorCode, HttpClient, Method, RequestBody,
        Response, SystemResolver,
    };
}
