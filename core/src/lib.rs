//! Typed async client core for a CRM REST API.
//!
//! # Overview
//! Maps CRM endpoints (objects, associations, lists, schemas) onto typed
//! calls. Every call goes through one dispatch path: a [`Request`] is built
//! and decorated with [`RequestOption`]s, [`CrmClient::execute`] sends it
//! over a [`Transport`], and the envelope parser turns the response into a
//! typed value or a classified [`ApiError`].
//!
//! # Design
//! - `CrmClient` holds only configuration fixed at construction plus shared
//!   thread-safe state (rate limiter, connection pool). It is cheap to clone
//!   and safe to use from many tasks at once.
//! - Building a wire request ([`CrmClient::build_http_request`]) is pure and
//!   separate from sending it, so the I/O boundary stays explicit and the
//!   [`Transport`] trait is the only seam tests need to replace.
//! - Server rejections are never raised on the status alone: the error body
//!   becomes a [`ServerError`] and resource methods run it through
//!   [`classify`] so callers see `NotFound`/`Validation`/`AlreadyExists`
//!   with the original still attached.
//! - Batch calls return [`BatchResult`]; any failed item turns the call into
//!   [`ApiError::BatchPartial`], which still carries every result.
//! - Every call takes a [`CallContext`] for cancellation and deadlines.
//!
//! ```no_run
//! use crm_core::{CallContext, ClientConfig, CrmClient, RequestOption};
//!
//! # async fn run() -> Result<(), crm_core::ApiError> {
//! let client = CrmClient::new(ClientConfig::default().with_access_token("pat-..."))?;
//! let ctx = CallContext::background();
//! let page = client
//!     .objects("contacts")
//!     .list(&ctx, &[RequestOption::limit(10), RequestOption::properties(["email"])])
//!     .await?;
//! for contact in &page.results {
//!     println!("{} {:?}", contact.id, contact.property("email"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod http;
pub mod options;
pub mod ratelimit;
pub mod resources;
pub mod retry;
pub mod transport;
pub mod types;

pub use batch::{BatchItemError, BatchPartialError, BatchResult, BatchStatus};
pub use client::CrmClient;
pub use config::ClientConfig;
pub use context::{CallContext, Canceller};
pub use envelope::{Page, Paging};
pub use error::{classify, ApiError, ErrorDetail, ServerError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Request};
pub use options::RequestOption;
pub use ratelimit::RateLimit;
pub use retry::RetryPolicy;
pub use transport::{ReqwestTransport, Transport};
pub use types::*;
