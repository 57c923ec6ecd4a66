//! HTTP execution: method names, prepared requests, normalized responses and
//! the executor that sends one against the other.

pub mod client;
pub mod method;
pub mod request;
pub mod response;

pub use client::{HttpExecutor, RequestParts};
pub use method::HttpMethod;
pub use request::PreparedRequest;
pub use response::{Body, HttpResponse};
