//! Request/response value types and the network fetch capability.

mod client;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use types::{parse_method, Method, Request, Response};
