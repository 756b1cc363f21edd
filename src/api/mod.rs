//! Request/response surface over the scan core
//!
//! Transport is left to the caller: the binary feeds it JSON lines, tests
//! call [`Handler::handle`] directly.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::Handler;
pub use request::{AddressArg, ChainArg, ReadArg, Request};
pub use response::{error_code, CandidateView, ErrorBody, PathView, Reply, Response};
