//! Data models

mod ca;
mod signing_request;
mod status;

pub use ca::*;
pub use signing_request::*;
pub use status::*;
