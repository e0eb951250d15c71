mod client;
mod path;
pub mod request;

pub use client::{AlistClient, Options, Session};
