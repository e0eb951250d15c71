#[macro_use]
extern crate log;

pub mod alist;
pub mod config;
pub mod error;
pub mod magnet;
pub mod runner;
pub mod series;

pub use alist::AlistClient;
pub use config::Config;
