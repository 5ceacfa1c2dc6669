// Courier Core - Domain Logic, Ports & Use Cases
// NO infrastructure dependencies: stores and handlers are plugged in through `port`

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
