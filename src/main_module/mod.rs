//! HTTP surface: router assembly, probes and process lifecycle

mod health;
mod server;
mod shutdown;

pub use health::*;
pub use server::*;
pub use shutdown::*;
