//! HTTP transport for the report wizard.

mod server;

pub use server::*;
