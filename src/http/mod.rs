//! HTTP server module: admission middleware and identity resolution.

mod identity;
mod middleware;
mod server;

pub use identity::client_key;
pub use middleware::admission;
pub use server::HttpServer;
