//! Inbound HTTP surface: match callback, health checks and metrics

pub mod callback;
pub mod server;

pub use callback::match_callback_handler;
pub use server::{HttpServer, HttpServerConfig, ServerState, CALLBACK_PATH};
