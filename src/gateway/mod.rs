pub mod auth;
pub mod routes;
pub mod server;
pub mod ws;

pub use server::{DEFAULT_GATEWAY_PORT, GatewayState, build_router, serve};
