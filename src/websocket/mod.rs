//! WebSocket transport: routes and per-connection socket loops.

mod connection;
mod routes;

pub use routes::create_router;
