#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Zonefall Server
//!
//! Authoritative real-time multiplayer game server. Hosts four concurrent
//! modes over one WebSocket gateway: cooperative Boss Battles, 1v1 PVP
//! arenas, King-of-the-Zone with a fixed-tick simulation, and an endless
//! Slither arena. Rooms are in-memory; persistence and accounts are
//! external collaborators behind thin interfaces.

/// Chat and lobby routing
pub mod chat;

/// Server configuration and environment variables
pub mod config;

/// Planar geometry helpers
pub mod geometry;

/// Connection hub and broadcast groups
pub mod hub;

/// Identity resolution (external contract)
pub mod identity;

/// Structured logging configuration
pub mod logging;

/// WebSocket message protocol definitions
pub mod protocol;

/// Rate limiting implementation
pub mod rate_limit;

/// Room registry and matchmaking
pub mod registry;

/// Per-mode room state machines and simulation
pub mod rooms;

/// Per-room tick scheduling
pub mod scheduler;

/// Main server orchestration
pub mod server;

/// Match statistics sink (external contract)
pub mod stats;

/// WebSocket connection handling
pub mod websocket;
