//! # Shared World Server Library
//!
//! This library provides the authoritative server for a shared, editable voxel
//! world. Every connected client sees the same blocks, ground tiles, sky
//! decorations and background color, and every accepted change is persisted
//! and relayed to everyone.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World State
//! The server holds the one true copy of the world. Clients only propose
//! mutations; the server validates them, applies them with last-write-wins
//! semantics, and tells every client what happened.
//!
//! ### Session Lifecycle
//! A new connection receives the full world together with its session id,
//! then everybody learns the new connection count. Disconnects shrink the
//! count and are announced the same way.
//!
//! ### Durability
//! Every accepted mutation is saved to a JSON file with an atomic
//! write-then-rename. A background timer saves a non-empty world
//! periodically, and shutdown always writes one final snapshot.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! Connection tasks never touch the world. They forward what they read to one
//! hub task over a channel, and that task alone owns the world, the store and
//! the connection registry. Each mutation is therefore validated, applied,
//! saved and broadcast as one step, and all clients observe mutations in the
//! same order.
//!
//! ### WebSocket Transport
//! Clients speak JSON over WebSocket text frames. Every message is an
//! envelope of the form `{"event": "...", "data": {...}}`. Outbound messages
//! go through a per-connection queue drained by a writer task, so a slow
//! client cannot stall the hub.
//!
//! ## Module Organization
//!
//! - `world`: the in-memory world and its mutation operations
//! - `persistence`: loading and atomically saving the world file
//! - `connections`: open sessions and event fan-out
//! - `hub`: the owner of world, store and registry
//! - `router`: validation and dispatch of client mutations
//! - `session`: connect and disconnect handling
//! - `network`: the listener, connection tasks and the hub loop
//! - `config`, `error`: runtime settings and error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let server = Server::bind(&config).await?;
//!
//!     // Runs until Ctrl+C, then saves the world one last time.
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connections;
pub mod error;
pub mod hub;
pub mod network;
pub mod persistence;
pub mod router;
pub mod session;
pub mod world;

pub use config::ServerConfig;
pub use error::ServerError;
pub use hub::WorldHub;
pub use network::Server;
pub use router::Outcome;
