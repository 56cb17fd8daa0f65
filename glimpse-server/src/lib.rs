//! # glimpse-server
//!
//! Processing side of the glimpse protocol. Devices connect over TCP and
//! send tagged image frames; each frame is routed by its mode to an
//! [`InferenceBackend`](backend::InferenceBackend) and the resulting
//! audio is written back as a response frame.
//!
//! - [`dispatch`]: listener, per-connection exchange loop
//! - [`backend`]: handler trait, registry, shell-command backend
//! - [`archive`]: optional on-disk copy of every exchange
//! - [`config`]: TOML configuration

pub mod archive;
pub mod backend;
pub mod config;
pub mod dispatch;

pub use archive::Archive;
pub use backend::{CommandBackend, HandlerRegistry, InferenceBackend, Reply};
pub use config::ServerConfig;
pub use dispatch::{DispatchOptions, DispatchServer, serve_connection};
