//! Transport plumbing: where to connect, and how long to wait.

mod connection;

pub use connection::{ConnectionInfo, deadline, millis};
