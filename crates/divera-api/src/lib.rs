//! Async Rust client for the Divera 24/7 REST API (v2).
//!
//! - **[`DiveraClient`]** — one API key, all read and write endpoints:
//!   [`pull_all`](DiveraClient::pull_all), vehicle status / properties /
//!   crew, alarm create / update / close, messages and news.
//! - **[`auth`]** — username/password login and unit discovery.
//! - **[`Error`]** — transport-level error taxonomy.

pub mod alarms;
pub mod auth;
pub mod client;
pub mod error;
pub mod messages;
pub mod models;
pub mod pull;
pub mod transport;
pub mod vehicles;

pub use auth::{Credentials, Session, authenticate, login};
pub use client::{DEFAULT_BASE_URL, DiveraClient};
pub use error::Error;
pub use models::{CrewMode, UnitAccess, VehicleStatusUpdate};
pub use transport::{TlsMode, TransportConfig};
