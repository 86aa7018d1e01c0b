//! Backend for the Denizli bus rider app: a CORS proxy over the municipal
//! transit API, plus the client-side state machines behind the line,
//! QR scan and schedule image views.

pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod qr;
pub mod reconciler;
pub mod server;
pub mod tracker;
pub mod upstream;
pub mod zoom;

pub use error::{Result, TransitError};
