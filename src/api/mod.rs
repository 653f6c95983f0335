//! C11: HTTP handlers. One module per external-interface group (§6);
//! `server::router` wires these onto paths and applies auth guards.

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod messages;
pub mod usage;
