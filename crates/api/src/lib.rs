//! HTTP boundary for the vigil evidence service.
//!
//! The router is exposed separately from the serving loop so integration
//! tests can drive it in-process with `tower::ServiceExt::oneshot`.

pub mod server;

pub use server::{app, serve, AppState};
