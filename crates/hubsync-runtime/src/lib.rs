//! Runtime half of hubsync: the push channel, the HTTP API client and the
//! session actor that ties them to `hubsync_core::SessionState`.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod session;
pub mod transport;
