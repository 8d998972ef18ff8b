//! Backend client and the run-status poller built on top of it.
pub mod client;
pub mod poller;
