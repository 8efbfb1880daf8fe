//! # Runtime
//!
//! Process level wiring of the controller.
//!
//! - `initialization`: crypto provider, tracing, metrics, HTTP server and client
//! - `leader_election`: Lease based leader election
//! - `watch_loop`: SyncPolicy and Namespace controllers
//! - `error_policy`: requeue and watch error handling

pub mod error_policy;
pub mod initialization;
pub mod leader_election;
pub mod watch_loop;
