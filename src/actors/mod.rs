//! Actor-based polling and broadcast core
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Poller (host A) ──┐
//!   Poller (host B) ──┼──> AggregateStore ──(generation watch)──> BroadcastHub
//!   Poller (host N) ──┘         │                                     │
//!                               │ read()                              │ bounded queue
//!                               ▼                                     ▼
//!                        static handlers                        viewer tasks (WebSocket)
//! ```
//!
//! ## Actor Types
//!
//! - **HostPollerActor**: runs the remote command for one host on a fixed
//!   interval and writes results into the store. One task per host, so a
//!   hung host never delays the others.
//! - **BroadcastHub**: owns the viewer registry; wakes on generation
//!   changes, renders once per distinct filter, and fans out to each
//!   viewer's bounded queue. Slow viewers are dropped, not waited for.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control
//! 2. **Generation watch**: the hub observes store transitions instead of
//!    being invoked by pollers, decoupling write path from fan-out path
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod hub;
pub mod messages;
pub mod poller;
