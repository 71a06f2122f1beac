//! Socket transport for bridging processes.
//!
//! Carries boundary envelopes over `127.0.0.1` TCP connections using
//! length-prefixed JSON frames, so a host process can serve frames living in
//! other processes.
//!
//! # Architecture
//!
//! - **Server**: accepts peers and hands each one a local [`Port`](crate::Port)
//! - **Client**: connects to a server and returns a linked port
//! - **Protocol**: framing and the hello/message frame types used by both

pub mod client;
mod link;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::Frame;
pub use server::{IpcServer, IpcServerHandle};
