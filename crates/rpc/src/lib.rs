//! Length-prefixed MessagePack control plane for the collector daemon.
//!
//! - [`ControlServer`] accepts TCP connections and dispatches
//!   `Collector.*` calls to a [`ControlService`]
//! - [`ControlClient`] issues calls over one connection
//! - [`SchedulerControl`] is the service backed by the live scheduler

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod proto;
pub mod server;
pub mod service;

pub use client::ControlClient;
pub use error::RpcError;
pub use message::{Request, Response};
pub use proto::{AddManualTaskArgs, CurrentTask, Method, QueryCurrentReply};
pub use server::ControlServer;
pub use service::{ControlService, SchedulerControl};

/// Default control-plane port.
pub const DEFAULT_PORT: u16 = 20324;
