//! # presence-client
//!
//! Client engine for the local rich-presence IPC protocol.
//!
//! A desktop "presence host" listens on a local pipe. This crate opens that
//! pipe, performs the handshake and publishes an activity to it, keeping the
//! published state alive across host restarts.
//!
//! ## Architecture
//!
//! - **Transport**: duplex byte channel ([`transport::PipeTransport`] or a test double)
//! - **Framing**: 8-byte little-endian header (opcode, length) + UTF-8 JSON payload
//! - **Engine**: single-task loop that writes queued commands, peeks for
//!   responses, correlates them by nonce and reconnects on failure
//!
//! ## Example
//!
//! ```ignore
//! use presence_client::activity::{Activity, ActivityType};
//! use presence_client::transport::PipeTransport;
//! use presence_client::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder("1355907951155740785").build(PipeTransport::new());
//!     let handle = client.handle();
//!     let task = tokio::spawn(client.run());
//!
//!     let mut activity = Activity::new();
//!     activity.set_type(ActivityType::Playing);
//!     activity.set_details("In the menus");
//!     handle.submit_activity(activity, |outcome| match outcome {
//!         Ok(reply) => println!("accepted: {reply}"),
//!         Err(e) => eprintln!("rejected: {e}"),
//!     });
//!
//!     handle.shutdown();
//!     task.await.unwrap().unwrap();
//! }
//! ```

pub mod activity;
pub mod codec;
pub mod error;
pub mod nonce;
pub mod outbound;
pub mod pending;
pub mod protocol;
pub mod settings;
pub mod transport;

mod client;

pub use activity::{Activity, ActivityType};
pub use client::{Client, ClientBuilder, ClientHandle, ConnectionState, LifecycleEvent};
pub use error::{PresenceError, Result};
pub use protocol::Message;
pub use settings::ClientSettings;
