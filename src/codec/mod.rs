//! Codec module - JSON payload encoding.
//!
//! - [`JsonCodec`] - `serde_json` encode/decode for frame payloads
//! - [`payload`] - typed handshake and command payloads
//!
//! # Design
//!
//! Payloads are serde-derived structs, so the key order on the wire is the
//! declaration order and never depends on map iteration.
//!
//! # Example
//!
//! ```
//! use presence_client::codec::{payload, JsonCodec};
//!
//! let bytes = JsonCodec::encode(&payload::Handshake::new("1234")).unwrap();
//! assert_eq!(bytes, br#"{"v":1,"client_id":"1234"}"#);
//! ```

mod json;
pub mod payload;

pub use json::JsonCodec;
