//! Typed payloads exchanged with the host.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::JsonCodec;
use crate::activity::Activity;
use crate::error::Result;

/// Handshake protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Command name for publishing or clearing an activity.
pub const SET_ACTIVITY: &str = "SET_ACTIVITY";

/// `{"v":1,"client_id":"<id>"}` sent with the handshake opcode.
///
/// The client id is a string here even though it is numeric.
#[derive(Debug, Serialize)]
pub struct Handshake<'a> {
    v: u32,
    client_id: &'a str,
}

impl<'a> Handshake<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            client_id,
        }
    }
}

/// A `SET_ACTIVITY` command. `activity: None` clears the activity.
#[derive(Debug, Serialize)]
pub struct SetActivityCommand<'a> {
    cmd: &'static str,
    args: SetActivityArgs<'a>,
    nonce: &'a str,
}

#[derive(Debug, Serialize)]
struct SetActivityArgs<'a> {
    pid: u32,
    activity: ActivityArg<'a>,
}

/// Serializes as the activity, or `{}` when clearing.
#[derive(Debug)]
struct ActivityArg<'a>(Option<&'a Activity>);

impl Serialize for ActivityArg<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Some(activity) => activity.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

impl<'a> SetActivityCommand<'a> {
    /// Command for the current process.
    pub fn new(activity: Option<&'a Activity>, nonce: &'a str) -> Self {
        Self::with_pid(std::process::id(), activity, nonce)
    }

    pub fn with_pid(pid: u32, activity: Option<&'a Activity>, nonce: &'a str) -> Self {
        Self {
            cmd: SET_ACTIVITY,
            args: SetActivityArgs {
                pid,
                activity: ActivityArg(activity),
            },
            nonce,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        JsonCodec::encode(self)
    }
}

/// Envelope fields common to every inbound payload. Used for logging only.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub evt: Option<String>,
}

impl Envelope {
    /// Best-effort parse; anything unparseable yields an empty envelope.
    pub fn peek(payload: &[u8]) -> Self {
        JsonCodec::decode(payload).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;

    #[test]
    fn test_handshake_payload() {
        let bytes = JsonCodec::encode(&Handshake::new("1355907951155740785")).unwrap();
        assert_eq!(bytes, br#"{"v":1,"client_id":"1355907951155740785"}"#);
    }

    #[test]
    fn test_clear_command_payload() {
        let bytes = SetActivityCommand::with_pid(42, None, "n-1").encode().unwrap();
        assert_eq!(
            bytes,
            br#"{"cmd":"SET_ACTIVITY","args":{"pid":42,"activity":{}},"nonce":"n-1"}"#
        );
    }

    #[test]
    fn test_set_command_payload() {
        let mut activity = Activity::new();
        activity.set_name("drpc").unwrap();
        activity.set_type(ActivityType::Listening);

        let bytes = SetActivityCommand::with_pid(7, Some(&activity), "n-2")
            .encode()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"cmd":"SET_ACTIVITY","args":{"pid":7,"activity":{"name":"drpc","type":2,"timestamps":{},"assets":{}}},"nonce":"n-2"}"#
        );
    }

    #[test]
    fn test_command_uses_process_id() {
        let bytes = SetActivityCommand::new(None, "n").encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["args"]["pid"], std::process::id());
    }

    #[test]
    fn test_envelope_peek() {
        let env = Envelope::peek(br#"{"cmd":"DISPATCH","evt":"READY","data":{}}"#);
        assert_eq!(env.cmd.as_deref(), Some("DISPATCH"));
        assert_eq!(env.evt.as_deref(), Some("READY"));

        let env = Envelope::peek(b"garbage");
        assert!(env.cmd.is_none() && env.evt.is_none());
    }
}
