//! Activity value types published to the host.
//!
//! Everything here is a plain owned value. Setters that have bounds check
//! them and return [`PresenceError::InvalidActivity`]; unset optional fields
//! are left out of the serialized JSON entirely.
//!
//! # Example
//!
//! ```
//! use presence_client::activity::{Activity, ActivityType, Button, Party};
//!
//! let mut activity = Activity::new();
//! activity.set_name("drpc").unwrap();
//! activity.set_type(ActivityType::Playing);
//! activity.set_details("Line 1");
//! activity.timestamps_mut().set_start(1_700_000_000);
//! activity.set_party(Some(Party::new("lobby", 2, 5).unwrap()));
//! activity.add_button(Button::new("Website", "https://example.com").unwrap()).unwrap();
//!
//! let json = serde_json::to_value(&activity).unwrap();
//! assert_eq!(json["party"]["size"], serde_json::json!([2, 5]));
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{PresenceError, Result};

/// Maximum number of buttons on one activity.
pub const MAX_BUTTONS: usize = 2;

/// Button labels must be shorter than this many characters.
pub const MAX_BUTTON_LABEL_LEN: usize = 32;

/// Button URLs must be shorter than this many characters.
pub const MAX_BUTTON_URL_LEN: usize = 512;

/// Activity type shown by the host ("Playing ...", "Listening to ...").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ActivityType {
    #[default]
    Playing = 0,
    Listening = 2,
    Watching = 3,
    Competing = 5,
}

impl ActivityType {
    /// Numeric code sent on the wire.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

fn is_unset(seconds: &i64) -> bool {
    *seconds <= 0
}

fn non_empty(value: impl Into<String>) -> Option<String> {
    Some(value.into()).filter(|s| !s.is_empty())
}

/// Start/end timestamps in seconds since the Unix epoch. `0` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "is_unset")]
    start: i64,
    #[serde(skip_serializing_if = "is_unset")]
    end: i64,
}

impl Timestamps {
    pub fn set_start(&mut self, seconds: i64) {
        self.start = seconds;
    }

    pub fn set_end(&mut self, seconds: i64) {
        self.end = seconds;
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }
}

/// Party the user is in. Invariant: `current_size <= max_size`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Party {
    id: String,
    current_size: u32,
    max_size: u32,
}

impl Party {
    /// Create a party, rejecting `current > max`.
    pub fn new(id: impl Into<String>, current_size: u32, max_size: u32) -> Result<Self> {
        let mut party = Self {
            id: id.into(),
            ..Self::default()
        };
        party.set_size(current_size, max_size)?;
        Ok(party)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Set both sizes at once so the invariant is checked against the pair.
    pub fn set_size(&mut self, current_size: u32, max_size: u32) -> Result<()> {
        if current_size > max_size {
            return Err(PresenceError::InvalidActivity(format!(
                "party size {current_size} exceeds max size {max_size}"
            )));
        }
        self.current_size = current_size;
        self.max_size = max_size;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current_size(&self) -> u32 {
        self.current_size
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }
}

impl Serialize for Party {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.id.is_empty() {
            map.serialize_entry("id", &self.id)?;
        }
        if self.current_size != 0 || self.max_size != 0 {
            map.serialize_entry("size", &[self.current_size, self.max_size])?;
        }
        map.end()
    }
}

/// Large and small image keys with their hover texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    large_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    small_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    small_text: Option<String>,
}

impl Assets {
    pub fn set_large_image(&mut self, key: impl Into<String>) {
        self.large_image = non_empty(key);
    }

    pub fn set_large_text(&mut self, text: impl Into<String>) {
        self.large_text = non_empty(text);
    }

    pub fn set_small_image(&mut self, key: impl Into<String>) {
        self.small_image = non_empty(key);
    }

    pub fn set_small_text(&mut self, text: impl Into<String>) {
        self.small_text = non_empty(text);
    }

    pub fn large_image(&self) -> Option<&str> {
        self.large_image.as_deref()
    }

    pub fn large_text(&self) -> Option<&str> {
        self.large_text.as_deref()
    }

    pub fn small_image(&self) -> Option<&str> {
        self.small_image.as_deref()
    }

    pub fn small_text(&self) -> Option<&str> {
        self.small_text.as_deref()
    }
}

/// Clickable link shown under the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    label: String,
    url: String,
}

impl Button {
    /// Create a button. Label must be under 32 characters, URL under 512.
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let url = url.into();

        if label.chars().count() >= MAX_BUTTON_LABEL_LEN {
            return Err(PresenceError::InvalidActivity(format!(
                "button label must be shorter than {MAX_BUTTON_LABEL_LEN} characters"
            )));
        }
        if url.chars().count() >= MAX_BUTTON_URL_LEN {
            return Err(PresenceError::InvalidActivity(format!(
                "button url must be shorter than {MAX_BUTTON_URL_LEN} characters"
            )));
        }

        Ok(Self { label, url })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// The presence payload.
///
/// `timestamps` and `assets` are always serialized (possibly as `{}`);
/// every other field only when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<u64>,
    #[serde(rename = "type")]
    kind: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    timestamps: Timestamps,
    #[serde(skip_serializing_if = "Option::is_none")]
    party: Option<Party>,
    assets: Assets,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<Button>,
}

impl Activity {
    /// Create an empty activity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the activity name. Must not be empty.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(PresenceError::InvalidActivity(
                "name must not be empty".to_string(),
            ));
        }
        self.name = Some(name);
        Ok(())
    }

    /// Set the application id shown with the activity. `0` means "use the
    /// id from the handshake".
    pub fn set_client_id(&mut self, client_id: u64) {
        self.client_id = Some(client_id).filter(|id| *id != 0);
    }

    pub fn set_type(&mut self, kind: ActivityType) {
        self.kind = kind;
    }

    pub fn set_details(&mut self, details: impl Into<String>) {
        self.details = non_empty(details);
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = non_empty(state);
    }

    pub fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }

    pub fn set_party(&mut self, party: Option<Party>) {
        self.party = party;
    }

    pub fn assets_mut(&mut self) -> &mut Assets {
        &mut self.assets
    }

    /// Append a button. At most two are allowed.
    pub fn add_button(&mut self, button: Button) -> Result<()> {
        if self.buttons.len() >= MAX_BUTTONS {
            return Err(PresenceError::InvalidActivity(format!(
                "at most {MAX_BUTTONS} buttons are allowed"
            )));
        }
        self.buttons.push(button);
        Ok(())
    }

    pub fn clear_buttons(&mut self) {
        self.buttons.clear();
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    pub fn kind(&self) -> ActivityType {
        self.kind
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    pub fn party(&self) -> Option<&Party> {
        self.party.as_ref()
    }

    pub fn assets(&self) -> &Assets {
        &self.assets
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_activity_serializes_minimal() {
        let json = serde_json::to_string(&Activity::new()).unwrap();
        assert_eq!(json, r#"{"type":0,"timestamps":{},"assets":{}}"#);
    }

    #[test]
    fn test_full_activity_shape() {
        let mut activity = Activity::new();
        activity.set_name("drpc").unwrap();
        activity.set_client_id(1355907951155740785);
        activity.set_type(ActivityType::Competing);
        activity.set_details("Line 1");
        activity.set_state("Party");
        activity.timestamps_mut().set_start(1_700_000_000);
        activity.set_party(Some(Party::new("test", 2, 5).unwrap()));
        activity.assets_mut().set_large_image("my_image");
        activity.assets_mut().set_small_text("small");
        activity
            .add_button(Button::new("Test", "https://example.com").unwrap())
            .unwrap();

        let value = serde_json::to_value(&activity).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "drpc",
                "client_id": 1355907951155740785u64,
                "type": 5,
                "details": "Line 1",
                "state": "Party",
                "timestamps": { "start": 1_700_000_000 },
                "party": { "id": "test", "size": [2, 5] },
                "assets": { "large_image": "my_image", "small_text": "small" },
                "buttons": [{ "label": "Test", "url": "https://example.com" }]
            })
        );
    }

    #[test]
    fn test_field_order_is_stable() {
        let mut activity = Activity::new();
        activity.set_name("n").unwrap();
        activity.set_state("s");

        let json = serde_json::to_string(&activity).unwrap();
        assert_eq!(
            json,
            r#"{"name":"n","type":0,"state":"s","timestamps":{},"assets":{}}"#
        );
    }

    #[test]
    fn test_party_rejects_current_above_max() {
        assert!(matches!(
            Party::new("p", 6, 5),
            Err(PresenceError::InvalidActivity(_))
        ));

        let mut party = Party::new("p", 1, 5).unwrap();
        assert!(party.set_size(6, 5).is_err());
        assert_eq!(party.current_size(), 1);
        assert!(party.set_size(5, 5).is_ok());
    }

    #[test]
    fn test_party_without_id_or_size() {
        let json = serde_json::to_string(&Party::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_button_bounds() {
        let long_label = "x".repeat(40);
        assert!(Button::new(long_label, "https://example.com").is_err());
        assert!(Button::new("x".repeat(31), "https://example.com").is_ok());
        assert!(Button::new("x".repeat(32), "https://example.com").is_err());
        assert!(Button::new("ok", "u".repeat(512)).is_err());
        assert!(Button::new("ok", "u".repeat(511)).is_ok());
    }

    #[test]
    fn test_at_most_two_buttons() {
        let mut activity = Activity::new();
        let button = Button::new("b", "https://example.com").unwrap();
        activity.add_button(button.clone()).unwrap();
        activity.add_button(button.clone()).unwrap();
        assert!(activity.add_button(button).is_err());
        assert_eq!(activity.buttons().len(), 2);

        activity.clear_buttons();
        assert!(activity.buttons().is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut activity = Activity::new();
        assert!(activity.set_name("").is_err());
        assert!(activity.name().is_none());
    }

    #[test]
    fn test_empty_strings_are_omitted() {
        let mut activity = Activity::new();
        activity.set_details("");
        activity.set_client_id(0);
        activity.assets_mut().set_large_image("");

        let json = serde_json::to_string(&activity).unwrap();
        assert_eq!(json, r#"{"type":0,"timestamps":{},"assets":{}}"#);
    }

    #[test]
    fn test_activity_type_codes() {
        assert_eq!(ActivityType::Playing.code(), 0);
        assert_eq!(ActivityType::Listening.code(), 2);
        assert_eq!(ActivityType::Watching.code(), 3);
        assert_eq!(ActivityType::Competing.code(), 5);
    }
}
