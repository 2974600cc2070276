//! Wire protocol spoken over each WebSocket connection.
//!
//! Every text frame is a JSON envelope `{"event": "<kind>", "data": <payload>}`.
//! Inbound frames are parsed into a [`ClientEvent`] by hand rather than through
//! a serde derive, so that each rejection carries the exact field that was
//! missing or malformed. Outbound frames are [`ServerEvent`] values, which are
//! plain serde enums.

use crate::{Decoration, WorldSnapshot, MAX_RGB};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an inbound message was dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("message is not a valid event envelope: {0}")]
    Malformed(String),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a non-empty string")]
    InvalidString(&'static str),
    #[error("field `{0}` must be a number")]
    InvalidNumber(&'static str),
    #[error("field `{0}` must be an integer RGB color between 0 and 0xffffff")]
    InvalidColor(&'static str),
    #[error("field `{0}` must be an array of non-empty strings")]
    InvalidKeyList(&'static str),
}

/// A validated edit request from a client.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    PlaceBlock {
        key: String,
        x: f64,
        y: f64,
        z: f64,
        color: u32,
    },
    RemoveBlock {
        key: String,
    },
    RemoveBlocksBatch {
        keys: Vec<String>,
    },
    PlaceTile {
        key: String,
        x: f64,
        z: f64,
    },
    PlaceCloud(Decoration),
    PlaceSun(Decoration),
    PlaceRainbow(Decoration),
    RemoveCloud {
        id: String,
    },
    RemoveSun {
        id: String,
    },
    RemoveRainbow {
        id: String,
    },
    SetBackgroundColor {
        color: u32,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Parses and validates one text frame.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_parts(&envelope.event, &envelope.data)
    }

    /// Validates a payload for the given event kind.
    pub fn from_parts(event: &str, data: &Value) -> Result<Self, ValidationError> {
        let fields = Fields::new(data)?;

        let parsed = match event {
            "place-block" => ClientEvent::PlaceBlock {
                key: fields.string("key")?,
                x: fields.number("x")?,
                y: fields.number("y")?,
                z: fields.number("z")?,
                color: fields.rgb("color")?,
            },
            "remove-block" => ClientEvent::RemoveBlock {
                key: fields.string("key")?,
            },
            "remove-blocks-batch" => ClientEvent::RemoveBlocksBatch {
                keys: fields.string_list("keys")?,
            },
            "place-tile" => ClientEvent::PlaceTile {
                key: fields.string("key")?,
                x: fields.number("x")?,
                z: fields.number("z")?,
            },
            "place-cloud" => ClientEvent::PlaceCloud(fields.decoration()?),
            "place-sun" => ClientEvent::PlaceSun(fields.decoration()?),
            "place-rainbow" => ClientEvent::PlaceRainbow(fields.decoration()?),
            "remove-cloud" => ClientEvent::RemoveCloud {
                id: fields.string("id")?,
            },
            "remove-sun" => ClientEvent::RemoveSun {
                id: fields.string("id")?,
            },
            "remove-rainbow" => ClientEvent::RemoveRainbow {
                id: fields.string("id")?,
            },
            "set-background-color" => ClientEvent::SetBackgroundColor {
                color: fields.rgb("color")?,
            },
            other => return Err(ValidationError::UnknownEvent(other.to_string())),
        };

        Ok(parsed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::PlaceBlock { .. } => "place-block",
            ClientEvent::RemoveBlock { .. } => "remove-block",
            ClientEvent::RemoveBlocksBatch { .. } => "remove-blocks-batch",
            ClientEvent::PlaceTile { .. } => "place-tile",
            ClientEvent::PlaceCloud(_) => "place-cloud",
            ClientEvent::PlaceSun(_) => "place-sun",
            ClientEvent::PlaceRainbow(_) => "place-rainbow",
            ClientEvent::RemoveCloud { .. } => "remove-cloud",
            ClientEvent::RemoveSun { .. } => "remove-sun",
            ClientEvent::RemoveRainbow { .. } => "remove-rainbow",
            ClientEvent::SetBackgroundColor { .. } => "set-background-color",
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Typed accessors over a payload object.
struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(data: &'a Value) -> Result<Self, ValidationError> {
        data.as_object()
            .map(|map| Fields { map })
            .ok_or(ValidationError::NotAnObject)
    }

    fn required(&self, name: &'static str) -> Result<&'a Value, ValidationError> {
        self.map
            .get(name)
            .ok_or(ValidationError::MissingField(name))
    }

    fn string(&self, name: &'static str) -> Result<String, ValidationError> {
        match self.required(name)?.as_str() {
            Some(s) if !s.is_empty() => Ok(s.to_string()),
            _ => Err(ValidationError::InvalidString(name)),
        }
    }

    fn number(&self, name: &'static str) -> Result<f64, ValidationError> {
        self.required(name)?
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or(ValidationError::InvalidNumber(name))
    }

    fn rgb(&self, name: &'static str) -> Result<u32, ValidationError> {
        let value = self.required(name)?;
        let color = match value.as_u64() {
            Some(color) => color,
            None => match value.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= MAX_RGB as f64 => f as u64,
                _ => return Err(ValidationError::InvalidColor(name)),
            },
        };

        if color > MAX_RGB as u64 {
            return Err(ValidationError::InvalidColor(name));
        }
        Ok(color as u32)
    }

    fn string_list(&self, name: &'static str) -> Result<Vec<String>, ValidationError> {
        let items = self
            .required(name)?
            .as_array()
            .ok_or(ValidationError::InvalidKeyList(name))?;

        items
            .iter()
            .map(|item| match item.as_str() {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(ValidationError::InvalidKeyList(name)),
            })
            .collect()
    }

    fn decoration(&self) -> Result<Decoration, ValidationError> {
        Ok(Decoration {
            id: self.string("id")?,
            x: self.number("x")?,
            y: self.number("y")?,
            z: self.number("z")?,
        })
    }
}

/// Body of the `initial-state` message sent once to each new connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    #[serde(flatten)]
    pub world: WorldSnapshot,
    pub user_id: String,
}

/// Messages the server pushes to clients.
///
/// Every accepted mutation is echoed back to all connections, the sender
/// included, with the same payload shape it arrived with.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    InitialState(InitialState),
    UserCount(usize),
    BlockPlaced {
        key: String,
        x: f64,
        y: f64,
        z: f64,
        color: u32,
    },
    BlockRemoved {
        key: String,
    },
    BlocksRemovedBatch {
        keys: Vec<String>,
    },
    TilePlaced {
        key: String,
        x: f64,
        z: f64,
    },
    CloudPlaced(Decoration),
    CloudRemoved {
        id: String,
    },
    SunPlaced(Decoration),
    SunRemoved {
        id: String,
    },
    RainbowPlaced(Decoration),
    RainbowRemoved {
        id: String,
    },
    BackgroundColorChanged {
        color: u32,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitialState(_) => "initial-state",
            ServerEvent::UserCount(_) => "user-count",
            ServerEvent::BlockPlaced { .. } => "block-placed",
            ServerEvent::BlockRemoved { .. } => "block-removed",
            ServerEvent::BlocksRemovedBatch { .. } => "blocks-removed-batch",
            ServerEvent::TilePlaced { .. } => "tile-placed",
            ServerEvent::CloudPlaced(_) => "cloud-placed",
            ServerEvent::CloudRemoved { .. } => "cloud-removed",
            ServerEvent::SunPlaced(_) => "sun-placed",
            ServerEvent::SunRemoved { .. } => "sun-removed",
            ServerEvent::RainbowPlaced(_) => "rainbow-placed",
            ServerEvent::RainbowRemoved { .. } => "rainbow-removed",
            ServerEvent::BackgroundColorChanged { .. } => "background-color-changed",
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, DEFAULT_BACKGROUND_COLOR};
    use serde_json::json;

    #[test]
    fn test_parse_place_block() {
        let event = ClientEvent::parse(
            r#"{"event":"place-block","data":{"key":"1,2,3","x":1,"y":2,"z":3,"color":16711680}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::PlaceBlock {
                key: "1,2,3".to_string(),
                x: 1.0,
                y: 2.0,
                z: 3.0,
                color: 0xff0000,
            }
        );
        assert_eq!(event.name(), "place-block");
    }

    #[test]
    fn test_parse_every_kind() {
        let cases = vec![
            ("remove-block", json!({"key": "a"})),
            ("remove-blocks-batch", json!({"keys": ["a", "b"]})),
            ("place-tile", json!({"key": "5,5", "x": 5, "z": 5})),
            ("place-cloud", json!({"id": "c", "x": 0, "y": 20, "z": 0})),
            ("place-sun", json!({"id": "s", "x": 0, "y": 40, "z": 0})),
            ("place-rainbow", json!({"id": "r", "x": 1, "y": 2, "z": 3})),
            ("remove-cloud", json!({"id": "c"})),
            ("remove-sun", json!({"id": "s"})),
            ("remove-rainbow", json!({"id": "r"})),
            ("set-background-color", json!({"color": 0})),
        ];

        for (kind, data) in cases {
            let event = ClientEvent::from_parts(kind, &data)
                .unwrap_or_else(|e| panic!("{} should parse: {}", kind, e));
            assert_eq!(event.name(), kind);
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let result = ClientEvent::from_parts("place-block", &json!({"key": "k", "x": 1, "y": 2}));
        assert_eq!(result, Err(ValidationError::MissingField("z")));

        let result = ClientEvent::from_parts("place-tile", &json!({"x": 1, "z": 2}));
        assert_eq!(result, Err(ValidationError::MissingField("key")));
    }

    #[test]
    fn test_non_numeric_position_is_rejected() {
        let result = ClientEvent::from_parts(
            "place-cloud",
            &json!({"id": "c", "x": "1", "y": 2, "z": 3}),
        );
        assert_eq!(result, Err(ValidationError::InvalidNumber("x")));

        let result = ClientEvent::from_parts(
            "place-rainbow",
            &json!({"id": "r", "x": 1, "y": null, "z": 3}),
        );
        assert_eq!(result, Err(ValidationError::InvalidNumber("y")));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let result = ClientEvent::from_parts("remove-block", &json!({"key": ""}));
        assert_eq!(result, Err(ValidationError::InvalidString("key")));

        let result = ClientEvent::from_parts("remove-sun", &json!({"id": 7}));
        assert_eq!(result, Err(ValidationError::InvalidString("id")));
    }

    #[test]
    fn test_background_color_validation() {
        let non_numeric = ClientEvent::from_parts("set-background-color", &json!({"color": "red"}));
        assert_eq!(non_numeric, Err(ValidationError::InvalidColor("color")));

        let negative = ClientEvent::from_parts("set-background-color", &json!({"color": -1}));
        assert_eq!(negative, Err(ValidationError::InvalidColor("color")));

        let too_large =
            ClientEvent::from_parts("set-background-color", &json!({"color": 0x1000000}));
        assert_eq!(too_large, Err(ValidationError::InvalidColor("color")));

        let fractional = ClientEvent::from_parts("set-background-color", &json!({"color": 1.5}));
        assert_eq!(fractional, Err(ValidationError::InvalidColor("color")));

        let whole_float =
            ClientEvent::from_parts("set-background-color", &json!({"color": 255.0})).unwrap();
        assert_eq!(whole_float, ClientEvent::SetBackgroundColor { color: 255 });

        let missing = ClientEvent::from_parts("set-background-color", &json!({}));
        assert_eq!(missing, Err(ValidationError::MissingField("color")));
    }

    #[test]
    fn test_key_list_validation() {
        let empty = ClientEvent::from_parts("remove-blocks-batch", &json!({"keys": []})).unwrap();
        assert_eq!(empty, ClientEvent::RemoveBlocksBatch { keys: vec![] });

        let not_array = ClientEvent::from_parts("remove-blocks-batch", &json!({"keys": "a"}));
        assert_eq!(not_array, Err(ValidationError::InvalidKeyList("keys")));

        let mixed = ClientEvent::from_parts("remove-blocks-batch", &json!({"keys": ["a", 1]}));
        assert_eq!(mixed, Err(ValidationError::InvalidKeyList("keys")));
    }

    #[test]
    fn test_envelope_errors() {
        assert!(matches!(
            ClientEvent::parse("not json"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            ClientEvent::parse(r#"{"data":{}}"#),
            Err(ValidationError::Malformed(_))
        ));
        assert_eq!(
            ClientEvent::parse(r#"{"event":"place-block"}"#),
            Err(ValidationError::NotAnObject)
        );
        assert_eq!(
            ClientEvent::parse(r#"{"event":"place-block","data":[1,2]}"#),
            Err(ValidationError::NotAnObject)
        );
        assert_eq!(
            ClientEvent::parse(r#"{"event":"user-count","data":{}}"#),
            Err(ValidationError::UnknownEvent("user-count".to_string()))
        );
    }

    #[test]
    fn test_client_event_serializes_to_parseable_envelope() {
        let event = ClientEvent::PlaceSun(Decoration::new("sun-1", 3.0, 50.0, -2.0));
        let text = event.to_text().unwrap();
        assert_eq!(ClientEvent::parse(&text).unwrap(), event);
    }

    #[test]
    fn test_server_event_envelope_shape() {
        let event = ServerEvent::TilePlaced {
            key: "5,5".to_string(),
            x: 5.0,
            z: 5.0,
        };
        let value: Value = serde_json::from_str(&event.to_text().unwrap()).unwrap();
        assert_eq!(value["event"], "tile-placed");
        assert_eq!(value["data"]["key"], "5,5");
        assert_eq!(value["data"]["x"], 5.0);

        let count: Value =
            serde_json::from_str(&ServerEvent::UserCount(3).to_text().unwrap()).unwrap();
        assert_eq!(count, json!({"event": "user-count", "data": 3}));
    }

    #[test]
    fn test_initial_state_shape() {
        let mut world = WorldSnapshot::default();
        world
            .blocks
            .insert("0,0,0".to_string(), Block::new(0.0, 0.0, 0.0, 0x00ff00));
        world.last_saved = Some("2024-01-01T00:00:00.000Z".to_string());

        let event = ServerEvent::InitialState(InitialState {
            world,
            user_id: "abc".to_string(),
        });
        let value: Value = serde_json::from_str(&event.to_text().unwrap()).unwrap();

        assert_eq!(value["event"], "initial-state");
        assert_eq!(value["data"]["userId"], "abc");
        assert_eq!(value["data"]["backgroundColor"], DEFAULT_BACKGROUND_COLOR);
        assert_eq!(value["data"]["blocks"]["0,0,0"]["color"], 0x00ff00);
        assert_eq!(value["data"]["clouds"], json!([]));
        assert!(value["data"].get("lastSaved").is_none());

        match ServerEvent::from_text(&event.to_text().unwrap()).unwrap() {
            ServerEvent::InitialState(state) => {
                assert_eq!(state.user_id, "abc");
                assert_eq!(state.world.blocks.len(), 1);
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }
}
