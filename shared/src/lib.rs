use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod protocol;

pub use protocol::{ClientEvent, InitialState, ServerEvent, ValidationError};

/// Sky blue, used when a world has never had its background changed.
pub const DEFAULT_BACKGROUND_COLOR: u32 = 0x87CEEB;
/// Largest value a 24-bit RGB color can take.
pub const MAX_RGB: u32 = 0xFFFFFF;
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STATE_FILE: &str = "game-state.json";

/// A voxel occupying one grid cell. Stored under a key derived from its coordinates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Block {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: u32,
}

impl Block {
    pub fn new(x: f64, y: f64, z: f64, color: u32) -> Self {
        Self { x, y, z, color }
    }
}

/// A ground tile on the x/z plane.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tile {
    pub x: f64,
    pub z: f64,
}

impl Tile {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }
}

/// A cloud, sun or rainbow. The id is generated by the client that placed it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Decoration {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Decoration {
    pub fn new(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecorationKind {
    Cloud,
    Sun,
    Rainbow,
}

impl DecorationKind {
    pub const ALL: [DecorationKind; 3] = [
        DecorationKind::Cloud,
        DecorationKind::Sun,
        DecorationKind::Rainbow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DecorationKind::Cloud => "cloud",
            DecorationKind::Sun => "sun",
            DecorationKind::Rainbow => "rainbow",
        }
    }
}

/// Point-in-time copy of the whole world.
///
/// This is both the on-disk document and the body of the `initial-state`
/// message. Every field defaults when absent so older or hand-edited files
/// still load. `last_saved` is only ever read from disk; the persistence layer
/// writes it next to the snapshot, so it never travels to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub blocks: BTreeMap<String, Block>,
    pub tiles: BTreeMap<String, Tile>,
    pub clouds: Vec<Decoration>,
    pub suns: Vec<Decoration>,
    pub rainbows: Vec<Decoration>,
    pub background_color: u32,
    #[serde(skip_serializing)]
    pub last_saved: Option<String>,
}

impl Default for WorldSnapshot {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            tiles: BTreeMap::new(),
            clouds: Vec::new(),
            suns: Vec::new(),
            rainbows: Vec::new(),
            background_color: DEFAULT_BACKGROUND_COLOR,
            last_saved: None,
        }
    }
}

impl WorldSnapshot {
    pub fn decorations(&self, kind: DecorationKind) -> &[Decoration] {
        match kind {
            DecorationKind::Cloud => &self.clouds,
            DecorationKind::Sun => &self.suns,
            DecorationKind::Rainbow => &self.rainbows,
        }
    }

    /// True when nothing has been placed. The background color does not count.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.tiles.is_empty()
            && DecorationKind::ALL
                .iter()
                .all(|kind| self.decorations(*kind).is_empty())
    }

    /// One-line description used by load/save/connect logging.
    pub fn summary(&self) -> String {
        format!(
            "{} blocks, {} tiles, {} clouds, {} suns, {} rainbows, background #{:06x}",
            self.blocks.len(),
            self.tiles.len(),
            self.clouds.len(),
            self.suns.len(),
            self.rainbows.len(),
            self.background_color
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_default_snapshot_is_empty_sky_blue() {
        let snapshot = WorldSnapshot::default();
        assert!(snapshot.blocks.is_empty());
        assert!(snapshot.tiles.is_empty());
        assert!(snapshot.clouds.is_empty());
        assert!(snapshot.suns.is_empty());
        assert!(snapshot.rainbows.is_empty());
        assert_eq!(snapshot.background_color, 0x87CEEB);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_background_color_does_not_make_world_non_empty() {
        let snapshot = WorldSnapshot {
            background_color: 0x000000,
            ..WorldSnapshot::default()
        };
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_any_entity_makes_world_non_empty() {
        let mut snapshot = WorldSnapshot::default();
        snapshot.rainbows.push(Decoration::new("r1", 0.0, 10.0, 0.0));
        assert!(!snapshot.is_empty());

        let mut snapshot = WorldSnapshot::default();
        snapshot.tiles.insert("0,0".to_string(), Tile::new(0.0, 0.0));
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_missing_fields_default_on_deserialize() {
        let snapshot: WorldSnapshot =
            serde_json::from_str(r#"{"blocks":{"1,2,3":{"x":1,"y":2,"z":3,"color":255}}}"#)
                .unwrap();

        assert_eq!(snapshot.blocks.len(), 1);
        assert_eq!(snapshot.blocks["1,2,3"], Block::new(1.0, 2.0, 3.0, 255));
        assert!(snapshot.tiles.is_empty());
        assert!(snapshot.suns.is_empty());
        assert_eq!(snapshot.background_color, DEFAULT_BACKGROUND_COLOR);
        assert_eq!(snapshot.last_saved, None);
    }

    #[test]
    fn test_explicit_black_background_is_kept() {
        let snapshot: WorldSnapshot = serde_json::from_str(r#"{"backgroundColor":0}"#).unwrap();
        assert_eq!(snapshot.background_color, 0);
    }

    #[test]
    fn test_legacy_users_field_is_ignored() {
        let snapshot: WorldSnapshot =
            serde_json::from_str(r#"{"users":{"abc":{"id":"abc"}},"suns":[]}"#).unwrap();
        assert_eq!(snapshot, WorldSnapshot::default());
    }

    #[test]
    fn test_last_saved_is_read_but_never_written() {
        let snapshot: WorldSnapshot =
            serde_json::from_str(r#"{"lastSaved":"2024-05-01T10:00:00.000Z"}"#).unwrap();
        assert_eq!(
            snapshot.last_saved.as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );

        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value.get("lastSaved").is_none());
        assert_eq!(value["backgroundColor"], 0x87CEEB);
    }

    #[test]
    fn test_decoration_positions_keep_fractions() {
        let cloud: Decoration =
            serde_json::from_str(r#"{"id":"c-1","x":1.25,"y":30.5,"z":-4.75}"#).unwrap();
        assert_eq!(cloud.id, "c-1");
        assert_approx_eq!(cloud.x, 1.25);
        assert_approx_eq!(cloud.y, 30.5);
        assert_approx_eq!(cloud.z, -4.75);
    }

    #[test]
    fn test_summary_formats_background_as_hex() {
        let mut snapshot = WorldSnapshot::default();
        snapshot
            .blocks
            .insert("0,0,0".to_string(), Block::new(0.0, 0.0, 0.0, 0xff0000));
        assert_eq!(
            snapshot.summary(),
            "1 blocks, 0 tiles, 0 clouds, 0 suns, 0 rainbows, background #87ceeb"
        );
    }

    #[test]
    fn test_decoration_kind_names() {
        let names: Vec<&str> = DecorationKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["cloud", "sun", "rainbow"]);
    }
}
