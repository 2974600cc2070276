use log::debug;
use shared::{
    Block, Decoration, DecorationKind, Tile, ValidationError, WorldSnapshot,
    DEFAULT_BACKGROUND_COLOR, MAX_RGB,
};
use std::collections::BTreeMap;

/// The authoritative in-memory world.
///
/// Blocks and tiles are keyed maps with overwrite-on-insert: placing onto an
/// occupied key replaces the previous record outright (last write wins).
/// Decorations are kept per kind in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldState {
    blocks: BTreeMap<String, Block>,
    tiles: BTreeMap<String, Tile>,
    clouds: Vec<Decoration>,
    suns: Vec<Decoration>,
    rainbows: Vec<Decoration>,
    background_color: u32,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            tiles: BTreeMap::new(),
            clouds: Vec::new(),
            suns: Vec::new(),
            rainbows: Vec::new(),
            background_color: DEFAULT_BACKGROUND_COLOR,
        }
    }

    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            blocks: snapshot.blocks,
            tiles: snapshot.tiles,
            clouds: snapshot.clouds,
            suns: snapshot.suns,
            rainbows: snapshot.rainbows,
            background_color: snapshot.background_color,
        }
    }

    /// Copies the current state. Callers hold the only reference to the world
    /// while this runs, so the copy is never taken mid-mutation.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            blocks: self.blocks.clone(),
            tiles: self.tiles.clone(),
            clouds: self.clouds.clone(),
            suns: self.suns.clone(),
            rainbows: self.rainbows.clone(),
            background_color: self.background_color,
            last_saved: None,
        }
    }

    /// Inserts or overwrites the block at `key`, returning the replaced block.
    pub fn place_block(&mut self, key: impl Into<String>, block: Block) -> Option<Block> {
        let key = key.into();
        debug!("Placing block {} at ({}, {}, {})", key, block.x, block.y, block.z);
        self.blocks.insert(key, block)
    }

    /// Returns true if a block was removed.
    pub fn remove_block(&mut self, key: &str) -> bool {
        self.blocks.remove(key).is_some()
    }

    /// Removes every listed key that is present and returns how many were.
    /// Absent keys are skipped.
    pub fn remove_blocks_batch(&mut self, keys: &[String]) -> usize {
        keys.iter()
            .filter(|key| self.blocks.remove(key.as_str()).is_some())
            .count()
    }

    /// Inserts or overwrites the tile at `key`. Tiles are never removed.
    pub fn place_tile(&mut self, key: impl Into<String>, tile: Tile) -> Option<Tile> {
        self.tiles.insert(key.into(), tile)
    }

    pub fn place_decoration(&mut self, kind: DecorationKind, decoration: Decoration) {
        self.decorations_mut(kind).push(decoration);
    }

    /// Removes the first decoration of `kind` whose id matches.
    pub fn remove_decoration(&mut self, kind: DecorationKind, id: &str) -> bool {
        let list = self.decorations_mut(kind);
        match list.iter().position(|d| d.id == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn set_background_color(&mut self, color: u32) -> Result<(), ValidationError> {
        if color > MAX_RGB {
            return Err(ValidationError::InvalidColor("color"));
        }
        self.background_color = color;
        Ok(())
    }

    pub fn block(&self, key: &str) -> Option<&Block> {
        self.blocks.get(key)
    }

    pub fn blocks(&self) -> &BTreeMap<String, Block> {
        &self.blocks
    }

    pub fn tile(&self, key: &str) -> Option<&Tile> {
        self.tiles.get(key)
    }

    pub fn tiles(&self) -> &BTreeMap<String, Tile> {
        &self.tiles
    }

    pub fn decorations(&self, kind: DecorationKind) -> &[Decoration] {
        match kind {
            DecorationKind::Cloud => &self.clouds,
            DecorationKind::Sun => &self.suns,
            DecorationKind::Rainbow => &self.rainbows,
        }
    }

    fn decorations_mut(&mut self, kind: DecorationKind) -> &mut Vec<Decoration> {
        match kind {
            DecorationKind::Cloud => &mut self.clouds,
            DecorationKind::Sun => &mut self.suns,
            DecorationKind::Rainbow => &mut self.rainbows,
        }
    }

    pub fn background_color(&self) -> u32 {
        self.background_color
    }

    /// True when no block, tile or decoration exists.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.tiles.is_empty()
            && self.clouds.is_empty()
            && self.suns.is_empty()
            && self.rainbows.is_empty()
    }
}
