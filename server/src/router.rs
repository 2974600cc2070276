//! Dispatch of client edits: validate, apply, persist, broadcast.

use crate::hub::WorldHub;
use log::{debug, error, warn};
use shared::{Block, ClientEvent, DecorationKind, ServerEvent, Tile, ValidationError};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Applied and echoed to every connection. `persisted` is false when the
    /// save failed; the broadcast still went out.
    Broadcast {
        event: ServerEvent,
        persisted: bool,
        delivered: usize,
    },
    /// Valid, but removing something that does not exist. Nothing was saved
    /// or sent.
    Unchanged,
    /// Dropped without touching the world.
    Rejected(ValidationError),
}

impl WorldHub {
    /// Handles one raw text frame from `origin`.
    pub fn handle_text(&mut self, origin: &str, text: &str) -> Outcome {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle_event(origin, event),
            Err(e) => {
                warn!("Dropped message from {}: {}", origin, e);
                Outcome::Rejected(e)
            }
        }
    }

    /// Applies an already parsed edit.
    pub fn handle_event(&mut self, origin: &str, event: ClientEvent) -> Outcome {
        let kind = event.name();

        let confirmed = match self.apply(event) {
            Ok(Some(confirmed)) => confirmed,
            Ok(None) => {
                debug!("{} from {} matched nothing", kind, origin);
                return Outcome::Unchanged;
            }
            Err(e) => {
                warn!("Rejected {} from {}: {}", kind, origin, e);
                return Outcome::Rejected(e);
            }
        };

        let persisted = self.checkpoint();
        if !persisted {
            error!(
                "World was not saved after {} from {}, broadcasting anyway",
                kind, origin
            );
        }

        let delivered = self.registry.broadcast(&confirmed);
        debug!(
            "{} from {} applied, sent to {} connections",
            kind, origin, delivered
        );

        Outcome::Broadcast {
            event: confirmed,
            persisted,
            delivered,
        }
    }

    /// Mutates the world and returns the event confirming the change, or
    /// `None` if the request was a no-op.
    fn apply(&mut self, event: ClientEvent) -> Result<Option<ServerEvent>, ValidationError> {
        let world = &mut self.world;

        let confirmed = match event {
            ClientEvent::PlaceBlock {
                key,
                x,
                y,
                z,
                color,
            } => {
                world.place_block(key.clone(), Block::new(x, y, z, color));
                ServerEvent::BlockPlaced {
                    key,
                    x,
                    y,
                    z,
                    color,
                }
            }
            ClientEvent::RemoveBlock { key } => {
                if !world.remove_block(&key) {
                    return Ok(None);
                }
                ServerEvent::BlockRemoved { key }
            }
            // Always echoed with the full key list, present or not.
            ClientEvent::RemoveBlocksBatch { keys } => {
                let removed = world.remove_blocks_batch(&keys);
                debug!("Batch removal: {} of {} keys present", removed, keys.len());
                ServerEvent::BlocksRemovedBatch { keys }
            }
            ClientEvent::PlaceTile { key, x, z } => {
                world.place_tile(key.clone(), Tile::new(x, z));
                ServerEvent::TilePlaced { key, x, z }
            }
            ClientEvent::PlaceCloud(cloud) => {
                world.place_decoration(DecorationKind::Cloud, cloud.clone());
                ServerEvent::CloudPlaced(cloud)
            }
            ClientEvent::PlaceSun(sun) => {
                world.place_decoration(DecorationKind::Sun, sun.clone());
                ServerEvent::SunPlaced(sun)
            }
            ClientEvent::PlaceRainbow(rainbow) => {
                world.place_decoration(DecorationKind::Rainbow, rainbow.clone());
                ServerEvent::RainbowPlaced(rainbow)
            }
            ClientEvent::RemoveCloud { id } => {
                if !world.remove_decoration(DecorationKind::Cloud, &id) {
                    return Ok(None);
                }
                ServerEvent::CloudRemoved { id }
            }
            ClientEvent::RemoveSun { id } => {
                if !world.remove_decoration(DecorationKind::Sun, &id) {
                    return Ok(None);
                }
                ServerEvent::SunRemoved { id }
            }
            ClientEvent::RemoveRainbow { id } => {
                if !world.remove_decoration(DecorationKind::Rainbow, &id) {
                    return Ok(None);
                }
                ServerEvent::RainbowRemoved { id }
            }
            ClientEvent::SetBackgroundColor { color } => {
                world.set_background_color(color)?;
                ServerEvent::BackgroundColorChanged { color }
            }
        };

        Ok(Some(confirmed))
    }
}
