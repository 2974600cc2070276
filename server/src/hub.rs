use crate::connections::ConnectionRegistry;
use crate::persistence::PersistenceStore;
use crate::world::WorldState;
use log::{debug, info};

/// Single owner of the world, its backing store, and the open connections.
///
/// Everything that reads or changes the world goes through `&mut WorldHub`,
/// and the network layer drives the hub from exactly one task. That makes each
/// mutation's validate, apply, persist and broadcast steps one uninterrupted
/// unit, and gives all mutations a single global order.
///
/// The mutation dispatch lives in `router.rs` and the connect/disconnect
/// handling in `session.rs`.
#[derive(Debug)]
pub struct WorldHub {
    pub(crate) world: WorldState,
    pub(crate) store: PersistenceStore,
    pub(crate) registry: ConnectionRegistry,
}

impl WorldHub {
    pub fn new(world: WorldState, store: PersistenceStore) -> Self {
        Self {
            world,
            store,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Builds a hub from whatever the store holds, or an empty world.
    pub fn load(store: PersistenceStore) -> Self {
        let world = WorldState::from_snapshot(store.load());
        Self::new(world, store)
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    /// Persists the current world immediately.
    pub fn checkpoint(&self) -> bool {
        self.store.save(&self.world.snapshot())
    }

    /// Timer-driven save. Skipped while the world holds no entities; returns
    /// `None` when skipped, otherwise whether the save succeeded.
    pub fn periodic_checkpoint(&self) -> Option<bool> {
        if self.world.is_empty() {
            return None;
        }
        debug!("Periodic save");
        Some(self.checkpoint())
    }

    /// Best-effort save on the way out.
    pub fn final_flush(&self) -> bool {
        info!("Writing final world snapshot to {}", self.store.path().display());
        self.checkpoint()
    }

    /// Final flush, then asks every connection to close.
    pub fn shutdown(&mut self) -> bool {
        let saved = self.final_flush();
        let closed = self.registry.close_all();
        info!("Closed {} connections", closed);
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Block, Decoration, DecorationKind};
    use tempfile::TempDir;

    fn hub_in(dir: &TempDir) -> WorldHub {
        WorldHub::load(PersistenceStore::new(dir.path().join("world.json")))
    }

    #[test]
    fn test_load_without_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let hub = hub_in(&dir);

        assert!(hub.world().is_empty());
        assert!(hub.registry().is_empty());
        assert!(!hub.store().path().exists());
    }

    #[test]
    fn test_periodic_checkpoint_skips_empty_world() {
        let dir = TempDir::new().unwrap();
        let mut hub = hub_in(&dir);
        hub.world.set_background_color(0x000000).unwrap();

        assert_eq!(hub.periodic_checkpoint(), None);
        assert!(!hub.store().path().exists());
    }

    #[test]
    fn test_periodic_checkpoint_saves_non_empty_world() {
        let dir = TempDir::new().unwrap();
        let mut hub = hub_in(&dir);
        hub.world.place_decoration(
            DecorationKind::Cloud,
            Decoration::new("c", 0.0, 10.0, 0.0),
        );

        assert_eq!(hub.periodic_checkpoint(), Some(true));
        assert!(hub.store().path().exists());
    }

    #[test]
    fn test_final_flush_persists_even_empty_world() {
        let dir = TempDir::new().unwrap();
        let hub = hub_in(&dir);

        assert!(hub.final_flush());
        assert!(hub.store().path().exists());
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let mut hub = hub_in(&dir);
            hub.world.place_block("2,0,2", Block::new(2.0, 0.0, 2.0, 0x00ff00));
            assert!(hub.checkpoint());
        }

        let restarted = hub_in(&dir);
        assert_eq!(
            restarted.world().block("2,0,2"),
            Some(&Block::new(2.0, 0.0, 2.0, 0x00ff00))
        );
    }
}
