//! Connect and disconnect handling.
//!
//! A new connection gets the full world before anything else: the hub runs on
//! one task, so no broadcast can be queued for the session between its
//! registration and its `initial-state` message.

use crate::connections::Session;
use crate::hub::WorldHub;
use log::{info, warn};
use shared::{InitialState, ServerEvent};

impl WorldHub {
    /// Registers the session, sends it the current world, then broadcasts the
    /// new connection count. Returns that count.
    pub fn connect(&mut self, session: Session) -> usize {
        let id = session.id.clone();
        self.registry.add(session);

        let world = self.world.snapshot();
        info!("Sending initial state to {}: {}", id, world.summary());
        let initial = ServerEvent::InitialState(InitialState {
            world,
            user_id: id.clone(),
        });
        if !self.registry.send_to(&id, &initial) {
            warn!("Session {} closed before it received the initial state", id);
        }

        let count = self.registry.count();
        self.registry.broadcast(&ServerEvent::UserCount(count));
        count
    }

    /// Unregisters the session and broadcasts the new connection count to
    /// those that remain. Unknown ids are ignored and return `None`.
    pub fn disconnect(&mut self, id: &str) -> Option<usize> {
        self.registry.remove(id)?;

        let count = self.registry.count();
        self.registry.broadcast(&ServerEvent::UserCount(count));
        Some(count)
    }
}
