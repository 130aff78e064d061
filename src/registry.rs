use crate::session::GloveSession;
use crate::transport::GattEvent;
use crate::types::{GloveData, Handedness, SessionState};
use crate::{GloveError, Result};
use std::sync::{Arc, Mutex, MutexGuard};

/// A session shared with transport callbacks that may run on other threads.
pub type SharedSession = Arc<Mutex<GloveSession>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, GloveSession> {
    // A panic while holding the lock leaves plain data behind; keep serving it.
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// All glove sessions known to the host, keyed by peripheral id.
#[derive(Default)]
pub struct GloveRegistry {
    gloves: Mutex<Vec<SharedSession>>,
}

impl GloveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn gloves(&self) -> MutexGuard<'_, Vec<SharedSession>> {
        self.gloves.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a session, replacing (and closing) any previous session for the same peripheral.
    pub fn insert(&self, session: GloveSession) -> SharedSession {
        let id = session.id().to_string();
        let shared = Arc::new(Mutex::new(session));
        let mut gloves = self.gloves();

        if let Some(pos) = gloves.iter().position(|g| lock(g).id() == id) {
            log::info!("Replacing session for {}", id);
            let old = std::mem::replace(&mut gloves[pos], shared.clone());
            lock(&old).close();
        } else {
            log::info!("Registered session for {}", id);
            gloves.push(shared.clone());
        }
        shared
    }

    /// Remove and close the session for a peripheral.
    pub fn remove(&self, id: &str) -> Option<SharedSession> {
        let mut gloves = self.gloves();
        let pos = gloves.iter().position(|g| lock(g).id() == id)?;
        let removed = gloves.remove(pos);
        lock(&removed).close();
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.gloves().iter().find(|g| lock(g).id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.gloves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gloves().is_empty()
    }

    /// First connected, ready glove worn on `hand`.
    pub fn find(&self, hand: Handedness) -> Option<SharedSession> {
        self.gloves()
            .iter()
            .find(|g| {
                let s = lock(g);
                s.state() == SessionState::Ready && s.is_connected() && s.handedness() == hand
            })
            .cloned()
    }

    /// Latest snapshot of the glove worn on `hand`.
    pub fn data(&self, hand: Handedness) -> Result<GloveData> {
        let glove = self.find(hand).ok_or(GloveError::Disconnected)?;
        let data = lock(&glove).data();
        Ok(data)
    }

    /// Route a transport event to the session of peripheral `id`.
    ///
    /// Sessions that reached a terminal state are dropped from the registry.
    pub fn dispatch(&self, id: &str, event: GattEvent) -> bool {
        let Some(glove) = self.get(id) else {
            log::debug!("No session for {}, event dropped", id);
            return false;
        };

        let terminal = {
            let mut session = lock(&glove);
            session.handle_event(event);
            session.state().is_terminal()
        };

        if terminal {
            self.gloves().retain(|g| !Arc::ptr_eq(g, &glove));
            log::info!("Session for {} ended", id);
        }
        true
    }

    /// Close every session and empty the registry.
    pub fn close_all(&self) {
        for glove in self.gloves().drain(..) {
            lock(&glove).close();
        }
    }
}
