//! Registry of live sessions, addressed by generational ids.
//!
//! The output never holds a session directly. It holds a [`CompletionHandle`],
//! which resolves the session through the registry on every callback. Destroying
//! a session removes its slot first, so a late callback resolves to nothing and
//! becomes a no-op instead of touching freed state.

use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::pool::PcmBuffer;
use crate::session::{SessionCore, lock_core};

/// Stable handle to a registry slot. A reused slot gets a new generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

pub(crate) type SharedCore = Arc<Mutex<SessionCore>>;

#[derive(Default)]
struct Slot {
    generation: u32,
    session: Option<SharedCore>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Slots>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide registry used by sessions that don't bring their own.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<SessionRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new).clone()
    }

    pub(crate) fn insert(&self, session: SharedCore) -> SessionId {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = g.vacant.pop() {
            let slot = &mut g.slots[index as usize];
            slot.session = Some(session);
            return SessionId {
                index,
                generation: slot.generation,
            };
        }
        let index = g.slots.len() as u32;
        g.slots.push(Slot {
            generation: 0,
            session: Some(session),
        });
        SessionId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, id: SessionId) -> Option<SharedCore> {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let slot = g.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.session.clone()
    }

    /// Invalidate `id`. Later lookups with it return `None`.
    pub(crate) fn remove(&self, id: SessionId) -> Option<SharedCore> {
        let mut g = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let slot = g.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation || slot.session.is_none() {
            return None;
        }
        let session = slot.session.take();
        slot.generation = slot.generation.wrapping_add(1);
        g.vacant.push(id.index);
        session
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        let g = self.inner.read().unwrap_or_else(|e| e.into_inner());
        g.slots.iter().filter(|s| s.session.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Back-reference given to an output for its completion callback.
#[derive(Clone)]
pub struct CompletionHandle {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl CompletionHandle {
    pub(crate) fn new(registry: Arc<SessionRegistry>, id: SessionId) -> Self {
        Self { registry, id }
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Report that `buffer` finished playing.
    ///
    /// Runs one feed step on the caller's thread. If the session is gone, the
    /// buffer is dropped and nothing else happens.
    pub fn complete(&self, buffer: PcmBuffer) {
        let Some(core) = self.registry.get(self.id) else {
            tracing::debug!(session = %self.id, "completion for retired session ignored");
            return;
        };
        lock_core(&core).on_complete(buffer);
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("session", &self.id)
            .finish()
    }
}
