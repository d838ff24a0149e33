//! Session manager.
//!
//! Every client gets its own [`Session`]: a private document registry and
//! orchestrator. Nothing is shared between sessions except the embedder
//! and generator handles, which are stateless per call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::chunk::Chunker;
use crate::embedding::Embedder;
use crate::generation::Generator;
use crate::orchestrator::{RetrievalOrchestrator, RetrievalSettings};
use crate::registry::DocumentRegistry;

/// One client's documents and index.
pub struct Session {
    id: String,
    registry: Mutex<DocumentRegistry>,
    orchestrator: RetrievalOrchestrator,
    write_gate: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the registry. Never hold the guard across an `.await`.
    pub fn registry(&self) -> MutexGuard<'_, DocumentRegistry> {
        self.registry.lock()
    }

    pub fn orchestrator(&self) -> &RetrievalOrchestrator {
        &self.orchestrator
    }

    /// Serialize mutating operations (upload, delete, reset) on this session.
    ///
    /// Queries do not take this gate.
    pub async fn write_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }
}

/// Creates sessions on first use and hands out shared handles to them.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    chunker: Chunker,
    settings: RetrievalSettings,
}

impl SessionManager {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        chunker: Chunker,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            embedder,
            generator,
            chunker,
            settings,
        }
    }

    /// Fresh random session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Return the session for `session_id`, creating an empty one if needed.
    pub fn get_or_create(&self, session_id: &str) -> Arc<Session> {
        if let Some(existing) = self.sessions.read().get(session_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = session_id, "creating session");
                Arc::new(self.create(session_id))
            });
        Arc::clone(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn create(&self, session_id: &str) -> Session {
        Session {
            id: session_id.to_string(),
            registry: Mutex::new(DocumentRegistry::new()),
            orchestrator: RetrievalOrchestrator::new(
                Arc::clone(&self.embedder),
                Arc::clone(&self.generator),
                self.chunker.clone(),
                self.settings.clone(),
            ),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }
}
