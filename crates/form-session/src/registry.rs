use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use form_spec::MessageCatalog;

use crate::session::{FormSession, SessionError, SessionObserver, SubmitContext};
use crate::transport::{FormTransport, SubmitFormResponse};

pub type SessionHandle = Arc<Mutex<FormSession>>;

/// Mounted sessions keyed by container id. Each container owns at most one
/// session; results of fetches and submissions for a session that was
/// destroyed or replaced meanwhile are dropped.
pub struct SessionRegistry {
    transport: Arc<dyn FormTransport>,
    messages: Arc<MessageCatalog>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn FormTransport>) -> Self {
        Self {
            transport,
            messages: Arc::new(MessageCatalog::default()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_messages(mut self, messages: Arc<MessageCatalog>) -> Self {
        self.messages = messages;
        self
    }

    pub fn transport(&self) -> &Arc<dyn FormTransport> {
        &self.transport
    }

    /// Registers a fresh loading session, replacing any previous one for the
    /// same container.
    pub fn create(
        &self,
        container_id: &str,
        form_id: &str,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> SessionHandle {
        let mut session = FormSession::new(form_id).with_messages(Arc::clone(&self.messages));
        if let Some(observer) = observer {
            session = session.with_observer(observer);
        }
        let handle = Arc::new(Mutex::new(session));
        if lock(&self.sessions)
            .insert(container_id.to_string(), Arc::clone(&handle))
            .is_some()
        {
            tracing::debug!(container = container_id, "replaced mounted session");
        }
        tracing::info!(container = container_id, form = form_id, "session created");
        handle
    }

    pub fn get(&self, container_id: &str) -> Option<SessionHandle> {
        lock(&self.sessions).get(container_id).cloned()
    }

    pub fn destroy(&self, container_id: &str) -> bool {
        let removed = lock(&self.sessions).remove(container_id).is_some();
        if removed {
            tracing::info!(container = container_id, "session destroyed");
        }
        removed
    }

    pub fn destroy_all(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_current(&self, container_id: &str, handle: &SessionHandle) -> bool {
        lock(&self.sessions)
            .get(container_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    fn current(&self, container_id: &str) -> Result<SessionHandle, SessionError> {
        self.get(container_id)
            .ok_or_else(|| SessionError::Closed(container_id.to_string()))
    }

    /// Creates a session and loads its definition.
    pub async fn mount(
        &self,
        container_id: &str,
        form_id: &str,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Result<SessionHandle, SessionError> {
        let handle = self.create(container_id, form_id, observer);
        self.load(container_id).await?;
        Ok(handle)
    }

    /// Fetches the definition for the container's session.
    pub async fn load(&self, container_id: &str) -> Result<(), SessionError> {
        let handle = self.current(container_id)?;
        let form_id = lock(&handle).form_id().to_string();
        let result = self.transport.fetch_form(&form_id).await;

        if !self.is_current(container_id, &handle) {
            tracing::debug!(container = container_id, "discarding fetch for an unmounted session");
            return Err(SessionError::Closed(container_id.to_string()));
        }
        let mut session = lock(&handle);
        match result {
            Ok(definition) => {
                session.apply_definition(definition);
                Ok(())
            }
            Err(err) => Err(session.fail_load(err)),
        }
    }

    /// Submits the container's session with the values present right now.
    pub async fn submit(
        &self,
        container_id: &str,
        context: &SubmitContext,
    ) -> Result<SubmitFormResponse, SessionError> {
        let handle = self.current(container_id)?;
        let (form_id, request) = {
            let mut session = lock(&handle);
            let request = session.begin_submit(context)?;
            (session.form_id().to_string(), request)
        };
        let result = self.transport.submit_form(&form_id, &request).await;

        if !self.is_current(container_id, &handle) {
            tracing::debug!(
                container = container_id,
                "discarding submit result for an unmounted session"
            );
            return Err(SessionError::Closed(container_id.to_string()));
        }
        lock(&handle).finish_submit(result)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut containers: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        containers.sort();
        f.debug_struct("SessionRegistry")
            .field("containers", &containers)
            .finish()
    }
}
