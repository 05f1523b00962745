//! Wiring: one backend, one preference store and one host shared by the
//! session manager, the data facade and the router.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::backend::{Backend, RestBackend};
use crate::config::PortalSettings;
use crate::datetime::DatePolicy;
use crate::facade::DataAccess;
use crate::host::{Host, MemoryHost};
use crate::prefs::{FileStore, Preferences, keys};
use crate::router::{Router, ViewRegistry};
use crate::session::{SessionManager, SessionState};

pub struct Portal {
    pub session: Arc<SessionManager>,
    pub data: Arc<DataAccess>,
    pub prefs: Arc<Preferences>,
    pub host: Arc<MemoryHost>,
    pub router: Router,
}

impl Portal {
    pub fn assemble(
        backend: Arc<dyn Backend>,
        prefs: Arc<Preferences>,
        settings: &PortalSettings,
        policy: DatePolicy,
    ) -> Self {
        let host = Arc::new(MemoryHost::new());
        let shared_host: Arc<dyn Host> = host.clone();
        let session = SessionManager::new(
            backend.clone(),
            prefs.clone(),
            shared_host.clone(),
            settings.session,
        );
        let data = Arc::new(DataAccess::new(backend, session.clone(), settings, policy));
        let router = Router::new(
            ViewRegistry::standard(),
            data.clone(),
            prefs.clone(),
            shared_host,
        );
        Self {
            session,
            data,
            prefs,
            host,
            router,
        }
    }

    /// REST backend with preferences stored under `data_dir`. A token saved
    /// by an earlier run is reused when none is configured.
    #[tracing::instrument(skip(settings))]
    pub fn open(settings: &PortalSettings, data_dir: &Path) -> anyhow::Result<Self> {
        let store = FileStore::open(data_dir).context("failed to open preference store")?;
        let prefs = Arc::new(Preferences::load(Box::new(store)).context("failed to load preferences")?);

        let mut settings = settings.clone();
        if settings.token.is_none()
            && let Some(saved) = prefs.get(keys::AUTH_TOKEN)
        {
            debug!("reusing saved access token");
            settings.token = Some(saved);
        }

        let backend = RestBackend::from_settings(&settings).context("backend is not configured")?;
        let policy = DatePolicy::resolve(&settings.timezone);
        info!(timezone = %policy.timezone(), "portal assembled");
        Ok(Self::assemble(Arc::new(backend), prefs, &settings, policy))
    }

    /// Session recovery only; the CLI does not need a first view mounted.
    pub async fn sign_in(&self) -> anyhow::Result<()> {
        match self.session.init().await {
            SessionState::Authenticated => {
                self.session.record_activity(self.data.now());
                Ok(())
            }
            state => anyhow::bail!("not signed in ({state:?}); pass --token or set PORTAL_TOKEN"),
        }
    }
}
