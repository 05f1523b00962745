//! Shared fixtures for view tests: a signed-in context over the in-memory
//! backend and host, pinned to 2025-03-15 10:00 local time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, json};
use tokio_util::sync::CancellationToken;

use super::RenderContext;
use crate::backend::{MemoryBackend, Session, User};
use crate::config::{PortalSettings, SessionSettings};
use crate::datetime::DatePolicy;
use crate::facade::{CALENDAR, DataAccess, MACHINES, RECORDS, SCHEDULES, TEMPLATES};
use crate::host::MemoryHost;
use crate::prefs::Preferences;
use crate::session::SessionManager;

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 7, 0, 0)
        .single()
        .expect("fixed clock")
}

pub(crate) fn session() -> Session {
    let mut metadata = Map::new();
    metadata.insert("full_name".to_string(), json!("Ayşe Usta"));
    Session {
        access_token: "t".to_string(),
        refresh_token: None,
        expires_at: None,
        user: User {
            id: "u1".to_string(),
            email: Some("ayse@glohe.test".to_string()),
            user_metadata: metadata,
        },
    }
}

pub(crate) async fn context(
    signed_in: bool,
) -> (RenderContext, Arc<MemoryBackend>, Arc<MemoryHost>) {
    let backend = Arc::new(MemoryBackend::new());
    if signed_in {
        backend.set_session(Some(session()));
    }
    let host = Arc::new(MemoryHost::new());
    let prefs = Arc::new(Preferences::in_memory());
    let settings = SessionSettings {
        retry_delay: Duration::ZERO,
        ..SessionSettings::default()
    };
    let manager = SessionManager::new(backend.clone(), prefs.clone(), host.clone(), settings);
    manager.init().await;
    let data = DataAccess::new(
        backend.clone(),
        manager.clone(),
        &PortalSettings::default(),
        DatePolicy::default(),
    )
    .with_clock(now);
    let ctx = RenderContext {
        data: Arc::new(data),
        session: manager,
        prefs,
        host: host.clone(),
        cancel: CancellationToken::new(),
    };
    (ctx, backend, host)
}

pub(crate) fn seed_portal(backend: &MemoryBackend) {
    backend.seed(
        MACHINES,
        [
            json!({"id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres",
                   "category": "ÜK", "location": "Hol A", "status": "active"}),
            json!({"id": "m2", "machine_no": "TD-02", "machine_name": "Kompresör",
                   "category": "TD", "status": "passive"}),
        ],
    );
    backend.seed(
        SCHEDULES,
        [
            json!({"id": "s1", "machine_id": "m1", "maintenance_type": "Yağlama",
                   "frequency": "monthly", "months": [1, 6, 12], "is_active": true,
                   "created_at": "2025-01-02T08:00:00Z"}),
            json!({"id": "s2", "machine_id": "m2", "maintenance_type": "Filtre",
                   "frequency": "weekly", "months": [], "is_active": true,
                   "created_at": "2025-01-03T08:00:00Z"}),
        ],
    );
    backend.seed(
        CALENDAR,
        [
            json!({"id": "c1", "machine_id": "m1", "schedule_id": "s1",
                   "maintenance_type": "Yağlama", "frequency": "monthly",
                   "scheduled_date": "2025-01-10", "status": "completed",
                   "year": 2025, "month": 1, "week": 2}),
            json!({"id": "c2", "machine_id": "m2", "schedule_id": "s2",
                   "maintenance_type": "Filtre", "frequency": "weekly",
                   "scheduled_date": "2025-03-18", "status": "pending",
                   "year": 2025, "month": 3, "week": 3}),
        ],
    );
    backend.seed(
        RECORDS,
        [
            json!({"id": "r-soon", "machine_id": "m1", "schedule_id": "s1",
                   "maintenance_type": "Yağlama", "scheduled_date": "2025-03-18",
                   "status": "pending", "priority": 1}),
            json!({"id": "r-late", "machine_id": "m2", "schedule_id": "s2",
                   "maintenance_type": "Filtre", "scheduled_date": "2025-03-05",
                   "status": "overdue", "priority": 2}),
            json!({"id": "r-done", "machine_id": "m1", "schedule_id": "s1",
                   "maintenance_type": "Yağlama", "scheduled_date": "2025-03-02",
                   "status": "completed", "completed_date": "2025-03-03T08:00:00Z",
                   "checklist_results": {"itemA": true, "itemB": "temiz"},
                   "photos": ["memory://maintenance-photos/maintenance-photos/r-done/1.jpg"]}),
        ],
    );
    backend.seed(
        TEMPLATES,
        [json!({"id": "t1", "name": "Genel", "is_default": true,
                "items": [
                    {"id": "itemA", "type": "checkbox", "label": "Yağ seviyesi", "required": true},
                    {"id": "itemB", "type": "text", "label": "Not"}
                ]})],
    );
}
