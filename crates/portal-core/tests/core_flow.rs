use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use portal_core::app::Portal;
use portal_core::backend::{MemoryBackend, Session, User};
use portal_core::config::PortalSettings;
use portal_core::datetime::DatePolicy;
use portal_core::error::{PortalError, Result};
use portal_core::facade::{MACHINES, SCHEDULES};
use portal_core::host::Host;
use portal_core::model::{ChecklistAnswer, ChecklistResults, RecordChanges};
use portal_core::prefs::{FileStore, Preferences};
use portal_core::router::{MAIN_CONTAINER, ViewRegistry};
use portal_core::views::{self, RenderContext, View, ViewParams};
use portal_core::widgets::photos::{PhotoFile, PhotoStaging};
use serde_json::{Map, json};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn signed_in_backend() -> Arc<MemoryBackend> {
    let backend = MemoryBackend::with_session(Session {
        access_token: "token-1".to_string(),
        refresh_token: None,
        expires_at: None,
        user: User {
            id: "u1".to_string(),
            email: Some("teknik@glohe.test".to_string()),
            user_metadata: Map::new(),
        },
    });
    backend.seed(
        MACHINES,
        [json!({"id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres",
                "category": "ÜK", "status": "active"})],
    );
    Arc::new(backend)
}

fn settings() -> PortalSettings {
    let mut settings = PortalSettings::default();
    settings.session.retry_delay = Duration::ZERO;
    settings
}

fn portal(backend: &Arc<MemoryBackend>) -> Portal {
    Portal::assemble(
        backend.clone(),
        Arc::new(Preferences::in_memory()),
        &settings(),
        DatePolicy::default(),
    )
}

struct CountingView {
    cleanups: Arc<AtomicUsize>,
}

#[async_trait]
impl View for CountingView {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn render(&mut self, container: &str, _params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        ctx.host.set_html(container, "counted");
        Ok(())
    }

    fn cleanup(&mut self, _host: &dyn Host) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn start_opens_dashboard_and_unknown_names_fall_back() {
    let backend = signed_in_backend();
    let mut portal = portal(&backend);
    portal.router.start().await;
    assert!(portal.session.is_authenticated());
    assert!(portal.session.inactivity_timer_running());
    assert_eq!(portal.router.current_view(), Some(views::DASHBOARD));

    let shown = portal
        .router
        .show_view("not-a-view", ViewParams::default())
        .await;
    assert_eq!(shown, views::DASHBOARD);
    assert_eq!(portal.host.active_nav().as_deref(), Some(views::DASHBOARD));
}

#[tokio::test]
async fn repeated_show_view_keeps_one_mounted_instance() {
    let backend = signed_in_backend();
    let prefs = Arc::new(Preferences::in_memory());
    let cleanups = Arc::new(AtomicUsize::new(0));
    let mut registry = ViewRegistry::standard();
    let counter = cleanups.clone();
    registry.register("counting", move || {
        Box::new(CountingView {
            cleanups: counter.clone(),
        })
    });
    let mut portal = Portal::assemble(backend.clone(), prefs.clone(), &settings(), DatePolicy::default());
    portal.router = portal_core::router::Router::new(
        registry,
        portal.data.clone(),
        prefs,
        portal.host.clone(),
    );
    portal.sign_in().await.expect("sign in");

    portal.router.show_view("counting", ViewParams::default()).await;
    portal.router.show_view("counting", ViewParams::default()).await;
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(portal.host.html(MAIN_CONTAINER).as_deref(), Some("counted"));
    assert_eq!(portal.prefs.last_view().as_deref(), Some("counting"));
}

#[tokio::test]
async fn record_round_trip_keeps_checklist_and_joins_machine() {
    let backend = signed_in_backend();
    let portal = portal(&backend);
    portal.sign_in().await.expect("sign in");
    let cancel = CancellationToken::new();

    let mut checklist = ChecklistResults::new();
    checklist.insert("itemA".to_string(), ChecklistAnswer::Flag(true));
    checklist.insert("itemB".to_string(), ChecklistAnswer::Text("ok".to_string()));
    let created = portal
        .data
        .create_record(
            RecordChanges {
                machine_id: Some("m1".to_string()),
                maintenance_type: Some("Yağlama".to_string()),
                scheduled_date: NaiveDate::from_ymd_opt(2025, 4, 1),
                checklist_results: Some(checklist.clone()),
                ..RecordChanges::default()
            },
            None,
            &cancel,
        )
        .await
        .expect("create record");

    let fetched = portal
        .data
        .get_record(&created.id, &cancel)
        .await
        .expect("fetch record");
    assert_eq!(fetched.checklist_results, checklist);
    assert_eq!(fetched.performed_by.as_deref(), Some("u1"));
    let machine = fetched.machine.expect("machine joined");
    assert_eq!(machine.machine_no, "ÜK-01");
}

#[tokio::test]
async fn third_photo_and_wrong_type_never_reach_storage() {
    let backend = signed_in_backend();
    let portal = portal(&backend);
    let mut staging = PhotoStaging::new(portal.data.photo_limits().clone());

    let outcome = staging
        .add(vec![
            PhotoFile::new("a.jpg", "image/jpeg", vec![1; 16]),
            PhotoFile::new("notes.pdf", "application/pdf", vec![2; 16]),
        ])
        .expect("batch within limit");
    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.rejected.len(), 1);

    staging
        .add(vec![PhotoFile::new("b.png", "image/png", vec![3; 16])])
        .expect("second photo fits");
    let err = staging
        .add(vec![PhotoFile::new("c.png", "image/png", vec![4; 16])])
        .expect_err("third photo refused");
    assert!(matches!(err, PortalError::Validation(_)));
    assert_eq!(staging.total(), 2);
    assert_eq!(backend.calls_starting_with("upload"), 0);
}

#[tokio::test]
async fn schedule_months_render_as_turkish_names() {
    let backend = signed_in_backend();
    backend.seed(
        SCHEDULES,
        [json!({"id": "s1", "machine_id": "m1", "maintenance_type": "Yağlama",
                "frequency": "monthly", "months": [1, 6, 12], "is_active": true})],
    );
    let mut portal = portal(&backend);
    portal.sign_in().await.expect("sign in");
    portal
        .router
        .show_view(views::SCHEDULES, ViewParams::default())
        .await;
    let page = portal.host.html(MAIN_CONTAINER).expect("schedules drawn");
    assert!(page.contains("Ocak, Haziran, Aralık"));
}

#[tokio::test]
async fn logout_drops_the_session_and_clears_preferences() {
    let backend = signed_in_backend();
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    let prefs = Arc::new(Preferences::load(Box::new(store)).expect("load prefs"));
    let mut portal = Portal::assemble(backend.clone(), prefs, &settings(), DatePolicy::default());

    portal.router.start().await;
    assert!(portal.session.is_authenticated());
    assert!(portal.prefs.last_view().is_some());

    portal.router.logout().await;
    assert!(!portal.session.is_authenticated());
    assert!(!portal.session.inactivity_timer_running());
    assert!(portal.prefs.is_empty());
    assert_eq!(portal.host.redirects().last().map(String::as_str), Some("/"));
}

#[tokio::test]
async fn no_session_redirects_without_mounting() {
    let backend = Arc::new(MemoryBackend::new());
    let mut portal = portal(&backend);
    portal.router.start().await;
    assert!(!portal.session.is_authenticated());
    assert!(portal.router.current_view().is_none());
    assert_eq!(portal.host.redirects(), vec!["/".to_string()]);
}
