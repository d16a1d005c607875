//! Router-level tests: auth gating, login, and the appointment-confirm
//! flow that completes a referral and sends the customer their code.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use concierge_admin::{auth, build_router, AdminState};
use concierge_core::config::{AdminConfig, BusinessConfig};
use concierge_core::transport::{ChatTransport, SendError};
use concierge_rag::embedder::Embedder;
use concierge_rag::engine::RagParams;
use concierge_rag::IndexManager;
use concierge_services::{Dispatcher, LiveChatService, ReferralService, VacationService};
use concierge_store::types::{AppointmentStatus, CreditType, ReferralStatus};
use concierge_store::Store;

struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct Fixture {
    router: axum::Router,
    store: Arc<Store>,
    transport: Arc<RecordingTransport>,
    secret: String,
    _index_dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let index_dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        IndexManager::new(
            index_dir.path().to_path_buf(),
            Arc::clone(&store),
            Embedder::local_only(),
            RagParams {
                top_k: 10,
                min_relevance: 0.3,
                chunk_max_tokens: 300,
            },
        )
        .unwrap(),
    );
    let transport = RecordingTransport::new();
    let transport_dyn: Arc<dyn ChatTransport> = transport.clone();
    let secret = "test-secret-key".to_string();

    let state = Arc::new(AdminState {
        store: Arc::clone(&store),
        index,
        live_chat: Arc::new(LiveChatService::new(
            Arc::clone(&store),
            Arc::clone(&transport_dyn),
        )),
        vacation: Arc::new(VacationService::new(Arc::clone(&store))),
        referral: Arc::new(ReferralService::new(
            Arc::clone(&store),
            Arc::clone(&transport_dyn),
            "demo_bot".into(),
            10,
            20,
        )),
        transport: transport_dyn,
        dispatcher: Dispatcher::new(None),
        admin: AdminConfig {
            username: "admin".into(),
            password: "hunter2".into(),
            password_hash: String::new(),
            secret_key: secret.clone(),
            host: "127.0.0.1".into(),
            port: 5000,
        },
        business: BusinessConfig {
            name: "Test Salon".into(),
            phone: String::new(),
            address: String::new(),
            website: String::new(),
        },
    });

    Fixture {
        router: build_router(state),
        store,
        transport,
        secret,
        _index_dir: index_dir,
    }
}

fn session_cookie(secret: &str) -> (String, String) {
    let session = auth::issue_session(secret);
    let csrf = auth::csrf_token(secret, &session);
    (format!("{}={session}", auth::SESSION_COOKIE), csrf)
}

#[tokio::test]
async fn anonymous_requests_redirect_to_login() {
    let fx = fixture();
    let response = fx
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn login_sets_session_cookie() {
    let fx = fixture();
    let response = fx
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=hunter2"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(auth::SESSION_COOKIE));
    let token = cookie
        .split(';')
        .next()
        .unwrap()
        .split_once('=')
        .unwrap()
        .1;
    assert!(auth::verify_session(&fx.secret, token));
}

#[tokio::test]
async fn wrong_password_bounces_back_to_login() {
    let fx = fixture();
    let response = fx
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=wrong"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn authenticated_dashboard_renders() {
    let fx = fixture();
    let (cookie, _) = session_cookie(&fx.secret);
    let response = fx
        .router
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn post_without_csrf_token_is_forbidden() {
    let fx = fixture();
    let (cookie, _) = session_cookie(&fx.secret);
    let response = fx
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/kb/rebuild")
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("csrf_token=forged"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn confirming_appointment_completes_referral_and_sends_code() {
    let fx = fixture();
    let (cookie, csrf) = session_cookie(&fx.secret);

    // User "200" was referred by "alice" and booked an appointment.
    fx.store.insert_referral("alice", "REF_ABCDEF").unwrap();
    fx.store.register_referred("REF_ABCDEF", "200").unwrap();
    let appt_id = fx
        .store
        .create_appointment("200", "Noa", "@noa", "תספורת", "מחר", "10:00", "")
        .unwrap();

    let response = fx
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/appointments/{appt_id}/update"))
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("csrf_token={csrf}&status=confirmed")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Appointment confirmed.
    let appt = fx.store.get_appointment(appt_id).unwrap().unwrap();
    assert_eq!(appt.status, AppointmentStatus::Confirmed);

    // Referral moved to completed with both credits minted.
    let referral = fx.store.referral_by_code("REF_ABCDEF").unwrap().unwrap();
    assert_eq!(referral.status, ReferralStatus::Completed);
    assert!(referral.completed_at.is_some());

    let alice = fx.store.credits_for_user("alice").unwrap();
    let noa = fx.store.credits_for_user("200").unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(noa.len(), 1);
    assert_eq!(alice[0].credit_type, CreditType::Referrer);
    assert_eq!(noa[0].credit_type, CreditType::Referred);

    // The customer was offered their own referral code.
    let sent = fx.transport.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|(chat, text)| chat == "200" && text.contains("https://t.me/demo_bot?start=REF_")));
}
