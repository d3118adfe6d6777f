use axum::{
    extract::{Multipart, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use portal::session::{SessionProvider, StaticSession};
use portal::Portal;
use serde_json::{json, Value};
use shared_types::{
    Claim, ClaimMessage, ClaimStatus, CreateClaimPayload, Notification, NotificationKind,
    PortalConfig, Priority, SenderRole, UserProfile,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process stand-in for the claims backend.
///
/// Every route counts its calls so tests can assert on network traffic.
#[derive(Default)]
pub struct MockBackend {
    pub claims: Mutex<Vec<Claim>>,
    pub notifications: Mutex<Vec<Notification>>,

    /// Respond to `GET /claims` with this status and an empty body.
    pub claims_status: Mutex<Option<u16>>,
    /// Respond to `GET /notifications` with this status.
    pub notifications_status: Mutex<Option<u16>>,
    /// Reject `POST /claims` with `(status, message)`.
    pub reject_create: Mutex<Option<(u16, String)>>,
    pub fail_uploads: AtomicBool,
    /// File name whose upload is held back, to shuffle completion order.
    pub slow_upload: Mutex<Option<String>>,
    pub list_delay_ms: AtomicU64,
    /// Hold every upload this long before answering.
    pub upload_delay_ms: AtomicU64,

    pub list_claims_calls: AtomicUsize,
    pub get_claim_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub message_calls: AtomicUsize,
    pub notification_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,

    /// Raw JSON bodies received by `POST /claims`.
    pub created: Mutex<Vec<Value>>,
    /// Raw JSON bodies received by `POST /claims/{id}/messages`.
    pub sent_messages: Mutex<Vec<Value>>,
    pub last_authorization: Mutex<Option<String>>,
}

type Shared = Arc<MockBackend>;

impl MockBackend {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Start the mock backend on an ephemeral port. Returns it with its API base URL.
pub async fn spawn_backend() -> (Shared, String) {
    let backend = Arc::new(MockBackend::default());
    let app = router(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock backend");
    });
    (backend, format!("http://{addr}/api"))
}

fn router(backend: Shared) -> Router {
    Router::new()
        .route("/api/claims", get(list_claims).post(create_claim))
        .route("/api/claims/{id}", get(get_claim))
        .route("/api/claims/{id}/messages", post(send_message))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", patch(mark_all_read))
        .route("/api/notifications/{id}/read", patch(mark_read))
        .route("/api/upload", post(upload))
        .with_state(backend)
}

fn check_auth(backend: &MockBackend, headers: &HeaderMap) -> Result<(), Response> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *backend.last_authorization.lock().unwrap() = value.clone();
    match value {
        Some(v) if v.starts_with("Bearer ") && v.len() > "Bearer ".len() => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized" }))).into_response()),
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn list_claims(State(b): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    b.list_claims_calls.fetch_add(1, Ordering::SeqCst);
    let delay = b.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let forced = *b.claims_status.lock().unwrap();
    if let Some(code) = forced {
        return status(code).into_response();
    }
    let claims = b.claims.lock().unwrap().clone();
    Json(claims).into_response()
}

async fn get_claim(State(b): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    b.get_claim_calls.fetch_add(1, Ordering::SeqCst);
    let found = b.claims.lock().unwrap().iter().find(|c| c.id == id).cloned();
    match found {
        Some(claim) => Json(claim).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "Claim not found" }))).into_response(),
    }
}

async fn create_claim(State(b): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    b.create_calls.fetch_add(1, Ordering::SeqCst);
    let rejection = b.reject_create.lock().unwrap().clone();
    if let Some((code, message)) = rejection {
        return (status(code), Json(json!({ "message": message }))).into_response();
    }
    b.created.lock().unwrap().push(body.clone());

    let payload: CreateClaimPayload = match serde_json::from_value(body) {
        Ok(p) => p,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "message": e.to_string() }))).into_response()
        }
    };

    let mut claims = b.claims.lock().unwrap();
    let n = claims.len() + 1;
    let id = format!("c-{n}");
    let number = format!("{}-{n:04}", payload.claim.service_type);
    let now = Utc::now();
    claims.push(Claim {
        id: id.clone(),
        claim_number: Some(number.clone()),
        user_id: payload.user.id,
        service_type: payload.claim.service_type,
        service_name: String::new(),
        title: payload.claim.title,
        description: payload.claim.description,
        location: Some(payload.claim.location.address),
        latitude: payload.claim.location.latitude,
        longitude: payload.claim.location.longitude,
        priority: payload.claim.priority,
        attachment_urls: payload.claim.attachments.into_iter().map(|a| a.url).collect(),
        extra_data: payload.claim.extra_data,
        status: ClaimStatus::Submitted,
        assigned_to: None,
        resolution: None,
        created_at: now,
        updated_at: now,
        messages: vec![],
    });

    (
        StatusCode::CREATED,
        Json(json!({ "claimId": id, "claimNumber": number, "message": "Claim created" })),
    )
        .into_response()
}

async fn send_message(
    State(b): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    let n = b.message_calls.fetch_add(1, Ordering::SeqCst) + 1;
    b.sent_messages.lock().unwrap().push(body.clone());

    let mut claims = b.claims.lock().unwrap();
    let Some(claim) = claims.iter_mut().find(|c| c.id == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Claim not found" }))).into_response();
    };
    if claim.status.is_terminal() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "Claim is closed" }))).into_response();
    }
    let message_id = format!("m-{n}");
    let timestamp = Utc::now();
    claim.messages.push(ClaimMessage {
        id: message_id.clone(),
        claim_id: id.clone(),
        sender_id: "u-1".into(),
        sender_name: "Amal Benali".into(),
        sender_role: SenderRole::Citizen,
        content: body["message"].as_str().unwrap_or_default().to_string(),
        timestamp,
        attachments: None,
    });

    Json(json!({ "messageId": message_id, "timestamp": timestamp })).into_response()
}

async fn list_notifications(State(b): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    b.notification_calls.fetch_add(1, Ordering::SeqCst);
    let forced = *b.notifications_status.lock().unwrap();
    if let Some(code) = forced {
        return (status(code), Json(json!({ "message": "Not Found" }))).into_response();
    }
    let notifications = b.notifications.lock().unwrap().clone();
    Json(notifications).into_response()
}

async fn mark_read(State(b): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    for n in b.notifications.lock().unwrap().iter_mut().filter(|n| n.id == id) {
        n.read = true;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn mark_all_read(State(b): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(r) = check_auth(&b, &headers) {
        return r;
    }
    for n in b.notifications.lock().unwrap().iter_mut() {
        n.read = true;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn upload(State(b): State<Shared>, mut multipart: Multipart) -> Response {
    b.upload_calls.fetch_add(1, Ordering::SeqCst);
    let delay = b.upload_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if b.fail_uploads.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Upload failed" }))).into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let file_type = field.content_type().unwrap_or_default().to_string();
        let _ = field.bytes().await;

        let slow = b.slow_upload.lock().unwrap().clone();
        if slow.as_deref() == Some(file_name.as_str()) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        return Json(json!({
            "url": format!("https://cdn.test/claims/{file_name}"),
            "fileName": file_name,
            "fileType": file_type,
        }))
        .into_response();
    }
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "No file provided" }))).into_response()
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn citizen() -> UserProfile {
    UserProfile {
        id: "u-1".into(),
        email: "amal.benali@example.ma".into(),
        name: "Amal Benali".into(),
        phone: Some("+212600000000".into()),
    }
}

pub fn signed_in() -> Arc<dyn SessionProvider> {
    Arc::new(StaticSession::signed_in("test-token", citizen()))
}

pub fn signed_out() -> Arc<dyn SessionProvider> {
    Arc::new(StaticSession::signed_out())
}

pub fn config_for(base_url: &str) -> PortalConfig {
    let mut config = PortalConfig::default();
    config.api.base_url = base_url.to_string();
    config.api.timeout_secs = 5;
    config
}

pub fn portal_for(base_url: &str, session: Arc<dyn SessionProvider>) -> Portal {
    Portal::connect(config_for(base_url), session).expect("portal")
}

pub fn claim(id: &str, status: ClaimStatus) -> Claim {
    let now = Utc::now();
    Claim {
        id: id.into(),
        claim_number: Some(format!("SPK-{id}")),
        user_id: "u-1".into(),
        service_type: "SPK".into(),
        service_name: "Smart Parking".into(),
        title: format!("Réclamation {id}"),
        description: "Capteur de stationnement en panne".into(),
        location: Some("Bd Mohammed V, Casablanca".into()),
        latitude: None,
        longitude: None,
        priority: Priority::Medium,
        attachment_urls: vec![],
        extra_data: HashMap::new(),
        status,
        assigned_to: None,
        resolution: None,
        created_at: now,
        updated_at: now,
        messages: vec![],
    }
}

pub fn notification(id: &str, claim_id: &str, read: bool) -> Notification {
    Notification {
        id: id.into(),
        user_id: "u-1".into(),
        claim_id: claim_id.into(),
        kind: NotificationKind::NewMessage,
        title: "Nouveau message".into(),
        message: "Le service a répondu à votre réclamation".into(),
        read,
        created_at: Utc::now(),
    }
}

pub fn message(id: &str, claim_id: &str, at: &str) -> ClaimMessage {
    let timestamp: DateTime<Utc> = at.parse().expect("timestamp");
    ClaimMessage {
        id: id.into(),
        claim_id: claim_id.into(),
        sender_id: "op-7".into(),
        sender_name: "Service Parking".into(),
        sender_role: SenderRole::Service,
        content: format!("message {id}"),
        timestamp,
        attachments: None,
    }
}
