use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;

use concierge_core::config::{AdminConfig, BusinessConfig};
use concierge_core::transport::ChatTransport;
use concierge_rag::IndexManager;
use concierge_services::{Dispatcher, LiveChatService, ReferralService, VacationService};
use concierge_store::Store;

use crate::auth;
use crate::http;

/// Shared state for every admin handler.
pub struct AdminState {
    pub store: Arc<Store>,
    pub index: Arc<IndexManager>,
    pub live_chat: Arc<LiveChatService>,
    pub vacation: Arc<VacationService>,
    pub referral: Arc<ReferralService>,
    pub transport: Arc<dyn ChatTransport>,
    pub dispatcher: Dispatcher,
    pub admin: AdminConfig,
    pub business: BusinessConfig,
}

/// Redirect anonymous requests to the login form.
async fn require_login(
    State(state): State<Arc<AdminState>>,
    request: Request,
    next: Next,
) -> Response {
    let logged_in = session_from_headers(request.headers())
        .map(|token| auth::verify_session(&state.admin.secret_key, &token))
        .unwrap_or(false);
    if !logged_in {
        return Redirect::to("/login").into_response();
    }
    next.run(request).await
}

/// Extract the session cookie value, if any.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == auth::SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Assemble the full admin router.
pub fn build_router(state: Arc<AdminState>) -> Router {
    let protected = Router::new()
        .route("/", get(http::dashboard::index))
        .route("/api/stats", get(http::dashboard::api_stats))
        .route("/kb", get(http::kb::list))
        .route("/kb/add", get(http::kb::add_form).post(http::kb::add))
        .route("/kb/edit/{id}", get(http::kb::edit_form).post(http::kb::edit))
        .route("/kb/delete/{id}", post(http::kb::delete))
        .route("/kb/rebuild", post(http::kb::rebuild))
        .route("/conversations", get(http::conversations::list))
        .route("/live-chat/{user_id}", get(http::conversations::live_chat_view))
        .route("/live-chat/{user_id}/start", post(http::conversations::live_chat_start))
        .route("/live-chat/{user_id}/end", post(http::conversations::live_chat_end))
        .route("/live-chat/{user_id}/send", post(http::conversations::live_chat_send))
        .route(
            "/api/live-chat/{user_id}/messages",
            get(http::conversations::api_messages),
        )
        .route("/requests", get(http::requests::list))
        .route("/requests/{id}/handle", post(http::requests::handle))
        .route("/knowledge-gaps", get(http::requests::knowledge_gaps))
        .route("/knowledge-gaps/{id}/resolve", post(http::requests::resolve_gap))
        .route("/appointments", get(http::appointments::list))
        .route("/appointments/{id}/update", post(http::appointments::update))
        .route(
            "/business-hours",
            get(http::hours::view).post(http::hours::upsert),
        )
        .route(
            "/business-hours/special-days/add",
            post(http::hours::add_special_day),
        )
        .route(
            "/business-hours/special-days/{id}/delete",
            post(http::hours::delete_special_day),
        )
        .route(
            "/vacation-mode",
            get(http::vacation::view).post(http::vacation::update),
        )
        .route(
            "/bot-personality",
            get(http::personality::view).post(http::personality::update),
        )
        .route("/referrals", get(http::referrals::view))
        .route(
            "/broadcast",
            get(http::broadcast::view).post(http::broadcast::create),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_login,
        ));

    Router::new()
        .route(
            "/login",
            get(http::auth_routes::login_form).post(http::auth_routes::login_submit),
        )
        .route("/logout", get(http::auth_routes::logout))
        .merge(protected)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
