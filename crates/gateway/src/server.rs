use std::{future::Future, net::SocketAddr};

use {
    axum::{
        Router,
        extract::{Query, State, rejection::JsonRejection},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    qrcode::{QrCode, render::svg},
    serde::Deserialize,
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use {
    wabridge_channels::{
        Jid, OutboundContent,
        address::{COUNTRY_CODE, USER_SERVER},
    },
    wabridge_config::ServerConfig,
};

use crate::{auth, error::ApiError, state::AppState};

const QR_NOT_NEEDED: &str = "Sudah tersambung. Tidak ada QR.";
const QR_PENDING: &str = "Menunggu QR, coba lagi sebentar…";
const QR_RENDER_FAILED: &str = "Gagal merender QR";

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the control-plane router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/qr", get(qr_handler))
        .route("/sendText", get(send_text_handler))
        .route("/send-private", post(send_private_handler))
        .route("/send-group", post(send_group_handler))
        .route("/logout", post(logout_handler))
        .route("/reset-session", post(reset_session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the control plane until `shutdown` resolves.
pub async fn start_gateway(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let lines = [
        format!("wabridge v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on {addr}"),
        format!("transport: {}", state.bridge.lifecycle.provider_id()),
        format!(
            "send auth: {}",
            if state.send_token.is_some() { "bearer" } else { "open" }
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("control plane stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let conn = &state.bridge.conn;
    Json(serde_json::json!({
        "ok": true,
        "ready": conn.is_ready(),
        "state": conn.current(),
    }))
}

async fn qr_handler(State(state): State<AppState>) -> Response {
    let conn = &state.bridge.conn;
    if conn.is_ready() {
        return (StatusCode::OK, QR_NOT_NEEDED).into_response();
    }
    let Some(qr) = conn.pending_qr().await else {
        state.bridge.lifecycle.request_start().await;
        return (StatusCode::ACCEPTED, QR_PENDING).into_response();
    };
    match render_qr_svg(&qr) {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render pairing QR");
            (StatusCode::INTERNAL_SERVER_ERROR, QR_RENDER_FAILED).into_response()
        },
    }
}

fn render_qr_svg(data: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

#[derive(Debug, Deserialize)]
struct SendTextQuery {
    to: Option<String>,
    text: Option<String>,
}

async fn send_text_handler(
    State(state): State<AppState>,
    Query(query): Query<SendTextQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let to = query.to.as_deref().map(str::trim).unwrap_or_default();
    let text = query.text.unwrap_or_default();
    if to.is_empty() || text.is_empty() {
        return Err(ApiError::bad_request("to & text required"));
    }
    let digits: String = to.chars().filter(char::is_ascii_digit).collect();
    if !digits.starts_with(COUNTRY_CODE) {
        return Err(ApiError::bad_request(
            "Gunakan format MSISDN Indonesia, mis: 62812xxxxxxx",
        ));
    }
    let jid = Jid::new(format!("{digits}@{USER_SERVER}"));
    state.bridge.gateway.send_text(&jid, text).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct SendPrivateBody {
    to: Option<String>,
    text: Option<String>,
}

async fn send_private_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendPrivateBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(to), Some(text)) = (non_empty(body.to), non_empty(body.text)) else {
        return Err(ApiError::bad_request("to & text required"));
    };
    let Some(jid) = Jid::private_from_msisdn(&to) else {
        return Err(ApiError::bad_request(
            "Format nomor tidak valid. Contoh: 62812xxxx atau 62812xxxx@s.whatsapp.net",
        ));
    };
    state.bridge.gateway.send_text(&jid, text).await?;
    Ok(Json(serde_json::json!({ "ok": true, "jid": jid })))
}

#[derive(Debug, Deserialize)]
struct SendGroupBody {
    gid: Option<String>,
    text: Option<String>,
    #[serde(default)]
    mentions: Vec<String>,
}

async fn send_group_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendGroupBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(gid), Some(text)) = (non_empty(body.gid), non_empty(body.text)) else {
        return Err(ApiError::bad_request("gid & text required"));
    };
    let gid = Jid::new(gid);
    if !gid.is_group() {
        return Err(ApiError::bad_request(
            "gid harus JID group (akhiri dengan @g.us)",
        ));
    }
    let mentions: Vec<Jid> = body
        .mentions
        .iter()
        .map(|m| Jid::new(m.as_str()).normalized_user())
        .collect();
    let mentioned = mentions.len();
    state
        .bridge
        .gateway
        .send(&gid, OutboundContent::Text { text, mentions })
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "gid": gid, "mentioned": mentioned })))
}

async fn logout_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.bridge.lifecycle.logout().await;
    Json(serde_json::json!({
        "ok": true,
        "message": "Logged out. Open /qr to scan new code.",
    }))
}

async fn reset_session_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.bridge.lifecycle.reset_session().await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "message": "Session cleared. Reload /qr to scan.",
    })))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if auth::bearer_authorized(headers, state.send_token.as_ref()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
