/**
 * Authentication Routes
 * Email OTP login for the single admin, plus session check and logout
 */
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppJson, AppResult};
use crate::otp;
use crate::routes::SuccessResponse;
use crate::session::{clear_session_cookie, session_cookie, token_from_headers, AdminSession};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub session_token: String,
    pub message: String,
}

/// Session info returned to the admin UI
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionResponse {
    pub success: bool,
    pub is_valid: bool,
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /send-otp
pub async fn send_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SendOtpRequest>,
) -> AppResult<Json<SendOtpResponse>> {
    otp::issue(&state, &payload.email).await?;
    Ok(Json(SendOtpResponse {
        success: true,
        message: "OTP sent successfully".to_string(),
    }))
}

/// POST /verify-otp
/// On success the token is returned in the body and set as a cookie. A body
/// that does not parse is rejected like a wrong code.
pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload.map_err(|e| {
        tracing::debug!(error = %e, "unreadable verify-otp body");
        AppError::unauthorized("Invalid or expired OTP")
    })?;
    let session = otp::verify(&state, &payload.email, &payload.otp).await?;

    let (token, _claims) = state
        .sessions
        .issue(&session.id.to_string(), &session.email)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let cookie = session_cookie(
        &token,
        state.sessions.ttl_seconds(),
        state.config.is_production(),
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(VerifyOtpResponse {
            success: true,
            session_token: token,
            message: "OTP verified successfully".to_string(),
        }),
    ))
}

/// POST /api/auth/verify
/// Always 200; the body says whether the presented session is valid.
pub async fn verify_session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match AdminSession::from_headers(&headers, &state).await {
        Ok(admin) => Json(VerifySessionResponse {
            success: true,
            is_valid: true,
            session: DateTime::from_timestamp(admin.claims.exp, 0).map(|expires_at| SessionInfo {
                email: admin.claims.email,
                expires_at,
            }),
            error: None,
        }),
        Err(e) => Json(VerifySessionResponse {
            success: false,
            is_valid: false,
            session: None,
            error: Some(e.to_string()),
        }),
    }
}

/// POST /api/auth/logout
/// Idempotent: revokes the presented token if it is still valid and always
/// clears the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = token_from_headers(&headers) {
        if let Ok(claims) = state.sessions.verify(&token).await {
            state.sessions.revoke(&claims).await;
            tracing::info!("admin logged out");
        }
    }

    (
        StatusCode::OK,
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config.is_production()),
        )]),
        Json(SuccessResponse { success: true }),
    )
}
