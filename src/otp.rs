//! One-time login codes for the admin gate.

use chrono::{Duration, Utc};
use rand::Rng;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;

use crate::db::models::OtpSession;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{NewOtp, Store};

/// Codes are valid for five minutes after issue.
pub const OTP_TTL_MINUTES: i64 = 5;

pub const OTP_LEN: usize = 6;

/// Uniform in 0..=999999, zero-padded.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..=999_999);
    format!("{:06}", n)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn is_well_formed_code(code: &str) -> bool {
    code.len() == OTP_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Store a fresh code for the admin and mail it.
///
/// Non-admin addresses are rejected before anything is written. A mail
/// failure leaves the stored row in place.
pub async fn issue(state: &AppState, email: &str) -> AppResult<()> {
    if !state.config.is_admin_email(email) {
        tracing::warn!("otp requested for unauthorized email");
        return Err(AppError::unauthorized("Unauthorized email"));
    }

    let email = normalize_email(email);
    let code = generate_code();
    let session = state
        .store
        .insert_otp(NewOtp {
            email: email.clone(),
            otp_code: code.clone(),
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store otp");
            AppError::Failed("Failed to store OTP".to_string())
        })?;

    state.mailer.send_otp(&email, &code).await?;

    tracing::info!(otp_session = %session.id, "otp issued");
    Ok(())
}

/// Claim the newest matching unverified, unexpired code. Every kind of
/// mismatch yields the same error.
pub async fn verify(state: &AppState, email: &str, code: &str) -> AppResult<OtpSession> {
    let invalid = || AppError::unauthorized("Invalid or expired OTP");

    let code = code.trim();
    if email.trim().is_empty() || !is_well_formed_code(code) {
        return Err(invalid());
    }

    let claimed = state
        .store
        .claim_otp(&normalize_email(email), code, Utc::now())
        .await?;

    match claimed {
        Some(session) => {
            tracing::info!(otp_session = %session.id, "otp verified");
            Ok(session)
        }
        None => {
            tracing::info!("otp rejected");
            Err(invalid())
        }
    }
}

/// Periodically delete verified and expired codes.
pub fn spawn_sweeper(store: Store, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "otp sweeper started");
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match store.purge_otps(Utc::now()).await {
                Ok(0) => tracing::debug!("otp sweep: nothing to purge"),
                Ok(deleted) => tracing::info!(deleted, "otp sweep: purged rows"),
                Err(e) => tracing::error!(error = %e, "otp sweep failed"),
            }
        }
    })
}
