//! Application configuration, read from environment variables.
//!
//! Every value has a development default so the service starts with an empty
//! environment; [`AppConfig::validate_for_production`] refuses the insecure
//! ones when `ENVIRONMENT=production`.

use std::path::PathBuf;

/// JWT secret used when `JWT_SECRET` is unset. Rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

/// Admin address used when `ADMIN_EMAIL` is unset.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// The single address allowed to request an OTP.
    pub admin_email: String,
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
    pub otp_sweep_interval_secs: u64,
    pub site: SiteConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
}

/// Metadata shown on rendered pages and in the RSS feed.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub url: String,
    pub title: String,
    pub description: String,
    pub owner_name: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Buckets are subdirectories of `root`, served under `/storage`.
    Local { root: PathBuf },
    /// Supabase Storage compatible HTTP API.
    Supabase { url: String, service_key: String },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// When unset, codes go to the in-process outbox instead of Resend.
    pub resend_api_key: Option<String>,
    pub from: String,
}

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let storage = match (env_non_empty("SUPABASE_URL"), env_non_empty("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_key)) => StorageConfig::Supabase {
                url: url.trim_end_matches('/').to_string(),
                service_key,
            },
            _ => StorageConfig::Local {
                root: PathBuf::from(env_or("STORAGE_DIR", "storage")),
            },
        };

        Self {
            environment: env_or("ENVIRONMENT", "development"),
            host: env_or("HOST", "127.0.0.1"),
            port: env_parse("PORT", 3001),
            admin_email: env_or("ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL),
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            session_ttl_minutes: env_parse("SESSION_TTL_MINUTES", 120),
            otp_sweep_interval_secs: env_parse("OTP_SWEEP_INTERVAL_SECS", 600),
            site: SiteConfig {
                url: env_or("SITE_URL", "http://localhost:3001")
                    .trim_end_matches('/')
                    .to_string(),
                title: env_or("SITE_TITLE", "Portfolio"),
                description: env_or("SITE_DESCRIPTION", "Projects, experience and writing"),
                owner_name: env_or("OWNER_NAME", "Portfolio Owner"),
            },
            storage,
            mail: MailConfig {
                resend_api_key: env_non_empty("RESEND_API_KEY"),
                from: env_or("MAIL_FROM", "Portfolio Admin <noreply@resend.dev>"),
            },
        }
    }

    /// Config for tests and tooling: development defaults with local storage
    /// rooted at `storage_root`.
    pub fn for_local(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            jwt_secret: "test-secret".to_string(),
            session_ttl_minutes: 120,
            otp_sweep_interval_secs: 600,
            site: SiteConfig {
                url: "http://localhost:3001".to_string(),
                title: "Portfolio".to_string(),
                description: "Projects, experience and writing".to_string(),
                owner_name: "Portfolio Owner".to_string(),
            },
            storage: StorageConfig::Local {
                root: storage_root.into(),
            },
            mail: MailConfig {
                resend_api_key: None,
                from: "Portfolio Admin <noreply@resend.dev>".to_string(),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Case-insensitive match against the configured admin address.
    pub fn is_admin_email(&self, email: &str) -> bool {
        !email.trim().is_empty() && email.trim().eq_ignore_ascii_case(self.admin_email.trim())
    }

    /// Hard failures for a production start. Weak-but-allowed settings are
    /// only warned about.
    pub fn validate_for_production(&self) -> Result<(), String> {
        if !self.is_production() {
            return Ok(());
        }
        if self.jwt_secret.is_empty() || self.jwt_secret == DEFAULT_JWT_SECRET {
            return Err(
                "JWT_SECRET must be set to a secure, unique value in production".to_string(),
            );
        }
        if self.admin_email == DEFAULT_ADMIN_EMAIL {
            tracing::warn!(
                "SECURITY: ADMIN_EMAIL is using the placeholder default. \
                 Set ADMIN_EMAIL to the real admin address."
            );
        }
        if self.mail.resend_api_key.is_none() {
            tracing::warn!("RESEND_API_KEY is not set; OTP codes will not be emailed");
        }
        Ok(())
    }
}
