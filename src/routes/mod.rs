/*!
 * Routes Module
 * HTTP handlers for the public site, the OTP gate and the admin API
 */

pub mod auth;
pub mod blog;
pub mod health;
pub mod pages;
pub mod rss;
pub mod sections;
pub mod upload;

use serde::{Deserialize, Serialize};

use crate::db::models::{Attachment, BlogCategory, SectionType};
use crate::error::{AppError, AppResult};
use crate::storage::key_for_path;

/// Success response (for delete and logout)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `?category=` filter shared by the blog listings.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

impl CategoryQuery {
    pub fn parse(&self) -> AppResult<Option<BlogCategory>> {
        parse_category(self.category.as_deref())
    }
}

/// `?section_type=` filter shared by the section listings.
#[derive(Debug, Default, Deserialize)]
pub struct SectionTypeQuery {
    pub section_type: Option<String>,
}

impl SectionTypeQuery {
    pub fn parse(&self) -> AppResult<Option<SectionType>> {
        match self.section_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| AppError::validation("Invalid section type")),
        }
    }
}

/// Empty or missing means "no category".
pub fn parse_category(value: Option<&str>) -> AppResult<Option<BlogCategory>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| AppError::validation("Invalid category")),
    }
}

/// Client-supplied descriptors must point at a removable key in `bucket`.
pub fn validate_attachments(bucket: &str, list: &[Attachment]) -> AppResult<()> {
    match list.iter().find(|a| key_for_path(bucket, &a.path).is_none()) {
        Some(bad) => Err(AppError::validation(format!(
            "Invalid attachment path: {}",
            bad.path
        ))),
        None => Ok(()),
    }
}
