//! Content store: blogs, sections and OTP sessions.
//!
//! [`Store::Postgres`] is the production backend. [`Store::Memory`] keeps the
//! same semantics in process and is used when `DATABASE_URL` is unset and in
//! tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::models::{
    Attachment, BlogCategory, BlogPost, OtpSession, Section, SectionData, SectionType,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("slug already exists: {0}")]
    SlugTaken(String),

    /// A stored row no longer decodes (e.g. a section payload edited by hand).
    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub published: Option<bool>,
    pub category: Option<BlogCategory>,
    pub limit: Option<i64>,
}

impl BlogFilter {
    pub fn published() -> Self {
        Self {
            published: Some(true),
            ..Self::default()
        }
    }

    fn matches(&self, post: &BlogPost) -> bool {
        self.published.map_or(true, |p| post.published == p)
            && self.category.map_or(true, |c| post.category() == Some(c))
    }
}

/// Full set of editable blog fields, written as one insert or update.
#[derive(Debug, Clone)]
pub struct BlogDraft {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub category: Option<BlogCategory>,
    pub image_url: Option<String>,
    pub published: bool,
    pub attachments: Vec<Attachment>,
}

impl From<&BlogPost> for BlogDraft {
    fn from(post: &BlogPost) -> Self {
        Self {
            title: post.title.clone(),
            slug: post.slug.clone(),
            excerpt: post.excerpt.clone(),
            content: post.content.clone(),
            category: post.category(),
            image_url: post.image_url.clone(),
            published: post.published,
            attachments: post.attachments().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionFilter {
    pub published: Option<bool>,
    pub section_type: Option<SectionType>,
}

impl SectionFilter {
    pub fn published() -> Self {
        Self {
            published: Some(true),
            ..Self::default()
        }
    }

    fn matches(&self, section: &Section) -> bool {
        self.published.map_or(true, |p| section.published == p)
            && self.section_type.map_or(true, |t| section.section_type == t)
    }
}

/// Full set of editable section fields.
#[derive(Debug, Clone)]
pub struct SectionDraft {
    pub section_type: SectionType,
    pub title: String,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub cv_file_url: Option<String>,
    pub data: SectionData,
    pub order_index: i32,
    pub published: bool,
}

impl From<&Section> for SectionDraft {
    fn from(section: &Section) -> Self {
        Self {
            section_type: section.section_type,
            title: section.title.clone(),
            subtitle: section.subtitle.clone(),
            content: section.content.clone(),
            image_url: section.image_url.clone(),
            cv_file_url: section.cv_file_url.clone(),
            data: section.data.clone(),
            order_index: section.order_index,
            published: section.published,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub email: String,
    pub otp_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub enum Store {
    Postgres(PgPool),
    Memory(Arc<MemoryStore>),
}

impl Store {
    pub fn memory() -> Self {
        Store::Memory(Arc::new(MemoryStore::default()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }

    pub async fn health(&self) -> Result<Duration, StoreError> {
        match self {
            Store::Postgres(pool) => Ok(crate::db::health_check(pool).await?),
            Store::Memory(_) => Ok(Duration::ZERO),
        }
    }

    // ---- blogs ----

    /// Posts matching `filter`, newest first.
    pub async fn list_blogs(&self, filter: &BlogFilter) -> Result<Vec<BlogPost>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::list_blogs(pool, filter).await,
            Store::Memory(mem) => Ok(mem.list_blogs(filter).await),
        }
    }

    pub async fn blog(&self, id: Uuid) -> Result<Option<BlogPost>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::blog(pool, id).await,
            Store::Memory(mem) => Ok(mem.blog(id).await),
        }
    }

    pub async fn blog_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::blog_by_slug(pool, slug).await,
            Store::Memory(mem) => Ok(mem.blog_by_slug(slug).await),
        }
    }

    pub async fn insert_blog(&self, draft: BlogDraft) -> Result<BlogPost, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::insert_blog(pool, draft).await,
            Store::Memory(mem) => mem.insert_blog(draft).await,
        }
    }

    /// Overwrites every editable field and stamps `updated_at`.
    /// `Ok(None)` when no row has `id`.
    pub async fn update_blog(
        &self,
        id: Uuid,
        draft: BlogDraft,
    ) -> Result<Option<BlogPost>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::update_blog(pool, id, draft).await,
            Store::Memory(mem) => mem.update_blog(id, draft).await,
        }
    }

    /// Returns the deleted row.
    pub async fn delete_blog(&self, id: Uuid) -> Result<Option<BlogPost>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::delete_blog(pool, id).await,
            Store::Memory(mem) => Ok(mem.delete_blog(id).await),
        }
    }

    // ---- sections ----

    /// Sections matching `filter` in display order.
    pub async fn list_sections(&self, filter: &SectionFilter) -> Result<Vec<Section>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::list_sections(pool, filter).await,
            Store::Memory(mem) => Ok(mem.list_sections(filter).await),
        }
    }

    pub async fn section(&self, id: Uuid) -> Result<Option<Section>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::section(pool, id).await,
            Store::Memory(mem) => Ok(mem.section(id).await),
        }
    }

    pub async fn insert_section(&self, draft: SectionDraft) -> Result<Section, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::insert_section(pool, draft).await,
            Store::Memory(mem) => Ok(mem.insert_section(draft).await),
        }
    }

    pub async fn update_section(
        &self,
        id: Uuid,
        draft: SectionDraft,
    ) -> Result<Option<Section>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::update_section(pool, id, draft).await,
            Store::Memory(mem) => Ok(mem.update_section(id, draft).await),
        }
    }

    pub async fn delete_section(&self, id: Uuid) -> Result<Option<Section>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::delete_section(pool, id).await,
            Store::Memory(mem) => Ok(mem.delete_section(id).await),
        }
    }

    // ---- OTP sessions ----

    pub async fn insert_otp(&self, otp: NewOtp) -> Result<OtpSession, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::insert_otp(pool, otp).await,
            Store::Memory(mem) => Ok(mem.insert_otp(otp).await),
        }
    }

    /// Atomically find the newest unverified, unexpired session for
    /// `email` + `code` and mark it verified. A code can be claimed once.
    pub async fn claim_otp(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpSession>, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::claim_otp(pool, email, code, now).await,
            Store::Memory(mem) => Ok(mem.claim_otp(email, code, now).await),
        }
    }

    /// Delete sessions that are verified or expired at `now`.
    pub async fn purge_otps(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        match self {
            Store::Postgres(pool) => postgres::purge_otps(pool, now).await,
            Store::Memory(mem) => Ok(mem.purge_otps(now).await),
        }
    }
}
