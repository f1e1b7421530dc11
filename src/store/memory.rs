use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BlogDraft, BlogFilter, NewOtp, SectionDraft, SectionFilter, StoreError};
use crate::db::models::{BlogPost, OptionalCategory, OtpSession, Section};

/// In-process store with the same ordering and uniqueness rules as the
/// Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blogs: RwLock<Vec<BlogPost>>,
    sections: RwLock<Vec<Section>>,
    otps: RwLock<Vec<OtpSession>>,
}

impl MemoryStore {
    pub(super) async fn list_blogs(&self, filter: &BlogFilter) -> Vec<BlogPost> {
        let blogs = self.blogs.read().await;
        let mut posts: Vec<BlogPost> = blogs.iter().filter(|p| filter.matches(p)).cloned().collect();
        // Stable sort keeps insertion order for equal timestamps; reverse it
        // so the later insert wins, as with `ORDER BY created_at DESC`.
        posts.reverse();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            posts.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        posts
    }

    pub(super) async fn blog(&self, id: Uuid) -> Option<BlogPost> {
        self.blogs.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub(super) async fn blog_by_slug(&self, slug: &str) -> Option<BlogPost> {
        self.blogs.read().await.iter().find(|p| p.slug == slug).cloned()
    }

    pub(super) async fn insert_blog(&self, draft: BlogDraft) -> Result<BlogPost, StoreError> {
        let mut blogs = self.blogs.write().await;
        if blogs.iter().any(|p| p.slug == draft.slug) {
            return Err(StoreError::SlugTaken(draft.slug));
        }
        let now = Utc::now();
        let post = BlogPost {
            id: Uuid::new_v4(),
            title: draft.title,
            slug: draft.slug,
            excerpt: draft.excerpt,
            content: draft.content,
            category: OptionalCategory(draft.category),
            image_url: draft.image_url,
            published: draft.published,
            attachments: Json(draft.attachments),
            created_at: now,
            updated_at: now,
        };
        blogs.push(post.clone());
        Ok(post)
    }

    pub(super) async fn update_blog(
        &self,
        id: Uuid,
        draft: BlogDraft,
    ) -> Result<Option<BlogPost>, StoreError> {
        let mut blogs = self.blogs.write().await;
        if blogs.iter().any(|p| p.id != id && p.slug == draft.slug) {
            return Err(StoreError::SlugTaken(draft.slug));
        }
        let Some(post) = blogs.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        post.title = draft.title;
        post.slug = draft.slug;
        post.excerpt = draft.excerpt;
        post.content = draft.content;
        post.category = OptionalCategory(draft.category);
        post.image_url = draft.image_url;
        post.published = draft.published;
        post.attachments = Json(draft.attachments);
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    pub(super) async fn delete_blog(&self, id: Uuid) -> Option<BlogPost> {
        let mut blogs = self.blogs.write().await;
        let index = blogs.iter().position(|p| p.id == id)?;
        Some(blogs.remove(index))
    }

    pub(super) async fn list_sections(&self, filter: &SectionFilter) -> Vec<Section> {
        let sections = self.sections.read().await;
        let mut matched: Vec<Section> = sections
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then(a.created_at.cmp(&b.created_at))
        });
        matched
    }

    pub(super) async fn section(&self, id: Uuid) -> Option<Section> {
        self.sections.read().await.iter().find(|s| s.id == id).cloned()
    }

    pub(super) async fn insert_section(&self, draft: SectionDraft) -> Section {
        let now = Utc::now();
        let section = Section {
            id: Uuid::new_v4(),
            section_type: draft.section_type,
            title: draft.title,
            subtitle: draft.subtitle,
            content: draft.content,
            image_url: draft.image_url,
            cv_file_url: draft.cv_file_url,
            data: draft.data,
            order_index: draft.order_index,
            published: draft.published,
            created_at: now,
            updated_at: now,
        };
        self.sections.write().await.push(section.clone());
        section
    }

    pub(super) async fn update_section(&self, id: Uuid, draft: SectionDraft) -> Option<Section> {
        let mut sections = self.sections.write().await;
        let section = sections.iter_mut().find(|s| s.id == id)?;
        section.section_type = draft.section_type;
        section.title = draft.title;
        section.subtitle = draft.subtitle;
        section.content = draft.content;
        section.image_url = draft.image_url;
        section.cv_file_url = draft.cv_file_url;
        section.data = draft.data;
        section.order_index = draft.order_index;
        section.published = draft.published;
        section.updated_at = Utc::now();
        Some(section.clone())
    }

    pub(super) async fn delete_section(&self, id: Uuid) -> Option<Section> {
        let mut sections = self.sections.write().await;
        let index = sections.iter().position(|s| s.id == id)?;
        Some(sections.remove(index))
    }

    pub(super) async fn insert_otp(&self, otp: NewOtp) -> OtpSession {
        let session = OtpSession {
            id: Uuid::new_v4(),
            email: otp.email,
            otp_code: otp.otp_code,
            verified: false,
            expires_at: otp.expires_at,
            created_at: Utc::now(),
        };
        self.otps.write().await.push(session.clone());
        session
    }

    pub(super) async fn claim_otp(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Option<OtpSession> {
        let mut otps = self.otps.write().await;
        // `max_by_key` returns the last maximum, so a later insert with the
        // same timestamp wins.
        let session = otps
            .iter_mut()
            .filter(|s| s.email == email && s.otp_code == code && !s.verified && s.expires_at > now)
            .max_by_key(|s| s.created_at)?;
        session.verified = true;
        Some(session.clone())
    }

    pub(super) async fn purge_otps(&self, now: DateTime<Utc>) -> u64 {
        let mut otps = self.otps.write().await;
        let before = otps.len();
        otps.retain(|s| !s.verified && s.expires_at > now);
        (before - otps.len()) as u64
    }

    /// Snapshot of every stored OTP session, oldest first.
    pub async fn otp_sessions(&self) -> Vec<OtpSession> {
        self.otps.read().await.clone()
    }
}
