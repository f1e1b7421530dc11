use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::{BlogDraft, BlogFilter, NewOtp, SectionDraft, SectionFilter, StoreError};
use crate::db::models::{BlogPost, OtpSession, Section, SectionRow};

const BLOG_COLUMNS: &str = "id, title, slug, excerpt, content, category, image_url, published, \
                            attachments, created_at, updated_at";

const SECTION_COLUMNS: &str = "id, section_type, title, subtitle, content, image_url, \
                               cv_file_url, data, order_index, published, created_at, updated_at";

/// Map a unique violation on the slug index to [`StoreError::SlugTaken`].
fn slug_conflict(err: sqlx::Error, slug: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505")
            && db_err.constraint() == Some("idx_blogs_slug")
        {
            return StoreError::SlugTaken(slug.to_string());
        }
    }
    StoreError::Database(err)
}

fn decode_section(row: SectionRow) -> Result<Section, StoreError> {
    let id = row.id;
    Section::try_from(row).map_err(|e| StoreError::Corrupt {
        id,
        reason: e.to_string(),
    })
}

pub(super) async fn list_blogs(
    pool: &PgPool,
    filter: &BlogFilter,
) -> Result<Vec<BlogPost>, StoreError> {
    let sql = format!(
        "SELECT {} FROM blogs \
         WHERE ($1::bool IS NULL OR published = $1) \
           AND ($2::text IS NULL OR category = $2) \
         ORDER BY created_at DESC \
         LIMIT $3",
        BLOG_COLUMNS
    );
    let posts = sqlx::query_as::<_, BlogPost>(&sql)
        .bind(filter.published)
        .bind(filter.category.map(|c| c.as_str()))
        .bind(filter.limit)
        .fetch_all(pool)
        .await?;
    Ok(posts)
}

pub(super) async fn blog(pool: &PgPool, id: Uuid) -> Result<Option<BlogPost>, StoreError> {
    let sql = format!("SELECT {} FROM blogs WHERE id = $1", BLOG_COLUMNS);
    Ok(sqlx::query_as::<_, BlogPost>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub(super) async fn blog_by_slug(pool: &PgPool, slug: &str) -> Result<Option<BlogPost>, StoreError> {
    let sql = format!("SELECT {} FROM blogs WHERE slug = $1", BLOG_COLUMNS);
    Ok(sqlx::query_as::<_, BlogPost>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?)
}

pub(super) async fn insert_blog(pool: &PgPool, draft: BlogDraft) -> Result<BlogPost, StoreError> {
    let sql = format!(
        "INSERT INTO blogs (title, slug, excerpt, content, category, image_url, published, \
                            attachments, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now()) \
         RETURNING {}",
        BLOG_COLUMNS
    );
    sqlx::query_as::<_, BlogPost>(&sql)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(draft.category.map(|c| c.as_str()))
        .bind(&draft.image_url)
        .bind(draft.published)
        .bind(Json(&draft.attachments))
        .fetch_one(pool)
        .await
        .map_err(|e| slug_conflict(e, &draft.slug))
}

pub(super) async fn update_blog(
    pool: &PgPool,
    id: Uuid,
    draft: BlogDraft,
) -> Result<Option<BlogPost>, StoreError> {
    let sql = format!(
        "UPDATE blogs \
         SET title = $1, slug = $2, excerpt = $3, content = $4, category = $5, image_url = $6, \
             published = $7, attachments = $8, updated_at = now() \
         WHERE id = $9 \
         RETURNING {}",
        BLOG_COLUMNS
    );
    sqlx::query_as::<_, BlogPost>(&sql)
        .bind(&draft.title)
        .bind(&draft.slug)
        .bind(&draft.excerpt)
        .bind(&draft.content)
        .bind(draft.category.map(|c| c.as_str()))
        .bind(&draft.image_url)
        .bind(draft.published)
        .bind(Json(&draft.attachments))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| slug_conflict(e, &draft.slug))
}

pub(super) async fn delete_blog(pool: &PgPool, id: Uuid) -> Result<Option<BlogPost>, StoreError> {
    let sql = format!("DELETE FROM blogs WHERE id = $1 RETURNING {}", BLOG_COLUMNS);
    Ok(sqlx::query_as::<_, BlogPost>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

pub(super) async fn list_sections(
    pool: &PgPool,
    filter: &SectionFilter,
) -> Result<Vec<Section>, StoreError> {
    let sql = format!(
        "SELECT {} FROM sections \
         WHERE ($1::bool IS NULL OR published = $1) \
           AND ($2::text IS NULL OR section_type = $2) \
         ORDER BY order_index ASC, created_at ASC",
        SECTION_COLUMNS
    );
    let rows = sqlx::query_as::<_, SectionRow>(&sql)
        .bind(filter.published)
        .bind(filter.section_type.map(|t| t.as_str()))
        .fetch_all(pool)
        .await?;

    // One bad payload should not blank the whole homepage.
    let mut sections = Vec::with_capacity(rows.len());
    for row in rows {
        match decode_section(row) {
            Ok(section) => sections.push(section),
            Err(e) => tracing::warn!(error = %e, "skipping undecodable section"),
        }
    }
    Ok(sections)
}

pub(super) async fn section(pool: &PgPool, id: Uuid) -> Result<Option<Section>, StoreError> {
    let sql = format!("SELECT {} FROM sections WHERE id = $1", SECTION_COLUMNS);
    sqlx::query_as::<_, SectionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(decode_section)
        .transpose()
}

pub(super) async fn insert_section(
    pool: &PgPool,
    draft: SectionDraft,
) -> Result<Section, StoreError> {
    let sql = format!(
        "INSERT INTO sections (section_type, title, subtitle, content, image_url, cv_file_url, \
                               data, order_index, published, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
         RETURNING {}",
        SECTION_COLUMNS
    );
    let row = sqlx::query_as::<_, SectionRow>(&sql)
        .bind(draft.section_type.as_str())
        .bind(&draft.title)
        .bind(&draft.subtitle)
        .bind(&draft.content)
        .bind(&draft.image_url)
        .bind(&draft.cv_file_url)
        .bind(Json(draft.data.to_value()))
        .bind(draft.order_index)
        .bind(draft.published)
        .fetch_one(pool)
        .await?;
    decode_section(row)
}

pub(super) async fn update_section(
    pool: &PgPool,
    id: Uuid,
    draft: SectionDraft,
) -> Result<Option<Section>, StoreError> {
    let sql = format!(
        "UPDATE sections \
         SET section_type = $1, title = $2, subtitle = $3, content = $4, image_url = $5, \
             cv_file_url = $6, data = $7, order_index = $8, published = $9, updated_at = now() \
         WHERE id = $10 \
         RETURNING {}",
        SECTION_COLUMNS
    );
    sqlx::query_as::<_, SectionRow>(&sql)
        .bind(draft.section_type.as_str())
        .bind(&draft.title)
        .bind(&draft.subtitle)
        .bind(&draft.content)
        .bind(&draft.image_url)
        .bind(&draft.cv_file_url)
        .bind(Json(draft.data.to_value()))
        .bind(draft.order_index)
        .bind(draft.published)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(decode_section)
        .transpose()
}

pub(super) async fn delete_section(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Section>, StoreError> {
    let sql = format!("DELETE FROM sections WHERE id = $1 RETURNING {}", SECTION_COLUMNS);
    sqlx::query_as::<_, SectionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(decode_section)
        .transpose()
}

pub(super) async fn insert_otp(pool: &PgPool, otp: NewOtp) -> Result<OtpSession, StoreError> {
    Ok(sqlx::query_as::<_, OtpSession>(
        r#"
        INSERT INTO admin_sessions (email, otp_code, expires_at, created_at)
        VALUES ($1, $2, $3, now())
        RETURNING id, email, otp_code, verified, expires_at, created_at
        "#,
    )
    .bind(&otp.email)
    .bind(&otp.otp_code)
    .bind(otp.expires_at)
    .fetch_one(pool)
    .await?)
}

pub(super) async fn claim_otp(
    pool: &PgPool,
    email: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Option<OtpSession>, StoreError> {
    Ok(sqlx::query_as::<_, OtpSession>(
        r#"
        UPDATE admin_sessions
        SET verified = true
        WHERE id = (
            SELECT id FROM admin_sessions
            WHERE email = $1 AND otp_code = $2 AND verified = false AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND verified = false
        RETURNING id, email, otp_code, verified, expires_at, created_at
        "#,
    )
    .bind(email)
    .bind(code)
    .bind(now)
    .fetch_optional(pool)
    .await?)
}

pub(super) async fn purge_otps(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM admin_sessions WHERE verified = true OR expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
