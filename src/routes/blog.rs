/**
 * Blog Routes
 * Public read endpoints and the admin CRUD API for blog posts
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Attachment, BlogPost};
use crate::error::{AppError, AppJson, AppResult};
use crate::routes::{parse_category, validate_attachments, CategoryQuery, SuccessResponse};
use crate::session::AdminSession;
use crate::slug::slugify;
use crate::state::AppState;
use crate::storage::{key_for_path, BLOG_UPLOADS};
use crate::store::{BlogDraft, BlogFilter};

// ============================================================================
// Request Types
// ============================================================================

/// Request body for POST /api/admin/blogs and PUT /api/admin/blogs/{id}.
/// The slug is always derived from the title.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct BlogForm {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl BlogForm {
    /// Validate and merge onto `existing` (fields the form omits keep their
    /// stored value where that makes sense).
    fn into_draft(self, existing: Option<&BlogPost>) -> AppResult<BlogDraft> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::validation("Content is required"));
        }
        let slug = slugify(&title);
        if slug.is_empty() {
            return Err(AppError::validation(
                "Title must contain at least one letter or digit",
            ));
        }
        let category = parse_category(self.category.as_deref())?;
        if let Some(list) = &self.attachments {
            validate_attachments(BLOG_UPLOADS, list)?;
        }

        Ok(BlogDraft {
            title,
            slug,
            excerpt: non_empty(self.excerpt),
            content: self.content,
            category,
            image_url: non_empty(self.image_url),
            published: self
                .published
                .unwrap_or_else(|| existing.is_some_and(|p| p.published)),
            attachments: match (self.attachments, existing) {
                (Some(list), _) => list,
                (None, Some(post)) => post.attachments().to_vec(),
                (None, None) => Vec::new(),
            },
        })
    }
}

// ============================================================================
// Public handlers
// ============================================================================

/// GET /api/blogs - Published posts, newest first
pub async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> AppResult<Json<Vec<BlogPost>>> {
    let filter = BlogFilter {
        category: query.parse()?,
        ..BlogFilter::published()
    };
    Ok(Json(state.store.list_blogs(&filter).await?))
}

/// GET /api/blogs/{slug} - One published post
pub async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<BlogPost>> {
    state
        .store
        .blog_by_slug(&slug)
        .await?
        .filter(|p| p.published)
        .map(Json)
        .ok_or_else(|| AppError::not_found("Post not found"))
}

// ============================================================================
// Admin handlers
// ============================================================================

/// GET /api/admin/blogs - All posts including drafts
pub async fn list_all(
    _admin: AdminSession,
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> AppResult<Json<Vec<BlogPost>>> {
    let filter = BlogFilter {
        category: query.parse()?,
        ..BlogFilter::default()
    };
    Ok(Json(state.store.list_blogs(&filter).await?))
}

/// GET /api/admin/blogs/{id}
pub async fn get_by_id(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BlogPost>> {
    state
        .store
        .blog(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Post not found"))
}

async fn update_existing(state: &AppState, id: Uuid, form: BlogForm) -> AppResult<BlogPost> {
    let existing = state
        .store
        .blog(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;
    let draft = form.into_draft(Some(&existing))?;
    let post = state
        .store
        .update_blog(id, draft)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;
    tracing::info!(post_id = %post.id, slug = %post.slug, "blog post updated");
    Ok(post)
}

/// POST /api/admin/blogs - Create, or update when the body carries an id
pub async fn save(
    _admin: AdminSession,
    State(state): State<AppState>,
    AppJson(form): AppJson<BlogForm>,
) -> AppResult<impl IntoResponse> {
    if let Some(id) = form.id {
        let post = update_existing(&state, id, form).await?;
        return Ok((StatusCode::OK, Json(post)));
    }

    let draft = form.into_draft(None)?;
    let post = state.store.insert_blog(draft).await?;
    tracing::info!(post_id = %post.id, slug = %post.slug, "blog post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/admin/blogs/{id}
pub async fn update(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(form): AppJson<BlogForm>,
) -> AppResult<Json<BlogPost>> {
    Ok(Json(update_existing(&state, id, form).await?))
}

/// DELETE /api/admin/blogs/{id}
/// Attachment objects are removed best-effort after the row is gone.
pub async fn delete(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    let post = state
        .store
        .delete_blog(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;
    tracing::info!(post_id = %post.id, slug = %post.slug, "blog post deleted");

    let keys: Vec<String> = post
        .attachments()
        .iter()
        .filter_map(|a| key_for_path(BLOG_UPLOADS, &a.path))
        .collect();
    if let Err(e) = state.storage.remove(BLOG_UPLOADS, &keys).await {
        tracing::warn!(post_id = %post.id, error = %e, "failed to remove attachment objects");
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, TestApp};
    use serde_json::json;

    fn hello() -> serde_json::Value {
        json!({
            "title": "Hello, World! 2025",
            "content": "First post.",
            "category": "projects",
            "published": true
        })
    }

    #[tokio::test]
    async fn test_admin_routes_require_session() {
        let app = TestApp::new();
        let (status, bytes) = app.get("/api/admin/blogs", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body_json(&bytes)["error"].is_string());

        let (status, _) = app.json("POST", "/api/admin/blogs", None, &hello()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.get("/api/admin/blogs", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_derives_slug() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (status, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &hello())
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let post: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(post.slug, "hello-world-2025");

        let (status, bytes) = app.get("/api/blogs/hello-world-2025", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json(&bytes)["title"], "Hello, World! 2025");
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let app = TestApp::new();
        let token = app.admin_token();
        app.json("POST", "/api/admin/blogs", Some(&token), &hello()).await;

        let mut again = hello();
        again["title"] = json!("hello world 2025");
        let (status, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &again)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body_json(&bytes)["error"], "Slug already exists");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = TestApp::new();
        let token = app.admin_token();

        let (status, _) = app
            .json("POST", "/api/admin/blogs", Some(&token), &json!({"title": " ", "content": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .json("POST", "/api/admin/blogs", Some(&token), &json!({"title": "!!!", "content": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut bad_category = hello();
        bad_category["category"] = json!("gardening");
        let (status, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &bad_category)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&bytes)["error"], "Invalid category");

        let (status, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &json!({"title": 5, "content": "x"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body_json(&bytes)["error"].is_string());
    }

    #[tokio::test]
    async fn test_post_with_id_updates_and_drafts_are_hidden() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (_, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &hello())
            .await;
        let post: BlogPost = serde_json::from_slice(&bytes).unwrap();

        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/blogs",
                Some(&token),
                &json!({"id": post.id, "title": "Renamed", "content": "Body", "published": false}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let updated: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(updated.id, post.id);
        assert_eq!(updated.slug, "renamed");
        assert!(!updated.published);

        let (_, bytes) = app.get("/api/blogs", None).await;
        assert_eq!(body_json(&bytes).as_array().unwrap().len(), 0);
        let (status, _) = app.get("/api/blogs/renamed", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, bytes) = app.get("/api/admin/blogs", Some(&token)).await;
        assert_eq!(body_json(&bytes).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (_, bytes) = app
            .json("POST", "/api/admin/blogs", Some(&token), &hello())
            .await;
        let post: BlogPost = serde_json::from_slice(&bytes).unwrap();
        let uri = format!("/api/admin/blogs/{}", post.id);

        let (status, bytes) = app
            .json("PUT", &uri, Some(&token), &json!({"title": "Hello again", "content": "v2"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let updated: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(updated.slug, "hello-again");
        assert!(updated.published, "omitted published keeps stored value");

        let (status, _) = app.json("DELETE", &uri, Some(&token), &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.json("DELETE", &uri, Some(&token), &json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_list_filters_by_category() {
        let app = TestApp::new();
        let token = app.admin_token();
        app.json("POST", "/api/admin/blogs", Some(&token), &hello()).await;
        app.json(
            "POST",
            "/api/admin/blogs",
            Some(&token),
            &json!({"title": "Rust skills", "content": "x", "category": "skills", "published": true}),
        )
        .await;

        let (_, bytes) = app.get("/api/blogs?category=skills", None).await;
        let list = body_json(&bytes);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["slug"], "rust-skills");

        let (status, _) = app.get("/api/blogs?category=nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
