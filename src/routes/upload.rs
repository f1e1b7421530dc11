use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Attachment, BlogPost, Section};
use crate::error::{AppError, AppResult};
use crate::session::AdminSession;
use crate::state::AppState;
use crate::storage::{key_for_path, object_key_for, BLOG_UPLOADS, CV_FILES};
use crate::store::{BlogDraft, SectionDraft};

/// Largest accepted file.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB

const ATTACHMENT_ID_LEN: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub attachment: Attachment,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CvUploadResponse {
    pub cv_file_url: String,
    pub section_id: Uuid,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: axum::body::Bytes,
}

/// Take the first field that carries a file name. Other fields are ignored.
async fn read_single_file(multipart: &mut Multipart) -> AppResult<UploadedFile> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(AppError::validation("No file provided")),
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return Err(AppError::validation("Invalid multipart data"));
            }
        };

        let Some(filename) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upload bytes: {}", e);
            AppError::validation("Failed to read file data")
        })?;

        if bytes.len() > MAX_FILE_SIZE {
            return Err(AppError::validation("File too large. Maximum size is 10MB."));
        }
        if bytes.is_empty() {
            return Err(AppError::validation("Empty file"));
        }

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }
}

/// Write the file to `bucket` under a fresh key and describe it.
async fn store_file(state: &AppState, bucket: &str, file: UploadedFile) -> AppResult<Attachment> {
    let key = object_key_for(&file.filename);
    let size = file.bytes.len() as u64;
    state
        .storage
        .upload(bucket, &key, file.bytes, &file.content_type)
        .await?;
    tracing::info!(bucket, key = %key, size, "file uploaded");

    Ok(Attachment {
        id: Alphanumeric
            .sample_string(&mut rand::rng(), ATTACHMENT_ID_LEN)
            .to_ascii_lowercase(),
        filename: file.filename,
        url: state.storage.public_url(bucket, &key),
        path: key,
        content_type: file.content_type,
        size,
    })
}

fn orphaned(bucket: &str, key: &str, err: AppError) -> AppError {
    tracing::warn!(bucket, key, error = %err, "row update failed; uploaded object left orphaned");
    err
}

/// Delete the object behind a descriptor that is being dropped. A path that
/// names no key in `bucket` is skipped so the descriptor can still go.
async fn remove_object(state: &AppState, bucket: &str, path: &str) -> AppResult<()> {
    match key_for_path(bucket, path) {
        Some(key) => Ok(state.storage.remove(bucket, &[key]).await?),
        None => {
            tracing::warn!(bucket, path, "attachment path is not a storage key; object left orphaned");
            Ok(())
        }
    }
}

async fn load_post(state: &AppState, id: Uuid) -> AppResult<BlogPost> {
    state
        .store
        .blog(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))
}

async fn load_attachment_section(state: &AppState, id: Uuid) -> AppResult<Section> {
    let section = state
        .store
        .section(id)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    if !section.section_type.holds_attachments() {
        return Err(AppError::validation(
            "Attachments are only supported on cv and cv_download sections",
        ));
    }
    Ok(section)
}

/// POST /api/admin/blogs/{id}/attachments
pub async fn add_blog_attachment(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let post = load_post(&state, id).await?;
    let file = read_single_file(&mut multipart).await?;
    let attachment = store_file(&state, BLOG_UPLOADS, file).await?;

    let mut draft = BlogDraft::from(&post);
    draft.attachments.push(attachment.clone());
    let updated = match state.store.update_blog(id, draft).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            return Err(orphaned(BLOG_UPLOADS, &attachment.path, AppError::not_found("Post not found")))
        }
        Err(e) => return Err(orphaned(BLOG_UPLOADS, &attachment.path, e.into())),
    };

    Ok((
        StatusCode::CREATED,
        Json(AttachmentResponse {
            attachment,
            attachments: updated.attachments().to_vec(),
        }),
    ))
}

/// DELETE /api/admin/blogs/{id}/attachments/{attachment_id}
pub async fn remove_blog_attachment(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path((id, attachment_id)): Path<(Uuid, String)>,
) -> AppResult<Json<BlogPost>> {
    let post = load_post(&state, id).await?;
    let mut draft = BlogDraft::from(&post);
    let index = draft
        .attachments
        .iter()
        .position(|a| a.id == attachment_id)
        .ok_or_else(|| AppError::not_found("Attachment not found"))?;

    let removed = draft.attachments.remove(index);
    remove_object(&state, BLOG_UPLOADS, &removed.path).await?;

    let updated = state
        .store
        .update_blog(id, draft)
        .await?
        .ok_or_else(|| AppError::not_found("Post not found"))?;
    tracing::info!(post_id = %id, attachment_id = %removed.id, "attachment removed");
    Ok(Json(updated))
}

/// POST /api/admin/sections/{id}/attachments
pub async fn add_section_attachment(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let section = load_attachment_section(&state, id).await?;
    let file = read_single_file(&mut multipart).await?;
    let attachment = store_file(&state, CV_FILES, file).await?;

    let mut draft = SectionDraft::from(&section);
    if let Some(list) = draft.data.attachments_mut() {
        list.push(attachment.clone());
    }
    let updated = match state.store.update_section(id, draft).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            return Err(orphaned(CV_FILES, &attachment.path, AppError::not_found("Section not found")))
        }
        Err(e) => return Err(orphaned(CV_FILES, &attachment.path, e.into())),
    };

    Ok((
        StatusCode::CREATED,
        Json(AttachmentResponse {
            attachment,
            attachments: updated.data.attachments().to_vec(),
        }),
    ))
}

/// DELETE /api/admin/sections/{id}/attachments/{attachment_id}
pub async fn remove_section_attachment(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path((id, attachment_id)): Path<(Uuid, String)>,
) -> AppResult<Json<Section>> {
    let section = load_attachment_section(&state, id).await?;
    let mut draft = SectionDraft::from(&section);
    let list = draft
        .data
        .attachments_mut()
        .ok_or_else(|| AppError::not_found("Attachment not found"))?;
    let index = list
        .iter()
        .position(|a| a.id == attachment_id)
        .ok_or_else(|| AppError::not_found("Attachment not found"))?;

    let removed = list.remove(index);
    remove_object(&state, CV_FILES, &removed.path).await?;

    let updated = state
        .store
        .update_section(id, draft)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    tracing::info!(section_id = %id, attachment_id = %removed.id, "attachment removed");
    Ok(Json(updated))
}

/// POST /api/admin/sections/{id}/cv
/// Replaces `cv_file_url`; a previous file in the CV bucket is deleted
/// best-effort.
pub async fn upload_cv(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let section = state
        .store
        .section(id)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    let file = read_single_file(&mut multipart).await?;
    let stored = store_file(&state, CV_FILES, file).await?;

    let previous = section
        .cv_file_url
        .as_deref()
        .and_then(|url| state.storage.key_from_url(CV_FILES, url));

    let mut draft = SectionDraft::from(&section);
    draft.cv_file_url = Some(stored.url.clone());
    match state.store.update_section(id, draft).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(orphaned(CV_FILES, &stored.path, AppError::not_found("Section not found")))
        }
        Err(e) => return Err(orphaned(CV_FILES, &stored.path, e.into())),
    }

    if let Some(key) = previous {
        if let Err(e) = state.storage.remove(CV_FILES, &[key]).await {
            tracing::warn!(section_id = %id, error = %e, "failed to remove previous cv file");
        }
    }

    tracing::info!(section_id = %id, "cv file replaced");
    Ok((
        StatusCode::CREATED,
        Json(CvUploadResponse {
            cv_file_url: stored.url,
            section_id: id,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, TestApp};
    use serde_json::json;

    async fn create_post(app: &TestApp, token: &str) -> BlogPost {
        let (_, bytes) = app
            .json(
                "POST",
                "/api/admin/blogs",
                Some(token),
                &json!({"title": "With files", "content": "See attached.", "published": true}),
            )
            .await;
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_section(app: &TestApp, token: &str, section_type: &str) -> String {
        let (_, bytes) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(token),
                &json!({"section_type": section_type, "title": "CV"}),
            )
            .await;
        body_json(&bytes)["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_blog_attachment_upload_then_remove() {
        let app = TestApp::new();
        let token = app.admin_token();
        let post = create_post(&app, &token).await;
        let uri = format!("/api/admin/blogs/{}/attachments", post.id);

        let (status, bytes) = app
            .upload(&uri, &token, "Slides.PDF", "application/pdf", b"%PDF-1.4 test")
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let body: AttachmentResponse = serde_json::from_slice(&bytes).unwrap();
        let attachment = body.attachment;
        assert_eq!(attachment.filename, "Slides.PDF");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(attachment.size, 13);
        assert!(attachment.path.ends_with(".pdf"));
        assert_eq!(attachment.url, format!("/storage/blog-uploads/{}", attachment.path));
        assert_eq!(body.attachments.len(), 1);

        let object = app.storage_dir.path().join(BLOG_UPLOADS).join(&attachment.path);
        assert!(object.exists());

        let (status, bytes) = app
            .json(
                "DELETE",
                &format!("{}/{}", uri, attachment.id),
                Some(&token),
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let updated: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert!(updated.attachments().iter().all(|a| a.id != attachment.id));
        assert!(!object.exists());

        let (status, _) = app
            .json(
                "DELETE",
                &format!("{}/{}", uri, attachment.id),
                Some(&token),
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn descriptor(id: &str, path: &str) -> serde_json::Value {
        json!({
            "id": id,
            "filename": "a.pdf",
            "path": path,
            "type": "application/pdf",
            "size": 3,
            "url": format!("/storage/{}", path)
        })
    }

    #[tokio::test]
    async fn test_bucket_prefixed_attachment_can_be_removed() {
        let app = TestApp::new();
        let token = app.admin_token();
        let bucket = app.storage_dir.path().join(BLOG_UPLOADS);
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("a.pdf"), b"pdf").unwrap();

        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/blogs",
                Some(&token),
                &json!({
                    "title": "Imported",
                    "content": "x",
                    "attachments": [descriptor("legacy1", "blog-uploads/a.pdf")]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let post: BlogPost = serde_json::from_slice(&bytes).unwrap();

        let (status, bytes) = app
            .json(
                "DELETE",
                &format!("/api/admin/blogs/{}/attachments/legacy1", post.id),
                Some(&token),
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let updated: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert!(updated.attachments().is_empty());
        assert!(!bucket.join("a.pdf").exists());
    }

    #[tokio::test]
    async fn test_attachment_paths_outside_bucket_rejected() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/blogs",
                Some(&token),
                &json!({
                    "title": "Sneaky",
                    "content": "x",
                    "attachments": [descriptor("bad", "../secrets/a.pdf")]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(&bytes)["error"],
            "Invalid attachment path: ../secrets/a.pdf"
        );
    }

    #[tokio::test]
    async fn test_stored_descriptor_with_foreign_path_still_removable() {
        let app = TestApp::new();
        let token = app.admin_token();
        let attachment: Attachment =
            serde_json::from_value(descriptor("stray", "elsewhere/nested/a.pdf")).unwrap();
        let post = app
            .state
            .store
            .insert_blog(BlogDraft {
                title: "Old row".to_string(),
                slug: "old-row".to_string(),
                excerpt: None,
                content: "x".to_string(),
                category: None,
                image_url: None,
                published: false,
                attachments: vec![attachment],
            })
            .await
            .unwrap();

        let (status, bytes) = app
            .json(
                "DELETE",
                &format!("/api/admin/blogs/{}/attachments/stray", post.id),
                Some(&token),
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let updated: BlogPost = serde_json::from_slice(&bytes).unwrap();
        assert!(updated.attachments().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_file_and_unknown_post() {
        let app = TestApp::new();
        let token = app.admin_token();
        let post = create_post(&app, &token).await;

        let (status, bytes) = app
            .upload(
                &format!("/api/admin/blogs/{}/attachments", post.id),
                &token,
                "empty.txt",
                "text/plain",
                b"",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&bytes)["error"], "Empty file");

        let (status, _) = app
            .upload(
                &format!("/api/admin/blogs/{}/attachments", Uuid::new_v4()),
                &token,
                "a.txt",
                "text/plain",
                b"x",
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_section_attachments_only_on_cv_sections() {
        let app = TestApp::new();
        let token = app.admin_token();

        let about = create_section(&app, &token, "about").await;
        let (status, _) = app
            .upload(
                &format!("/api/admin/sections/{}/attachments", about),
                &token,
                "cv.pdf",
                "application/pdf",
                b"pdf",
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let cv = create_section(&app, &token, "cv").await;
        let uri = format!("/api/admin/sections/{}/attachments", cv);
        let (status, bytes) = app
            .upload(&uri, &token, "cv.pdf", "application/pdf", b"pdf")
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let body: AttachmentResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.attachments.len(), 1);
        assert!(app
            .storage_dir
            .path()
            .join(CV_FILES)
            .join(&body.attachment.path)
            .exists());

        let (status, bytes) = app
            .json(
                "DELETE",
                &format!("{}/{}", uri, body.attachment.id),
                Some(&token),
                &json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json(&bytes)["data"]["attachments"], json!([]));
    }

    #[tokio::test]
    async fn test_cv_upload_replaces_previous_file() {
        let app = TestApp::new();
        let token = app.admin_token();
        let id = create_section(&app, &token, "cv_download").await;
        let uri = format!("/api/admin/sections/{}/cv", id);

        let (status, bytes) = app
            .upload(&uri, &token, "cv-v1.pdf", "application/pdf", b"one")
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let first: CvUploadResponse = serde_json::from_slice(&bytes).unwrap();
        let first_key = first.cv_file_url.rsplit('/').next().unwrap().to_string();
        let first_path = app.storage_dir.path().join(CV_FILES).join(&first_key);
        assert!(first_path.exists());

        let (_, bytes) = app
            .upload(&uri, &token, "cv-v2.pdf", "application/pdf", b"two")
            .await;
        let second: CvUploadResponse = serde_json::from_slice(&bytes).unwrap();
        assert_ne!(first.cv_file_url, second.cv_file_url);
        assert!(!first_path.exists());

        let (_, bytes) = app
            .get(&format!("/api/admin/sections/{}", id), Some(&token))
            .await;
        assert_eq!(body_json(&bytes)["cv_file_url"], json!(second.cv_file_url));
    }

    #[tokio::test]
    async fn test_uploads_require_session() {
        let app = TestApp::new();
        let (status, _) = app
            .upload(
                &format!("/api/admin/blogs/{}/attachments", Uuid::new_v4()),
                "bogus",
                "a.txt",
                "text/plain",
                b"x",
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
