/**
 * Section Routes
 * Homepage sections: public listing and admin CRUD
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::models::{Section, SectionData, SectionType};
use crate::error::{AppError, AppJson, AppResult};
use crate::routes::{validate_attachments, SectionTypeQuery, SuccessResponse};
use crate::session::AdminSession;
use crate::state::AppState;
use crate::storage::{key_for_path, CV_FILES};
use crate::store::{SectionDraft, SectionFilter};

/// Request body for POST /api/admin/sections and PUT /api/admin/sections/{id}.
///
/// `data` may be a JSON object or a string holding JSON, as typed into a
/// textarea.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct SectionForm {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub section_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub cv_file_url: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default)]
    pub published: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Turn the submitted `data` into a JSON value. Blank text means "none".
fn parse_data_field(data: Value) -> AppResult<Value> {
    match data {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|_| AppError::validation("Invalid JSON in data field")),
        other => Ok(other),
    }
}

impl SectionForm {
    fn into_draft(self, existing: Option<&Section>) -> AppResult<SectionDraft> {
        let section_type: SectionType = self
            .section_type
            .trim()
            .parse()
            .map_err(|_| AppError::validation("Invalid section type"))?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }

        let data = match self.data {
            Some(raw) => {
                let value = parse_data_field(raw)?;
                let data = SectionData::decode(section_type, value).map_err(|e| {
                    AppError::validation(format!("Invalid data for {} section: {}", section_type, e))
                })?;
                validate_attachments(CV_FILES, data.attachments())?;
                data
            }
            None => match existing {
                Some(s) if s.section_type == section_type => s.data.clone(),
                _ => SectionData::empty(section_type),
            },
        };

        Ok(SectionDraft {
            section_type,
            title,
            subtitle: non_empty(self.subtitle),
            content: non_empty(self.content),
            image_url: non_empty(self.image_url),
            cv_file_url: non_empty(self.cv_file_url),
            data,
            order_index: self
                .order_index
                .or(existing.map(|s| s.order_index))
                .unwrap_or(0),
            published: self
                .published
                .or(existing.map(|s| s.published))
                .unwrap_or(true),
        })
    }
}

/// GET /api/sections - Published sections in display order
pub async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<SectionTypeQuery>,
) -> AppResult<Json<Vec<Section>>> {
    let filter = SectionFilter {
        section_type: query.parse()?,
        ..SectionFilter::published()
    };
    Ok(Json(state.store.list_sections(&filter).await?))
}

/// GET /api/admin/sections - All sections, hidden ones included
pub async fn list_all(
    _admin: AdminSession,
    State(state): State<AppState>,
    Query(query): Query<SectionTypeQuery>,
) -> AppResult<Json<Vec<Section>>> {
    let filter = SectionFilter {
        section_type: query.parse()?,
        ..SectionFilter::default()
    };
    Ok(Json(state.store.list_sections(&filter).await?))
}

/// GET /api/admin/sections/{id}
pub async fn get_by_id(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Section>> {
    state
        .store
        .section(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Section not found"))
}

async fn update_existing(state: &AppState, id: Uuid, form: SectionForm) -> AppResult<Section> {
    let existing = state
        .store
        .section(id)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    let draft = form.into_draft(Some(&existing))?;
    let section = state
        .store
        .update_section(id, draft)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    tracing::info!(section_id = %section.id, section_type = %section.section_type, "section updated");
    Ok(section)
}

/// POST /api/admin/sections - Create, or update when the body carries an id
pub async fn save(
    _admin: AdminSession,
    State(state): State<AppState>,
    AppJson(form): AppJson<SectionForm>,
) -> AppResult<impl IntoResponse> {
    if let Some(id) = form.id {
        let section = update_existing(&state, id, form).await?;
        return Ok((StatusCode::OK, Json(section)));
    }

    let draft = form.into_draft(None)?;
    let section = state.store.insert_section(draft).await?;
    tracing::info!(section_id = %section.id, section_type = %section.section_type, "section created");
    Ok((StatusCode::CREATED, Json(section)))
}

/// PUT /api/admin/sections/{id}
pub async fn update(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(form): AppJson<SectionForm>,
) -> AppResult<Json<Section>> {
    Ok(Json(update_existing(&state, id, form).await?))
}

/// DELETE /api/admin/sections/{id}
pub async fn delete(
    _admin: AdminSession,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    let section = state
        .store
        .delete_section(id)
        .await?
        .ok_or_else(|| AppError::not_found("Section not found"))?;
    tracing::info!(section_id = %section.id, "section deleted");

    let mut keys: Vec<String> = section
        .data
        .attachments()
        .iter()
        .filter_map(|a| key_for_path(CV_FILES, &a.path))
        .collect();
    if let Some(key) = section
        .cv_file_url
        .as_deref()
        .and_then(|url| state.storage.key_from_url(CV_FILES, url))
    {
        keys.push(key);
    }
    if let Err(e) = state.storage.remove(CV_FILES, &keys).await {
        tracing::warn!(section_id = %section.id, error = %e, "failed to remove section files");
    }

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, TestApp};
    use serde_json::json;

    #[test]
    fn test_parse_data_field_accepts_text_and_objects() {
        assert_eq!(
            parse_data_field(json!("{\"summary\": [\"a\"]}")).unwrap(),
            json!({"summary": ["a"]})
        );
        assert_eq!(parse_data_field(json!("  ")).unwrap(), Value::Null);
        assert_eq!(parse_data_field(json!({"a": 1})).unwrap(), json!({"a": 1}));
        assert!(parse_data_field(json!("{not json")).is_err());
    }

    #[tokio::test]
    async fn test_create_with_textarea_data() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(&token),
                &json!({
                    "section_type": "professional_summary",
                    "title": "Summary",
                    "data": "{\"summary\": [\"Ten years of backend work\"]}"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let body = body_json(&bytes);
        assert_eq!(body["data"]["summary"][0], "Ten years of backend work");
        assert_eq!(body["published"], true);
    }

    #[tokio::test]
    async fn test_invalid_json_and_shape_rejected() {
        let app = TestApp::new();
        let token = app.admin_token();

        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(&token),
                &json!({"section_type": "about", "title": "About", "data": "{oops"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&bytes)["error"], "Invalid JSON in data field");

        let (status, _) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(&token),
                &json!({"section_type": "key_achievements", "title": "Wins", "data": {"achievements": "one"}}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, bytes) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(&token),
                &json!({"section_type": "sidebar", "title": "x"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&bytes)["error"], "Invalid section type");
    }

    #[tokio::test]
    async fn test_public_list_orders_and_hides() {
        let app = TestApp::new();
        let token = app.admin_token();
        for (title, order, published) in [("Third", 3, true), ("First", 1, true), ("Hidden", 2, false)] {
            let (status, _) = app
                .json(
                    "POST",
                    "/api/admin/sections",
                    Some(&token),
                    &json!({"section_type": "custom", "title": title, "order_index": order, "published": published}),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, bytes) = app.get("/api/sections", None).await;
        let titles: Vec<String> = body_json(&bytes)
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["First", "Third"]);

        let (_, bytes) = app.get("/api/admin/sections", Some(&token)).await;
        assert_eq!(body_json(&bytes).as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_keeps_data_when_omitted_and_delete() {
        let app = TestApp::new();
        let token = app.admin_token();
        let (_, bytes) = app
            .json(
                "POST",
                "/api/admin/sections",
                Some(&token),
                &json!({
                    "section_type": "services",
                    "title": "What I Do",
                    "data": {"services": [{"title": "APIs", "description": "Rust services"}]}
                }),
            )
            .await;
        let id = body_json(&bytes)["id"].as_str().unwrap().to_string();
        let uri = format!("/api/admin/sections/{}", id);

        let (status, bytes) = app
            .json(
                "PUT",
                &uri,
                Some(&token),
                &json!({"section_type": "services", "title": "Services", "order_index": 4}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let body = body_json(&bytes);
        assert_eq!(body["title"], "Services");
        assert_eq!(body["order_index"], 4);
        assert_eq!(body["data"]["services"][0]["title"], "APIs");

        let (status, _) = app.json("DELETE", &uri, Some(&token), &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&uri, Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
