/**
 * Page Routes
 * Server-rendered HTML for the public site and the admin overview
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::db::models::BlogCategory;
use crate::error::AppResult;
use crate::render;
use crate::session::AdminSession;
use crate::state::AppState;
use crate::store::{BlogFilter, SectionFilter};

fn not_found(state: &AppState, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(render::not_found_page(&state.config.site, message)),
    )
        .into_response()
}

/// GET /
pub async fn home(State(state): State<AppState>) -> AppResult<Html<String>> {
    let sections = state.store.list_sections(&SectionFilter::published()).await?;
    Ok(Html(render::home_page(&state.config.site, &sections)))
}

/// GET /blogs
pub async fn blog_index(State(state): State<AppState>) -> AppResult<Html<String>> {
    let posts = state.store.list_blogs(&BlogFilter::published()).await?;
    Ok(Html(render::blog_index_page(&state.config.site, &posts)))
}

/// GET /blog/{slug}
pub async fn blog_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let Some(post) = state
        .store
        .blog_by_slug(&slug)
        .await?
        .filter(|p| p.published)
    else {
        return Ok(not_found(&state, render::POST_NOT_FOUND));
    };

    let related = match post.category() {
        Some(category) => {
            let filter = BlogFilter {
                category: Some(category),
                limit: Some(4),
                ..BlogFilter::published()
            };
            state.store.list_blogs(&filter).await?
        }
        None => Vec::new(),
    };

    Ok(Html(render::post_page(&state.config.site, &post, &related)).into_response())
}

/// GET /blog/category/{category}
pub async fn blog_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Response> {
    let Ok(category) = category.to_ascii_lowercase().parse::<BlogCategory>() else {
        return Ok(not_found(&state, "Category not found"));
    };
    let filter = BlogFilter {
        category: Some(category),
        ..BlogFilter::published()
    };
    let posts = state.store.list_blogs(&filter).await?;
    Ok(Html(render::category_page(&state.config.site, category, &posts)).into_response())
}

/// GET /admin
/// Without a valid session the visitor is sent back to the homepage.
pub async fn admin(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let session = match AdminSession::from_headers(&headers, &state).await {
        Ok(session) => session,
        Err(_) => return Ok(Redirect::to("/").into_response()),
    };

    let posts = state.store.list_blogs(&BlogFilter::default()).await?;
    let sections = state.store.list_sections(&SectionFilter::default()).await?;
    Ok(Html(render::admin_page(
        &state.config.site,
        &session.claims.email,
        &posts,
        &sections,
    ))
    .into_response())
}
