use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::config::SiteConfig;
use crate::db::models::BlogPost;
use crate::error::AppResult;
use crate::state::AppState;
use crate::store::BlogFilter;

/// Posts included in the feed.
pub const FEED_SIZE: i64 = 50;

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn rfc822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

fn render_feed(site: &SiteConfig, posts: &[BlogPost]) -> String {
    let mut items = String::new();
    for post in posts {
        let post_url = format!("{}/blog/{}", site.url, post.slug);
        let desc = post.excerpt.as_deref().unwrap_or("");
        let category = post
            .category()
            .map(|c| format!("      <category>{}</category>\n", escape_xml(c.label())))
            .unwrap_or_default();
        items.push_str(&format!(
            "    <item>\n\
                   <title>{}</title>\n\
                   <link>{}</link>\n\
                   <description>{}</description>\n\
             {}\
                   <pubDate>{}</pubDate>\n\
                   <guid isPermaLink=\"true\">{}</guid>\n\
                 </item>\n",
            escape_xml(&post.title),
            escape_xml(&post_url),
            escape_xml(desc),
            category,
            rfc822(&post.created_at),
            escape_xml(&post_url),
        ));
    }

    let feed_url = format!("{}/rss.xml", site.url);
    let blog_url = format!("{}/blogs", site.url);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <language>en-us</language>
    <atom:link href="{}" rel="self" type="application/rss+xml"/>
    <lastBuildDate>{}</lastBuildDate>
{}  </channel>
</rss>"#,
        escape_xml(&site.title),
        escape_xml(&blog_url),
        escape_xml(&site.description),
        escape_xml(&feed_url),
        posts
            .first()
            .map(|p| rfc822(&p.created_at))
            .unwrap_or_default(),
        items,
    )
}

/// GET /rss.xml
pub async fn rss_feed(State(state): State<AppState>) -> AppResult<Response> {
    let filter = BlogFilter {
        limit: Some(FEED_SIZE),
        ..BlogFilter::published()
    };
    let posts = state.store.list_blogs(&filter).await?;
    let xml = render_feed(&state.config.site, &posts);

    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}
