//! Server-rendered HTML for the public site and the admin overview.
//!
//! Everything that came from the store is escaped on the way out.

use chrono::{DateTime, Utc};

use crate::config::SiteConfig;
use crate::db::models::{Attachment, BlogCategory, BlogPost, Section, SectionData, SectionType};

pub const EMPTY_HOME: &str = "Content coming soon.";
pub const EMPTY_BLOGS: &str = "No posts published yet.";
pub const EMPTY_CATEGORY: &str = "No posts in this category yet.";
pub const POST_NOT_FOUND: &str = "Post not found";

/// Related posts shown under an article.
const RELATED_POSTS: usize = 3;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn display_date(dt: &DateTime<Utc>) -> String {
    dt.format("%B %-d, %Y").to_string()
}

/// Plain text to paragraphs; blank lines separate them.
fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>")))
        .collect()
}

fn layout(site: &SiteConfig, title: &str, body: &str) -> String {
    let page_title = if title.is_empty() {
        escape_html(&site.title)
    } else {
        format!("{} | {}", escape_html(title), escape_html(&site.title))
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{}</title>
  <meta name="description" content="{}">
  <link rel="alternate" type="application/rss+xml" title="{}" href="/rss.xml">
</head>
<body>
<nav><a href="/">Home</a> <a href="/blogs">Blog</a></nav>
<main>
{}</main>
<footer><p>&copy; {} {}</p></footer>
</body>
</html>
"#,
        page_title,
        escape_html(&site.description),
        escape_html(&site.title),
        body,
        Utc::now().format("%Y"),
        escape_html(&site.owner_name),
    )
}

fn attachment_list(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul class=\"attachments\">\n");
    for a in attachments {
        html.push_str(&format!(
            "  <li><a href=\"{}\" download>{}</a> <small>{} &middot; {} KB</small></li>\n",
            escape_html(&a.url),
            escape_html(&a.filename),
            escape_html(&a.content_type),
            a.size.div_ceil(1024),
        ));
    }
    html.push_str("</ul>\n");
    html
}

fn string_list(items: &[String]) -> String {
    let mut html = String::from("<ul>\n");
    for item in items {
        html.push_str(&format!("  <li>{}</li>\n", escape_html(item)));
    }
    html.push_str("</ul>\n");
    html
}

fn render_section(section: &Section) -> String {
    let mut html = format!(
        "<section id=\"{}\" class=\"section-{}\">\n",
        section.section_type, section.section_type
    );

    let heading = if section.section_type == SectionType::Hero { "h1" } else { "h2" };
    html.push_str(&format!(
        "<{h}>{}</{h}>\n",
        escape_html(&section.title),
        h = heading
    ));
    if let Some(subtitle) = section.subtitle.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!("<p class=\"subtitle\">{}</p>\n", escape_html(subtitle)));
    }
    if let Some(image) = section.image_url.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\">\n",
            escape_html(image),
            escape_html(&section.title)
        ));
    }
    if let Some(content) = section.content.as_deref() {
        html.push_str(&paragraphs(content));
    }

    match &section.data {
        SectionData::Services(data) => {
            html.push_str("<div class=\"services\">\n");
            for service in &data.services {
                html.push_str(&format!(
                    "  <article><h3>{}</h3><p>{}</p></article>\n",
                    escape_html(&service.title),
                    escape_html(&service.description)
                ));
            }
            html.push_str("</div>\n");
        }
        SectionData::ProfessionalSummary(data) => html.push_str(&string_list(&data.summary)),
        SectionData::KeyAchievements(data) => html.push_str(&string_list(&data.achievements)),
        SectionData::Attachments(data) => html.push_str(&attachment_list(&data.attachments)),
        SectionData::Freeform(_) => {}
    }

    if let Some(cv) = section.cv_file_url.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<p><a class=\"cv-download\" href=\"{}\" download>Download Full CV</a></p>\n",
            escape_html(cv)
        ));
    }

    html.push_str("</section>\n");
    html
}

pub fn home_page(site: &SiteConfig, sections: &[Section]) -> String {
    let body = if sections.is_empty() {
        format!("<p class=\"empty\">{}</p>\n", EMPTY_HOME)
    } else {
        sections.iter().map(render_section).collect()
    };
    layout(site, "", &body)
}

fn post_card(post: &BlogPost) -> String {
    let category = post
        .category()
        .map(|c| {
            format!(
                " <a class=\"category\" href=\"/blog/category/{}\">{}</a>",
                c,
                c.label()
            )
        })
        .unwrap_or_default();
    let excerpt = post
        .excerpt
        .as_deref()
        .filter(|e| !e.is_empty())
        .map(|e| format!("<p>{}</p>", escape_html(e)))
        .unwrap_or_default();
    format!(
        "<article>\n  <h2><a href=\"/blog/{}\">{}</a></h2>\n  <p class=\"meta\"><time datetime=\"{}\">{}</time>{}</p>\n  {}\n</article>\n",
        escape_html(&post.slug),
        escape_html(&post.title),
        post.created_at.to_rfc3339(),
        display_date(&post.created_at),
        category,
        excerpt,
    )
}

/// Per-category post counts, in category declaration order, skipping zeros.
pub fn category_counts(posts: &[BlogPost]) -> Vec<(BlogCategory, usize)> {
    BlogCategory::ALL
        .iter()
        .map(|c| (*c, posts.iter().filter(|p| p.category() == Some(*c)).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

pub fn blog_index_page(site: &SiteConfig, posts: &[BlogPost]) -> String {
    let mut body = String::from("<h1>Blog</h1>\n");
    if posts.is_empty() {
        body.push_str(&format!("<p class=\"empty\">{}</p>\n", EMPTY_BLOGS));
        return layout(site, "Blog", &body);
    }

    body.push_str(&format!(
        "<nav class=\"categories\">\n  <a href=\"/blogs\">All ({})</a>\n",
        posts.len()
    ));
    for (category, count) in category_counts(posts) {
        body.push_str(&format!(
            "  <a href=\"/blog/category/{}\">{} ({})</a>\n",
            category,
            category.label(),
            count
        ));
    }
    body.push_str("</nav>\n");
    for post in posts {
        body.push_str(&post_card(post));
    }
    layout(site, "Blog", &body)
}

pub fn category_page(site: &SiteConfig, category: BlogCategory, posts: &[BlogPost]) -> String {
    let mut body = format!(
        "<p><a href=\"/blogs\">&larr; All posts</a></p>\n<h1>{} Blogs</h1>\n",
        category.label()
    );
    if posts.is_empty() {
        body.push_str(&format!("<p class=\"empty\">{}</p>\n", EMPTY_CATEGORY));
    } else {
        for post in posts {
            body.push_str(&post_card(post));
        }
    }
    layout(site, category.label(), &body)
}

/// `related` may include `post` itself; it is skipped.
pub fn post_page(site: &SiteConfig, post: &BlogPost, related: &[BlogPost]) -> String {
    let mut body = String::from("<p><a href=\"/blogs\">&larr; Back to Blog</a></p>\n<article>\n");
    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&post.title)));
    body.push_str(&format!(
        "<p class=\"meta\"><time datetime=\"{}\">{}</time>",
        post.created_at.to_rfc3339(),
        display_date(&post.created_at)
    ));
    if let Some(category) = post.category() {
        body.push_str(&format!(
            " <a class=\"category\" href=\"/blog/category/{}\">{}</a>",
            category,
            category.label()
        ));
    }
    body.push_str("</p>\n");
    if let Some(image) = post.image_url.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\">\n",
            escape_html(image),
            escape_html(&post.title)
        ));
    }
    body.push_str(&paragraphs(&post.content));
    if !post.attachments().is_empty() {
        body.push_str("<h2>Attachments</h2>\n");
        body.push_str(&attachment_list(post.attachments()));
    }
    body.push_str("</article>\n");

    let others: Vec<&BlogPost> = related
        .iter()
        .filter(|p| p.id != post.id)
        .take(RELATED_POSTS)
        .collect();
    if let (Some(category), false) = (post.category(), others.is_empty()) {
        body.push_str(&format!(
            "<aside>\n<h2>More {} Posts</h2>\n",
            category.label()
        ));
        for other in others {
            body.push_str(&post_card(other));
        }
        body.push_str("</aside>\n");
    }

    layout(site, &post.title, &body)
}

pub fn not_found_page(site: &SiteConfig, message: &str) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p><a href=\"/blogs\">Back to Blog</a></p>\n",
        escape_html(message)
    );
    layout(site, message, &body)
}

/// Admin overview: counts per category, the five newest posts and the
/// section list. Editing happens through the JSON API.
pub fn admin_page(
    site: &SiteConfig,
    email: &str,
    posts: &[BlogPost],
    sections: &[Section],
) -> String {
    let mut body = format!(
        "<h1>Admin</h1>\n<p>Signed in as {}</p>\n\
         <form method=\"post\" action=\"/api/auth/logout\"><button type=\"submit\">Log out</button></form>\n",
        escape_html(email)
    );

    let published = posts.iter().filter(|p| p.published).count();
    body.push_str(&format!(
        "<h2>Blog posts</h2>\n<p>{} total, {} published, {} drafts</p>\n<ul class=\"counts\">\n",
        posts.len(),
        published,
        posts.len() - published
    ));
    for category in BlogCategory::ALL {
        let count = posts.iter().filter(|p| p.category() == Some(*category)).count();
        body.push_str(&format!("  <li>{}: {}</li>\n", category.label(), count));
    }
    body.push_str("</ul>\n<h3>Recent posts</h3>\n<ul class=\"recent\">\n");
    for post in posts.iter().take(5) {
        body.push_str(&format!(
            "  <li>{}{} <small>{}</small></li>\n",
            escape_html(&post.title),
            if post.published { "" } else { " (draft)" },
            display_date(&post.updated_at),
        ));
    }
    body.push_str("</ul>\n");

    body.push_str(&format!("<h2>Sections</h2>\n<p>{} total</p>\n<ol class=\"sections\">\n", sections.len()));
    for section in sections {
        body.push_str(&format!(
            "  <li>[{}] {}{}</li>\n",
            section.section_type,
            escape_html(&section.title),
            if section.published { "" } else { " (hidden)" },
        ));
    }
    body.push_str("</ol>\n");

    layout(site, "Admin", &body)
}
