use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::AppState;

// Fixed site routes; dynamic property and post URLs are appended from the
// database.
const STATIC_ROUTES: [(&str, &str, &str); 7] = [
    ("", "daily", "1.0"),
    ("properties", "daily", "0.9"),
    ("areas", "weekly", "0.7"),
    ("blog", "weekly", "0.7"),
    ("valuation", "monthly", "0.6"),
    ("about", "monthly", "0.5"),
    ("contact", "monthly", "0.5"),
];

pub async fn sitemap(State(state): State<Arc<AppState>>) -> Response {
    let base_url = std::env::var("SITE_URL")
        .unwrap_or_else(|_| "https://www.harborviewestates.com".to_string());

    // Query failures degrade to the static route list rather than a failed
    // response.
    let properties = state
        .content_repository
        .property_sitemap_entries()
        .unwrap_or_else(|e| {
            tracing::warn!("Sitemap property query failed: {}", e);
            Vec::new()
        });
    let posts = state.content_repository.post_sitemap_entries().unwrap_or_else(|e| {
        tracing::warn!("Sitemap post query failed: {}", e);
        Vec::new()
    });

    match build_sitemap(&base_url, &properties, &posts) {
        Ok(xml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml")],
            xml,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to build sitemap: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn iso_date(timestamp: i32) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

fn build_sitemap(
    base_url: &str,
    properties: &[(String, i32)],
    posts: &[(String, i32)],
) -> anyhow::Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", "http://www.sitemaps.org/schemas/sitemap/0.9"));
    writer.write_event(Event::Start(urlset))?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    for (route, changefreq, priority) in STATIC_ROUTES {
        let loc = if route.is_empty() {
            format!("{}/", base_url)
        } else {
            format!("{}/{}", base_url, route)
        };
        write_url(&mut writer, &loc, &today, changefreq, priority)?;
    }
    for (slug, updated_at) in properties {
        let loc = format!("{}/properties/{}", base_url, slug);
        write_url(&mut writer, &loc, &iso_date(*updated_at), "weekly", "0.8")?;
    }
    for (slug, updated_at) in posts {
        let loc = format!("{}/blog/{}", base_url, slug);
        write_url(&mut writer, &loc, &iso_date(*updated_at), "monthly", "0.6")?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_url<W: std::io::Write>(
    writer: &mut Writer<W>,
    loc: &str,
    lastmod: &str,
    changefreq: &str,
    priority: &str,
) -> anyhow::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("url")))?;
    for (tag, value) in [
        ("loc", loc),
        ("lastmod", lastmod),
        ("changefreq", changefreq),
        ("priority", priority),
    ] {
        writer.write_event(Event::Start(BytesStart::new(tag)))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("url")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_entries_carry_their_lastmod() {
        let xml = build_sitemap(
            "https://example.com",
            &[("bay-house".to_string(), 1718150400)], // 2024-06-12
            &[("market-update".to_string(), 1718150400)],
        )
        .unwrap();
        assert!(xml.contains("<loc>https://example.com/properties/bay-house</loc>"));
        assert!(xml.contains("<loc>https://example.com/blog/market-update</loc>"));
        assert!(xml.contains("<lastmod>2024-06-12</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<priority>0.8</priority>"));
    }

    #[test]
    fn static_routes_survive_an_empty_database() {
        let xml = build_sitemap("https://example.com", &[], &[]).unwrap();
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(xml.contains("<loc>https://example.com/properties</loc>"));
        assert!(xml.contains("<loc>https://example.com/valuation</loc>"));
        assert!(xml.starts_with("<?xml"));
        assert!(xml.ends_with("</urlset>"));
    }
}
