use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static YOUTUBE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/(?:watch\?v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{6,})")
        .unwrap()
});

static VIMEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"vimeo\.com/(\d+)").unwrap());

/// Normalizes a CMS-entered video URL to an embeddable player URL. Anything
/// unparseable degrades to None, which the page renders as no embed at all.
pub fn video_embed_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return None;
    }
    if let Some(caps) = YOUTUBE_ID.captures(raw) {
        return Some(format!("https://www.youtube.com/embed/{}", &caps[1]));
    }
    if let Some(caps) = VIMEO_ID.captures(raw) {
        return Some(format!("https://player.vimeo.com/video/{}", &caps[1]));
    }
    None
}

/// Accepts only recognizable Google Maps URLs; everything else degrades to
/// an empty embed.
pub fn map_embed_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    let is_maps_host = matches!(
        host,
        "www.google.com" | "google.com" | "maps.google.com" | "maps.app.goo.gl"
    );
    if !is_maps_host {
        return None;
    }
    if host.contains("google.com") && !parsed.path().starts_with("/maps") {
        return None;
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_watch_urls_become_embed_urls() {
        assert_eq!(
            video_embed_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_embed_url("https://youtu.be/dQw4w9WgXcQ"),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn vimeo_urls_become_player_urls() {
        assert_eq!(
            video_embed_url("https://vimeo.com/76979871"),
            Some("https://player.vimeo.com/video/76979871".to_string())
        );
    }

    #[test]
    fn malformed_video_urls_degrade_to_none() {
        assert_eq!(video_embed_url("not a url"), None);
        assert_eq!(video_embed_url("https://example.com/clip.mp4"), None);
        assert_eq!(video_embed_url("javascript:alert(1)"), None);
    }

    #[test]
    fn only_maps_urls_are_embeddable() {
        assert!(map_embed_url("https://www.google.com/maps/embed?pb=!1m18").is_some());
        assert!(map_embed_url("https://maps.app.goo.gl/AbCdEf").is_some());
        assert_eq!(map_embed_url("https://www.google.com/search?q=maps"), None);
        assert_eq!(map_embed_url("http://www.google.com/maps/embed"), None);
        assert_eq!(map_embed_url("<iframe src=x>"), None);
    }
}
