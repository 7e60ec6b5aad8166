use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ServiceError;
use crate::handlers::visitor_context::VisitorContext;
use crate::models::site_models::{Area, BlogPost, Property, Testimonial};
use crate::utils::embeds;
use crate::AppState;

#[derive(Deserialize)]
pub struct PropertiesQuery {
    featured: Option<bool>,
}

/// Detail view with the CMS-entered media URLs normalized to embeds.
/// Malformed URLs simply come back as None.
#[derive(Serialize)]
pub struct PropertyDetail {
    #[serde(flatten)]
    pub property: Property,
    pub video_embed_url: Option<String>,
    pub map_embed_url: Option<String>,
}

pub async fn get_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PropertiesQuery>,
) -> Json<Vec<Property>> {
    let repo = state.content_repository.clone();
    let rows = if query.featured.unwrap_or(false) {
        state
            .query_cache
            .get_or_fetch("featured-properties", move || {
                let repo = repo.clone();
                async move { repo.featured_properties().map_err(ServiceError::from) }
            })
            .await
    } else {
        state
            .query_cache
            .get_or_fetch("published-properties", move || {
                let repo = repo.clone();
                async move { repo.published_properties().map_err(ServiceError::from) }
            })
            .await
    };
    Json(rows)
}

pub async fn get_property(
    State(state): State<Arc<AppState>>,
    context: VisitorContext,
    Path(slug): Path<String>,
) -> Result<Json<PropertyDetail>, (StatusCode, Json<serde_json::Value>)> {
    let property = state
        .content_repository
        .property_by_slug(&slug)
        .map_err(|e| {
            tracing::error!("Database error while fetching property {}: {}", slug, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Database error"})),
            )
        })?;

    let property = match property {
        Some(property) => property,
        None => {
            // The page shows a short notice and then sends the visitor back
            // to the index.
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Property not found", "redirect": "/properties"})),
            ));
        }
    };

    state.analytics.property_view(&context.visitor_id, &slug);

    let video_embed_url = property.video_url.as_deref().and_then(embeds::video_embed_url);
    let map_embed_url = property.map_url.as_deref().and_then(embeds::map_embed_url);
    Ok(Json(PropertyDetail { property, video_embed_url, map_embed_url }))
}

pub async fn get_areas(State(state): State<Arc<AppState>>) -> Json<Vec<Area>> {
    let repo = state.content_repository.clone();
    let rows = state
        .query_cache
        .get_or_fetch("enabled-areas", move || {
            let repo = repo.clone();
            async move { repo.enabled_areas().map_err(ServiceError::from) }
        })
        .await;
    Json(rows)
}

pub async fn get_blog_posts(State(state): State<Arc<AppState>>) -> Json<Vec<BlogPost>> {
    let repo = state.content_repository.clone();
    let rows = state
        .query_cache
        .get_or_fetch("published-posts", move || {
            let repo = repo.clone();
            async move { repo.published_posts().map_err(ServiceError::from) }
        })
        .await;
    Json(rows)
}

pub async fn get_blog_post(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<BlogPost>, (StatusCode, Json<serde_json::Value>)> {
    let post = state.content_repository.post_by_slug(&slug).map_err(|e| {
        tracing::error!("Database error while fetching post {}: {}", slug, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Database error"})),
        )
    })?;
    match post {
        Some(post) => Ok(Json(post)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Post not found", "redirect": "/blog"})),
        )),
    }
}

pub async fn get_testimonials(State(state): State<Arc<AppState>>) -> Json<Vec<Testimonial>> {
    let repo = state.content_repository.clone();
    let rows = state
        .query_cache
        .get_or_fetch("testimonials", move || {
            let repo = repo.clone();
            async move { repo.published_testimonials().map_err(ServiceError::from) }
        })
        .await;
    Json(rows)
}
