use diesel::prelude::*;
use diesel::result::Error as DieselError;

use crate::models::site_models::{Area, BlogPost, Property, Testimonial};
use crate::schema::{areas, blog_posts, properties, testimonials};
use crate::DbPool;

/// Read-only projections of the catalogue content. Callers go through the
/// query cache, which degrades failures here to empty collections.
pub struct ContentRepository {
    pool: DbPool,
}

impl ContentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn published_properties(&self) -> Result<Vec<Property>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        properties::table
            .filter(properties::status.eq("published"))
            .order(properties::created_at.desc())
            .load::<Property>(&mut conn)
    }

    pub fn featured_properties(&self) -> Result<Vec<Property>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        properties::table
            .filter(properties::status.eq("published"))
            .filter(properties::featured.eq(true))
            .order(properties::created_at.desc())
            .load::<Property>(&mut conn)
    }

    pub fn property_by_slug(&self, slug: &str) -> Result<Option<Property>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        properties::table
            .filter(properties::slug.eq(slug))
            .filter(properties::status.ne("draft"))
            .first::<Property>(&mut conn)
            .optional()
    }

    pub fn enabled_areas(&self) -> Result<Vec<Area>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        areas::table
            .filter(areas::enabled.eq(true))
            .order(areas::display_order.asc())
            .load::<Area>(&mut conn)
    }

    pub fn published_posts(&self) -> Result<Vec<BlogPost>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        blog_posts::table
            .filter(blog_posts::published.eq(true))
            .order(blog_posts::published_at.desc())
            .load::<BlogPost>(&mut conn)
    }

    pub fn post_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        blog_posts::table
            .filter(blog_posts::slug.eq(slug))
            .filter(blog_posts::published.eq(true))
            .first::<BlogPost>(&mut conn)
            .optional()
    }

    pub fn published_testimonials(&self) -> Result<Vec<Testimonial>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        testimonials::table
            .filter(testimonials::published.eq(true))
            .order(testimonials::created_at.desc())
            .load::<Testimonial>(&mut conn)
    }

    /// Slug and last-modified pairs for the sitemap.
    pub fn property_sitemap_entries(&self) -> Result<Vec<(String, i32)>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        properties::table
            .filter(properties::status.eq("published"))
            .select((properties::slug, properties::updated_at))
            .load::<(String, i32)>(&mut conn)
    }

    pub fn post_sitemap_entries(&self) -> Result<Vec<(String, i32)>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        blog_posts::table
            .filter(blog_posts::published.eq(true))
            .select((blog_posts::slug, blog_posts::updated_at))
            .load::<(String, i32)>(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site_models::Property;
    use diesel::r2d2::{self, ConnectionManager};
    use diesel_migrations::MigrationHarness;

    fn test_pool() -> DbPool {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("Failed to create pool");
        let mut conn = pool.get().unwrap();
        conn.run_pending_migrations(crate::MIGRATIONS).unwrap();
        pool
    }

    fn property(slug: &str, status: &str, featured: bool, created_at: i32) -> Property {
        Property {
            id: None,
            slug: slug.to_string(),
            title: format!("Listing {}", slug),
            description: "Three beds by the water".to_string(),
            price: 750_000,
            bedrooms: 3,
            bathrooms: 2,
            property_type: "house".to_string(),
            address: "1 Harbor Road".to_string(),
            area_slug: None,
            status: status.to_string(),
            featured,
            image_url: None,
            video_url: None,
            map_url: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn drafts_never_surface_and_newest_comes_first() {
        let pool = test_pool();
        {
            let mut conn = pool.get().unwrap();
            diesel::insert_into(properties::table)
                .values(&vec![
                    property("old-cottage", "published", false, 100),
                    property("new-villa", "published", true, 200),
                    property("unlisted", "draft", false, 300),
                ])
                .execute(&mut conn)
                .unwrap();
        }
        let repo = ContentRepository::new(pool);
        let listed = repo.published_properties().unwrap();
        assert_eq!(
            listed.iter().map(|p| p.slug.as_str()).collect::<Vec<_>>(),
            vec!["new-villa", "old-cottage"]
        );
        let featured = repo.featured_properties().unwrap();
        assert_eq!(featured.len(), 1);
        assert_eq!(featured[0].slug, "new-villa");
    }

    #[test]
    fn slug_lookup_finds_sold_but_not_draft_listings() {
        let pool = test_pool();
        {
            let mut conn = pool.get().unwrap();
            diesel::insert_into(properties::table)
                .values(&vec![
                    property("sold-flat", "sold", false, 100),
                    property("unlisted", "draft", false, 100),
                ])
                .execute(&mut conn)
                .unwrap();
        }
        let repo = ContentRepository::new(pool);
        assert!(repo.property_by_slug("sold-flat").unwrap().is_some());
        assert!(repo.property_by_slug("unlisted").unwrap().is_none());
        assert!(repo.property_by_slug("missing").unwrap().is_none());
    }
}
