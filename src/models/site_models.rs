use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::areas;
use crate::schema::blog_posts;
use crate::schema::leads;
use crate::schema::properties;
use crate::schema::subscribers;
use crate::schema::testimonials;
use crate::schema::visitor_settings;


#[derive(Queryable, Selectable, Insertable, Clone, Serialize, Deserialize)]
#[diesel(table_name = properties)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Property {
    pub id: Option<i32>,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price: i32, // asking price in whole currency units
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub property_type: String, // "house", "apartment", "townhouse", "land"
    pub address: String,
    pub area_slug: Option<String>, // links the listing to an area guide
    pub status: String, // "draft", "published", "sold"
    pub featured: bool, // featured listings surface on the landing page
    pub image_url: Option<String>,
    pub video_url: Option<String>, // raw CMS value, normalized to an embed before serving
    pub map_url: Option<String>,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone, Serialize, Deserialize)]
#[diesel(table_name = areas)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Area {
    pub id: Option<i32>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub enabled: bool,
    pub display_order: i32,
    pub updated_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone, Serialize, Deserialize)]
#[diesel(table_name = blog_posts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BlogPost {
    pub id: Option<i32>,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub author: Option<String>,
    pub published: bool,
    pub published_at: Option<i32>,
    pub updated_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone, Serialize, Deserialize)]
#[diesel(table_name = testimonials)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Testimonial {
    pub id: Option<i32>,
    pub author: String,
    pub quote: String,
    pub rating: i32, // 1..=5
    pub published: bool,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone, Serialize)]
#[diesel(table_name = leads)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Lead {
    pub id: Option<i32>,
    pub reference: String, // public id handed back to the caller, uuid v4
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub inquiry_type: String, // "general", "property", "valuation", "newsletter"
    pub property_id: Option<i32>,
    pub visitor_id: Option<String>,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub reference: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub inquiry_type: String,
    pub property_id: Option<i32>,
    pub visitor_id: Option<String>,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone, Serialize)]
#[diesel(table_name = subscribers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Subscriber {
    pub id: Option<i32>,
    pub email: String,
    pub source: String, // "footer", "popup"
    pub visitor_id: Option<String>,
    pub subscribed_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = subscribers)]
pub struct NewSubscriber {
    pub email: String,
    pub source: String,
    pub visitor_id: Option<String>,
    pub subscribed_at: i32,
}

#[derive(Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = visitor_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VisitorSetting {
    pub id: Option<i32>,
    pub visitor_id: String,
    pub key: String,
    pub value: String,
    pub updated_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = visitor_settings)]
pub struct NewVisitorSetting {
    pub visitor_id: String,
    pub key: String,
    pub value: String,
    pub updated_at: i32,
}
