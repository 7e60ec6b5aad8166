use std::time::{SystemTime, UNIX_EPOCH};

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use uuid::Uuid;

use crate::models::site_models::{Lead, NewLead, NewSubscriber};
use crate::schema::{leads, subscribers};
use crate::DbPool;

/// Captured lead submissions. Once a row lands here the caller holds no
/// authoritative copy; everything downstream (notification email, CMS view)
/// reads from this table.
pub struct LeadRepository {
    pool: DbPool,
}

pub struct LeadSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub inquiry_type: String,
    pub property_id: Option<i32>,
    pub visitor_id: Option<String>,
}

impl LeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn insert_lead(&self, submission: LeadSubmission) -> Result<Lead, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i32;
        let new_lead = NewLead {
            reference: Uuid::new_v4().to_string(),
            name: submission.name,
            email: submission.email,
            phone: submission.phone,
            message: submission.message,
            inquiry_type: submission.inquiry_type,
            property_id: submission.property_id,
            visitor_id: submission.visitor_id,
            created_at,
        };
        diesel::insert_into(leads::table)
            .values(&new_lead)
            .execute(&mut conn)?;
        leads::table
            .filter(leads::reference.eq(&new_lead.reference))
            .first::<Lead>(&mut conn)
    }

    pub fn leads_for_visitor(&self, visitor_id: &str) -> Result<Vec<Lead>, DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        leads::table
            .filter(leads::visitor_id.eq(visitor_id))
            .order(leads::id.asc())
            .load::<Lead>(&mut conn)
    }

    /// Newsletter signup. Re-subscribing the same address is a no-op rather
    /// than an error.
    pub fn save_subscriber(
        &self,
        email: &str,
        source: &str,
        visitor_id: Option<&str>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let subscribed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i32;
        let row = NewSubscriber {
            email: email.to_string(),
            source: source.to_string(),
            visitor_id: visitor_id.map(|v| v.to_string()),
            subscribed_at,
        };
        diesel::insert_into(subscribers::table)
            .values(&row)
            .on_conflict(subscribers::email)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }
}
