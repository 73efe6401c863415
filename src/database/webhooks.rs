use super::connection::{DbPool, connect};
use crate::models::webhook::*;
use crate::schema::webhooks;
use diesel::prelude::*;

/// Webhook subscription operations
pub struct WebhookOperations<'a> {
    pool: &'a DbPool,
}

impl<'a> WebhookOperations<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::insert_into(webhooks::table)
            .values(webhook)
            .returning(Webhook::as_returning())
            .get_result(&mut conn)
    }

    pub fn list_webhooks(&self) -> Result<Vec<Webhook>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        webhooks::table
            .order(webhooks::id.asc())
            .select(Webhook::as_select())
            .load(&mut conn)
    }

    pub fn enabled_webhooks(&self) -> Result<Vec<Webhook>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        webhooks::table
            .filter(webhooks::enabled.eq(true))
            .order(webhooks::id.asc())
            .select(Webhook::as_select())
            .load(&mut conn)
    }

    pub fn get_webhook(&self, id: i32) -> Result<Option<Webhook>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        webhooks::table
            .find(id)
            .select(Webhook::as_select())
            .first(&mut conn)
            .optional()
    }

    pub fn update_webhook(
        &self,
        id: i32,
        changes: &UpdateWebhook,
    ) -> Result<Option<Webhook>, diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::update(webhooks::table.find(id))
            .set(changes)
            .returning(Webhook::as_returning())
            .get_result(&mut conn)
            .optional()
    }

    pub fn delete_webhook(&self, id: i32) -> Result<bool, diesel::result::Error> {
        let mut conn = connect(self.pool)?;
        let removed = diesel::delete(webhooks::table.find(id)).execute(&mut conn)?;
        Ok(removed > 0)
    }

    pub fn mark_delivered(&self, id: i32) -> Result<(), diesel::result::Error> {
        let mut conn = connect(self.pool)?;

        diesel::update(webhooks::table.find(id))
            .set(webhooks::last_delivery_at.eq(Some(chrono::Utc::now().naive_utc())))
            .execute(&mut conn)?;

        Ok(())
    }
}
