//! Data Access Layer
//!
//! The PostgreSQL implementation of `RecordStore`. Queries are checked at
//! runtime and run on a shared `PgPool`.

use anyhow::Result;
use async_trait::async_trait;
use hostline_core::{
    menu::{MenuItem, MenuQuery, Restaurant},
    store::{CallLogUpdate, NewOrder, NewReservation, NewTranscript, RecordStore},
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};
use uuid::Uuid;

use crate::models::{MenuItemRow, RestaurantRow};

const RESTAURANT_COLUMNS: &str =
    "id, name, phone, cuisine, voice, greeting_message, system_prompt";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Db {
    async fn find_restaurant_by_phone(&self, phone: &str) -> Result<Option<Restaurant>> {
        let row = sqlx::query_as::<_, RestaurantRow>(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE phone = $1 LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Restaurant::from))
    }

    async fn any_restaurant(&self) -> Result<Option<Restaurant>> {
        let row = sqlx::query_as::<_, RestaurantRow>(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants ORDER BY created_at LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Restaurant::from))
    }

    async fn find_call_log(&self, call_sid: &str) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM call_logs WHERE call_sid = $1")
            .bind(call_sid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn list_menu_items(
        &self,
        restaurant_id: Uuid,
        query: &MenuQuery,
    ) -> Result<Vec<MenuItem>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, restaurant_id, name, description, category, price, available, modifications \
             FROM menu_items WHERE available AND restaurant_id = ",
        );
        qb.push_bind(restaurant_id);

        if let Some(category) = filter_value(&query.category) {
            qb.push(" AND category ILIKE ").push_bind(like_pattern(category));
        }
        if let Some(search) = filter_value(&query.search) {
            let pattern = like_pattern(search);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(name) = filter_value(&query.name) {
            qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        qb.push(" ORDER BY created_at, name");

        let rows = qb
            .build_query_as::<MenuItemRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MenuItem::from).collect())
    }

    async fn insert_transcript(&self, transcript: NewTranscript) -> Result<()> {
        sqlx::query(
            "INSERT INTO transcripts (call_log_id, role, text, timestamp) VALUES ($1, $2, $3, $4)",
        )
        .bind(transcript.call_log_id)
        .bind(transcript.role.to_string())
        .bind(transcript.text)
        .bind(transcript.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (call_log_id, restaurant_id, items, total, delivery_address, status)
            VALUES ($1, $2, $3, $4, $5, 'confirmed')
            RETURNING id
            "#,
        )
        .bind(order.call_log_id)
        .bind(order.restaurant_id)
        .bind(Json(&order.items))
        .bind(order.total)
        .bind(order.delivery_address)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_reservation(&self, reservation: NewReservation) -> Result<Uuid> {
        let guest_count = i32::try_from(reservation.guest_count)?;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO reservations
                (call_log_id, restaurant_id, guest_name, reservation_date, reservation_time,
                 guest_count, special_requests, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'confirmed')
            RETURNING id
            "#,
        )
        .bind(reservation.call_log_id)
        .bind(reservation.restaurant_id)
        .bind(reservation.guest_name)
        .bind(reservation.date)
        .bind(reservation.time)
        .bind(guest_count)
        .bind(reservation.special_requests)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_call_log(&self, call_log_id: Uuid, update: CallLogUpdate) -> Result<()> {
        match update {
            CallLogUpdate::Completed {
                ended_at,
                duration_secs,
            } => {
                sqlx::query(
                    "UPDATE call_logs SET status = 'completed', ended_at = $1, duration = $2 WHERE id = $3",
                )
                .bind(ended_at)
                .bind(duration_secs)
                .bind(call_log_id)
                .execute(&self.pool)
                .await?;
            }
            CallLogUpdate::Kind(kind) => {
                sqlx::query("UPDATE call_logs SET call_type = $1 WHERE id = $2")
                    .bind(kind.to_string())
                    .bind(call_log_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn complete_call_session(&self, call_sid: &str) -> Result<()> {
        sqlx::query("UPDATE call_sessions SET completed = TRUE WHERE call_sid = $1")
            .bind(call_sid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn filter_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `ILIKE` pattern matching `term` anywhere, with wildcards in `term` escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("pizza"), "%pizza%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[test]
    fn test_filter_value_skips_blank_filters() {
        assert_eq!(filter_value(&None), None);
        assert_eq!(filter_value(&Some("   ".to_string())), None);
        assert_eq!(filter_value(&Some(" Mains ".to_string())), Some("Mains"));
    }
}
