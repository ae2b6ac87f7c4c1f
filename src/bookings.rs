//! Interview booking records.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{BookingStatus, InterviewBooking};

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub name: String,
    pub email: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        BookingError::Storage(e.into())
    }
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.name.trim().is_empty() {
            return Err(BookingError::Invalid("name must not be empty".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(BookingError::Invalid(format!(
                "invalid email address: {}",
                self.email
            )));
        }
        if NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").is_err() {
            return Err(BookingError::Invalid(format!(
                "invalid date '{}': expected YYYY-MM-DD",
                self.date
            )));
        }
        if NaiveTime::parse_from_str(&self.time, "%H:%M").is_err() {
            return Err(BookingError::Invalid(format!(
                "invalid time '{}': expected HH:MM",
                self.time
            )));
        }
        Ok(())
    }
}

/// Syntactic check only: one `@`, a non-empty local part and a dotted
/// domain without empty labels.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

pub async fn create_booking(
    pool: &SqlitePool,
    request: &BookingRequest,
) -> Result<InterviewBooking, BookingError> {
    request.validate()?;

    let booking = InterviewBooking {
        id: Uuid::new_v4().to_string(),
        name: request.name.trim().to_string(),
        email: request.email.trim().to_string(),
        date: request.date.clone(),
        time: request.time.clone(),
        status: BookingStatus::Scheduled,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO interview_bookings (id, name, email, date, time, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&booking.id)
    .bind(&booking.name)
    .bind(&booking.email)
    .bind(&booking.date)
    .bind(&booking.time)
    .bind(booking.status.as_str())
    .bind(booking.created_at.timestamp())
    .execute(pool)
    .await?;

    tracing::info!(booking_id = %booking.id, date = %booking.date, time = %booking.time, "interview booked");
    Ok(booking)
}

pub async fn get_booking(pool: &SqlitePool, id: &str) -> Result<Option<InterviewBooking>> {
    let row = sqlx::query(
        "SELECT id, name, email, date, time, status, created_at FROM interview_bookings WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_booking).transpose()
}

fn row_to_booking(row: &SqliteRow) -> Result<InterviewBooking> {
    let status: String = row.get("status");
    let created_at: i64 = row.get("created_at");

    Ok(InterviewBooking {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        date: row.get("date"),
        time: row.get("time"),
        status: status.parse()?,
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
    })
}
