use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::errors::StoreError;

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub pwd_hash: String,
    pub is_superuser: bool,
    pub created_at: String,
}

impl User {
    /// Full name if either part is set, otherwise the username.
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }
}

fn display_name(first: &str, last: &str, username: &str) -> String {
    let full = format!("{} {}", first.trim(), last.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_owned()
    } else {
        full.to_owned()
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price_per_night: Decimal,
    pub location: String,
    pub amenities: String,
    pub host_id: i64,
    pub created_at: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Allowed moves: pending to confirmed or cancelled, confirmed to
    /// completed or cancelled. Completed and cancelled are final.
    pub fn can_become(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown booking status '{}'",
                other
            ))),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Booking {
    pub id: i64,
    pub booking_id: String,
    pub listing_id: i64,
    pub guest_id: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: String,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.check_out_date - self.check_in_date).num_days()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Review {
    pub id: i64,
    pub listing_id: i64,
    pub reviewer_id: i64,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

/// Input for create-if-absent on users, keyed by `username`.
#[derive(Debug, Clone)]
pub struct UserSpec {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserSpec {
    pub fn new(username: &str, email: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            username: username.to_owned(),
            email: email.to_owned(),
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
        }
    }
}

/// Input for create-if-absent on listings, keyed by `title`.
#[derive(Debug, Clone)]
pub struct ListingSpec {
    pub title: String,
    pub description: String,
    pub price_per_night: Decimal,
    pub location: String,
    pub amenities: String,
}

/// A booking ready to insert. The total is fixed here, from the listing's
/// price at creation time, and never recomputed afterwards.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_id: String,
    pub listing_id: i64,
    pub guest_id: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: Decimal,
    pub status: BookingStatus,
}

impl NewBooking {
    pub fn new(
        listing: &Listing,
        guest: &User,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
        status: BookingStatus,
    ) -> Result<Self, StoreError> {
        let nights = (check_out_date - check_in_date).num_days();
        if nights <= 0 {
            return Err(StoreError::InvalidRecord(format!(
                "check-out {} must be after check-in {}",
                check_out_date, check_in_date
            )));
        }
        Ok(Self {
            booking_id: uuid::Uuid::new_v4().to_string(),
            listing_id: listing.id,
            guest_id: guest.id,
            check_in_date,
            check_out_date,
            total_price: listing.price_per_night * Decimal::from(nights),
            status,
        })
    }
}

/// A booking joined with its listing and guest, everything the
/// confirmation message needs.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub booking_id: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: Decimal,
    pub listing_title: String,
    pub guest_username: String,
    pub guest_email: String,
    pub guest_first_name: String,
    pub guest_last_name: String,
}

impl BookingDetails {
    pub fn guest_display_name(&self) -> String {
        display_name(
            &self.guest_first_name,
            &self.guest_last_name,
            &self.guest_username,
        )
    }
}

fn decode_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_owned(),
        source: Box::new(e),
    })
}

fn decode_status(row: &SqliteRow) -> Result<BookingStatus, sqlx::Error> {
    let raw: String = row.try_get("status")?;
    raw.parse().map_err(|e: StoreError| sqlx::Error::ColumnDecode {
        index: "status".to_owned(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, SqliteRow> for Listing {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price_per_night: decode_decimal(row, "price_per_night")?,
            location: row.try_get("location")?,
            amenities: row.try_get("amenities")?,
            host_id: row.try_get("host_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Booking {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            booking_id: row.try_get("booking_id")?,
            listing_id: row.try_get("listing_id")?,
            guest_id: row.try_get("guest_id")?,
            check_in_date: row.try_get("check_in_date")?,
            check_out_date: row.try_get("check_out_date")?,
            total_price: decode_decimal(row, "total_price")?,
            status: decode_status(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for BookingDetails {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            booking_id: row.try_get("booking_id")?,
            check_in_date: row.try_get("check_in_date")?,
            check_out_date: row.try_get("check_out_date")?,
            total_price: decode_decimal(row, "total_price")?,
            listing_title: row.try_get("listing_title")?,
            guest_username: row.try_get("guest_username")?,
            guest_email: row.try_get("guest_email")?,
            guest_first_name: row.try_get("guest_first_name")?,
            guest_last_name: row.try_get("guest_last_name")?,
        })
    }
}
