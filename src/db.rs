use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::{
    errors::StoreError,
    models::{
        Booking, BookingDetails, BookingStatus, Listing, ListingSpec, NewBooking, Review, User,
        UserSpec,
    },
    utils::hash_password,
};

/// Relational store for users, listings, bookings and reviews.
///
/// Every `upsert_*` is create-if-absent on the entity's unique key and
/// returns the row together with whether it was inserted. A concurrent
/// insert of the same key resolves to "already exists".
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Updated,
    NotFound,
    /// The booking's current status does not allow the move.
    Refused(BookingStatus),
}

fn now() -> String {
    chrono::Utc::now().to_string()
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .read_only(false)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(opts).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection that never expires,
    /// since every new SQLite memory connection is a fresh empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        log::info!("Database migrated successfully");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// The password is only hashed when the user does not exist yet.
    pub async fn upsert_user(
        &self,
        spec: &UserSpec,
        password: &str,
    ) -> Result<(User, bool), StoreError> {
        if let Some(existing) = self.find_user_by_username(&spec.username).await? {
            return Ok((existing, false));
        }

        let pwd_hash = hash_password(password)?;
        let inserted = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, first_name, last_name, pwd_hash, is_superuser, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT(username) DO NOTHING
             RETURNING *",
        )
        .bind(&spec.username)
        .bind(&spec.email)
        .bind(&spec.first_name)
        .bind(&spec.last_name)
        .bind(pwd_hash)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(user) => Ok((user, true)),
            None => {
                let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
                    .bind(&spec.username)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((user, false))
            }
        }
    }

    /// Users matching `usernames`, in the order given. Unknown names are skipped.
    pub async fn users_by_usernames(&self, usernames: &[&str]) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some(user) = self.find_user_by_username(username).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub async fn upsert_listing(
        &self,
        spec: &ListingSpec,
        host_id: i64,
    ) -> Result<(Listing, bool), StoreError> {
        let inserted = sqlx::query_as::<_, Listing>(
            "INSERT INTO listings (title, description, price_per_night, location, amenities, host_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(title) DO NOTHING
             RETURNING *",
        )
        .bind(&spec.title)
        .bind(&spec.description)
        .bind(spec.price_per_night.to_string())
        .bind(&spec.location)
        .bind(&spec.amenities)
        .bind(host_id)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(listing) => Ok((listing, true)),
            None => {
                let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE title = ?")
                    .bind(&spec.title)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((listing, false))
            }
        }
    }

    pub async fn list_listings(&self) -> Result<Vec<Listing>, StoreError> {
        let listings = sqlx::query_as::<_, Listing>("SELECT * FROM listings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(listings)
    }

    pub async fn upsert_booking(&self, new: &NewBooking) -> Result<(Booking, bool), StoreError> {
        let inserted = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (booking_id, listing_id, guest_id, check_in_date, check_out_date, total_price, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(listing_id, guest_id, check_in_date) DO NOTHING
             RETURNING *",
        )
        .bind(&new.booking_id)
        .bind(new.listing_id)
        .bind(new.guest_id)
        .bind(new.check_in_date)
        .bind(new.check_out_date)
        .bind(new.total_price.to_string())
        .bind(new.status.as_str())
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(booking) => Ok((booking, true)),
            None => {
                let booking = sqlx::query_as::<_, Booking>(
                    "SELECT * FROM bookings WHERE listing_id = ? AND guest_id = ? AND check_in_date = ?",
                )
                .bind(new.listing_id)
                .bind(new.guest_id)
                .bind(new.check_in_date)
                .fetch_one(&self.pool)
                .await?;
                Ok((booking, false))
            }
        }
    }

    pub async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>("SELECT * FROM bookings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(bookings)
    }

    pub async fn bookings_with_status(
        &self,
        status: BookingStatus,
    ) -> Result<Vec<Booking>, StoreError> {
        let bookings =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE status = ? ORDER BY id")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(bookings)
    }

    pub async fn booking_details(
        &self,
        booking_ref: &str,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let details = sqlx::query_as::<_, BookingDetails>(
            "SELECT b.booking_id, b.check_in_date, b.check_out_date, b.total_price,
                    l.title AS listing_title,
                    u.username AS guest_username, u.email AS guest_email,
                    u.first_name AS guest_first_name, u.last_name AS guest_last_name
             FROM bookings b
             JOIN listings l ON l.id = b.listing_id
             JOIN users u ON u.id = b.guest_id
             WHERE b.booking_id = ?",
        )
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(details)
    }

    async fn booking_status(&self, booking_ref: &str) -> Result<Option<BookingStatus>, StoreError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE booking_id = ?")
                .bind(booking_ref)
                .fetch_optional(&self.pool)
                .await?;
        raw.map(|s| s.parse()).transpose()
    }

    /// Moves a booking to `next` if its current status allows it.
    /// The update is conditional on the status read, so a concurrent
    /// change is reported as refused rather than overwritten.
    pub async fn set_booking_status(
        &self,
        booking_ref: &str,
        next: BookingStatus,
    ) -> Result<StatusChange, StoreError> {
        let current = match self.booking_status(booking_ref).await? {
            Some(current) => current,
            None => return Ok(StatusChange::NotFound),
        };
        if !current.can_become(next) {
            return Ok(StatusChange::Refused(current));
        }

        let result =
            sqlx::query("UPDATE bookings SET status = ? WHERE booking_id = ? AND status = ?")
                .bind(next.as_str())
                .bind(booking_ref)
                .bind(current.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(match self.booking_status(booking_ref).await? {
                Some(now) => StatusChange::Refused(now),
                None => StatusChange::NotFound,
            });
        }
        log::info!("Booking {} is now {}", booking_ref, next);
        Ok(StatusChange::Updated)
    }

    /// Overwrites a status with no transition check, for arranging fixtures.
    #[cfg(test)]
    pub(crate) async fn force_status(&self, booking_ref: &str, status: BookingStatus) {
        sqlx::query("UPDATE bookings SET status = ? WHERE booking_id = ?")
            .bind(status.as_str())
            .bind(booking_ref)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// A reviewer gets one review per listing, and only once one of their
    /// bookings for it has completed.
    pub async fn upsert_review(
        &self,
        listing_id: i64,
        reviewer_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<(Review, bool), StoreError> {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::InvalidRecord(format!(
                "rating {} is outside 1..=5",
                rating
            )));
        }

        let completed: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE listing_id = ? AND guest_id = ? AND status = 'completed')",
        )
        .bind(listing_id)
        .bind(reviewer_id)
        .fetch_one(&self.pool)
        .await?;
        if completed == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "user {} has no completed booking for listing {}",
                reviewer_id, listing_id
            )));
        }

        let inserted = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (listing_id, reviewer_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(listing_id, reviewer_id) DO NOTHING
             RETURNING *",
        )
        .bind(listing_id)
        .bind(reviewer_id)
        .bind(rating)
        .bind(comment)
        .bind(now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(review) => Ok((review, true)),
            None => {
                let review = sqlx::query_as::<_, Review>(
                    "SELECT * FROM reviews WHERE listing_id = ? AND reviewer_id = ?",
                )
                .bind(listing_id)
                .bind(reviewer_id)
                .fetch_one(&self.pool)
                .await?;
                Ok((review, false))
            }
        }
    }

    #[cfg(test)]
    pub async fn list_reviews(&self) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>("SELECT * FROM reviews ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(reviews)
    }

    /// Deletes a listing together with its reviews and bookings.
    pub async fn delete_listing(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM reviews WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM bookings WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        log::info!("Listing with id {} deleted", id);
        Ok(())
    }

    pub async fn delete_all_reviews(&self) -> Result<u64, StoreError> {
        self.delete_where("DELETE FROM reviews").await
    }

    pub async fn delete_all_bookings(&self) -> Result<u64, StoreError> {
        self.delete_where("DELETE FROM bookings").await
    }

    pub async fn delete_all_listings(&self) -> Result<u64, StoreError> {
        self.delete_where("DELETE FROM listings").await
    }

    pub async fn delete_non_superusers(&self) -> Result<u64, StoreError> {
        self.delete_where("DELETE FROM users WHERE is_superuser = 0")
            .await
    }

    async fn delete_where(&self, sql: &'static str) -> Result<u64, StoreError> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count_users(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM users").await
    }

    pub async fn count_listings(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM listings").await
    }

    pub async fn count_bookings(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM bookings").await
    }

    pub async fn count_reviews(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM reviews").await
    }

    async fn count(&self, sql: &'static str) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn jane() -> UserSpec {
        UserSpec::new("jane_guest", "jane@example.com", "Jane", "Smith")
    }

    fn beach_house() -> ListingSpec {
        ListingSpec {
            title: "Cozy Beach House".into(),
            description: "Beautiful beach house with ocean view".into(),
            price_per_night: Decimal::from_str("150.00").unwrap(),
            location: "Miami, FL".into(),
            amenities: "WiFi, Pool".into(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn booked(store: &Store, status: BookingStatus) -> (User, Listing, Booking) {
        let (host, _) = store
            .upsert_user(&UserSpec::new("john_host", "john@example.com", "John", "Doe"), "pw")
            .await
            .unwrap();
        let (guest, _) = store.upsert_user(&jane(), "pw").await.unwrap();
        let (listing, _) = store.upsert_listing(&beach_house(), host.id).await.unwrap();
        let new = NewBooking::new(&listing, &guest, date("2026-11-01"), date("2026-11-04"), status)
            .unwrap();
        let (booking, _) = store.upsert_booking(&new).await.unwrap();
        (guest, listing, booking)
    }

    #[tokio::test]
    async fn upsert_user_leaves_existing_rows_alone() {
        let store = Store::in_memory().await.unwrap();
        let (first, created) = store.upsert_user(&jane(), "password123").await.unwrap();
        assert!(created);

        let mut changed = jane();
        changed.email = "other@example.com".into();
        let (second, created) = store.upsert_user(&changed, "different").await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.email, "jane@example.com");
        assert_eq!(second.pwd_hash, first.pwd_hash);
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn listing_price_survives_storage() {
        let store = Store::in_memory().await.unwrap();
        let (host, _) = store.upsert_user(&jane(), "pw").await.unwrap();
        let (listing, created) = store.upsert_listing(&beach_house(), host.id).await.unwrap();
        assert!(created);
        assert_eq!(listing.price_per_night.to_string(), "150.00");

        let (again, created) = store.upsert_listing(&beach_house(), host.id).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, listing.id);
    }

    #[tokio::test]
    async fn booking_key_match_returns_existing_row() {
        let store = Store::in_memory().await.unwrap();
        let (guest, listing, booking) = booked(&store, BookingStatus::Pending).await;
        assert_eq!(booking.nights(), 3);
        assert_eq!(booking.total_price.to_string(), "450.00");

        let repeat = NewBooking::new(
            &listing,
            &guest,
            date("2026-11-01"),
            date("2026-11-07"),
            BookingStatus::Confirmed,
        )
        .unwrap();
        let (existing, created) = store.upsert_booking(&repeat).await.unwrap();
        assert!(!created);
        assert_eq!(existing.booking_id, booking.booking_id);
        assert_eq!(existing.status, BookingStatus::Pending);
        assert_eq!(store.count_bookings().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn review_requires_completed_booking() {
        let store = Store::in_memory().await.unwrap();
        let (guest, listing, booking) = booked(&store, BookingStatus::Confirmed).await;

        let early = store.upsert_review(listing.id, guest.id, 5, "Great").await;
        assert!(matches!(early, Err(StoreError::InvalidRecord(_))));

        assert_eq!(
            store
                .set_booking_status(&booking.booking_id, BookingStatus::Completed)
                .await
                .unwrap(),
            StatusChange::Updated
        );
        let (review, created) = store
            .upsert_review(listing.id, guest.id, 5, "Great")
            .await
            .unwrap();
        assert!(created);

        let (again, created) = store
            .upsert_review(listing.id, guest.id, 3, "Changed my mind")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, review.id);
        assert_eq!(again.rating, 5);
    }

    #[tokio::test]
    async fn review_rating_is_bounded() {
        let store = Store::in_memory().await.unwrap();
        let (guest, listing, _) = booked(&store, BookingStatus::Completed).await;
        for rating in [0, 6] {
            let result = store.upsert_review(listing.id, guest.id, rating, "x").await;
            assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
        }
    }

    #[tokio::test]
    async fn booking_details_joins_listing_and_guest() {
        let store = Store::in_memory().await.unwrap();
        let (_, _, booking) = booked(&store, BookingStatus::Confirmed).await;

        let details = store
            .booking_details(&booking.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.listing_title, "Cozy Beach House");
        assert_eq!(details.guest_email, "jane@example.com");
        assert_eq!(details.guest_display_name(), "Jane Smith");

        assert!(store.booking_details("missing").await.unwrap().is_none());
        assert_eq!(
            store
                .set_booking_status("missing", BookingStatus::Cancelled)
                .await
                .unwrap(),
            StatusChange::NotFound
        );
    }

    #[tokio::test]
    async fn finished_bookings_keep_their_status() {
        let store = Store::in_memory().await.unwrap();
        let (_, _, booking) = booked(&store, BookingStatus::Completed).await;

        for next in [BookingStatus::Confirmed, BookingStatus::Cancelled] {
            assert_eq!(
                store
                    .set_booking_status(&booking.booking_id, next)
                    .await
                    .unwrap(),
                StatusChange::Refused(BookingStatus::Completed)
            );
        }

        store
            .force_status(&booking.booking_id, BookingStatus::Cancelled)
            .await;
        assert_eq!(
            store
                .set_booking_status(&booking.booking_id, BookingStatus::Confirmed)
                .await
                .unwrap(),
            StatusChange::Refused(BookingStatus::Cancelled)
        );
        let stored = store.list_bookings().await.unwrap().remove(0);
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn delete_listing_cascades_explicitly() {
        let store = Store::in_memory().await.unwrap();
        let (guest, listing, _) = booked(&store, BookingStatus::Completed).await;
        store
            .upsert_review(listing.id, guest.id, 4, "Nice")
            .await
            .unwrap();

        store.delete_listing(listing.id).await.unwrap();
        assert_eq!(store.count_listings().await.unwrap(), 0);
        assert_eq!(store.count_bookings().await.unwrap(), 0);
        assert_eq!(store.count_reviews().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_parents_first_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        booked(&store, BookingStatus::Pending).await;
        assert!(store.delete_all_listings().await.is_err());
        assert_eq!(store.count_listings().await.unwrap(), 1);
    }
}
