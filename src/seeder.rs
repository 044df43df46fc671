use chrono::{Duration, NaiveDate};
use rand::{seq::SliceRandom, Rng};

use crate::{
    config::SeedConfig,
    db::Store,
    errors::SeedError,
    models::{BookingStatus, ListingSpec, NewBooking, UserSpec},
};

pub use sample::{sample_listings, sample_users, GUEST_USERNAMES, HOST_USERNAMES, REVIEW_COMMENTS};

const SEEDED_STATUSES: [BookingStatus; 3] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::Completed,
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub listings: usize,
    pub bookings: usize,
    pub reviews: usize,
}

/// Fills the store with a demo dataset.
///
/// Each step writes straight to the store. A failing write aborts the
/// remaining steps and leaves whatever was already written in place.
pub struct Seeder<'a, R: Rng> {
    store: &'a Store,
    config: &'a SeedConfig,
    rng: R,
    today: NaiveDate,
}

impl<'a, R: Rng> Seeder<'a, R> {
    pub fn new(store: &'a Store, config: &'a SeedConfig, rng: R) -> Self {
        Self {
            store,
            config,
            rng,
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Anchor date for generated check-ins.
    #[cfg(test)]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Reset, then seed the sample users, listings, bookings and reviews.
    pub async fn run(&mut self) -> Result<SeedSummary, SeedError> {
        log::info!("Starting database seeding...");
        self.reset().await?;

        let summary = SeedSummary {
            users: self.seed_users(&sample_users()).await?,
            listings: self
                .seed_listings(&sample_listings(), &HOST_USERNAMES)
                .await?,
            bookings: self.seed_bookings(&GUEST_USERNAMES).await?,
            reviews: self.seed_reviews(&REVIEW_COMMENTS).await?,
        };

        log::info!("Successfully seeded the database! {:?}", summary);
        log::info!(
            "Database now holds {} users, {} listings, {} bookings, {} reviews",
            self.store.count_users().await?,
            self.store.count_listings().await?,
            self.store.count_bookings().await?,
            self.store.count_reviews().await?
        );
        Ok(summary)
    }

    /// Children before parents, so no foreign key is left dangling.
    pub async fn reset(&mut self) -> Result<(), SeedError> {
        log::info!("Clearing old data...");
        let reviews = self.store.delete_all_reviews().await?;
        let bookings = self.store.delete_all_bookings().await?;
        let listings = self.store.delete_all_listings().await?;
        let users = self.store.delete_non_superusers().await?;
        log::info!(
            "Deleted {} reviews, {} bookings, {} listings, {} users",
            reviews,
            bookings,
            listings,
            users
        );
        Ok(())
    }

    pub async fn seed_users(&mut self, specs: &[UserSpec]) -> Result<usize, SeedError> {
        let mut created = 0;
        for spec in specs {
            let (user, was_created) = self
                .store
                .upsert_user(spec, &self.config.default_password)
                .await?;
            if was_created {
                log::info!("Created user: {} ({})", user.username, user.display_name());
                created += 1;
            }
        }
        Ok(created)
    }

    /// Hosts are assigned round-robin in the order of `host_pool`.
    pub async fn seed_listings(
        &mut self,
        specs: &[ListingSpec],
        host_pool: &[&str],
    ) -> Result<usize, SeedError> {
        if specs.is_empty() {
            return Ok(0);
        }
        let hosts = self.store.users_by_usernames(host_pool).await?;
        if hosts.is_empty() {
            return Err(SeedError::EmptyPool("hosts"));
        }

        let mut created = 0;
        for (i, spec) in specs.iter().enumerate() {
            let host = &hosts[i % hosts.len()];
            let (listing, was_created) = self.store.upsert_listing(spec, host.id).await?;
            if was_created {
                log::info!("Created listing: {}", listing.title);
                created += 1;
            }
        }
        Ok(created)
    }

    /// One booking attempt per (listing, guest) pair, with a random check-in
    /// 1..=30 days out, a 2..=7 night stay and a random non-cancelled status.
    pub async fn seed_bookings(&mut self, guest_pool: &[&str]) -> Result<usize, SeedError> {
        let listings = self.store.list_listings().await?;
        let guests = self.store.users_by_usernames(guest_pool).await?;

        let mut created = 0;
        for listing in &listings {
            for guest in &guests {
                let check_in = self.today + Duration::days(self.rng.gen_range(1..=30));
                let check_out = check_in + Duration::days(self.rng.gen_range(2..=7));
                let status = *SEEDED_STATUSES
                    .choose(&mut self.rng)
                    .unwrap_or(&BookingStatus::Pending);

                let new = NewBooking::new(listing, guest, check_in, check_out, status)?;
                let (_, was_created) = self.store.upsert_booking(&new).await?;
                if was_created {
                    log::info!("Created booking for {}", listing.title);
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// One review per (listing, guest) pair with a completed booking,
    /// rated 3..=5.
    pub async fn seed_reviews(&mut self, comment_pool: &[&str]) -> Result<usize, SeedError> {
        let completed = self
            .store
            .bookings_with_status(BookingStatus::Completed)
            .await?;
        if completed.is_empty() {
            return Ok(0);
        }

        let mut created = 0;
        for booking in &completed {
            let rating = self.rng.gen_range(3..=5);
            let comment = comment_pool
                .choose(&mut self.rng)
                .ok_or(SeedError::EmptyPool("review comments"))?;

            let (_, was_created) = self
                .store
                .upsert_review(booking.listing_id, booking.guest_id, rating, comment)
                .await?;
            if was_created {
                log::info!("Created review for listing {}", booking.listing_id);
                created += 1;
            }
        }
        Ok(created)
    }
}

pub mod sample {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use crate::models::{ListingSpec, UserSpec};

    pub const HOST_USERNAMES: [&str; 2] = ["john_host", "alice_host"];
    pub const GUEST_USERNAMES: [&str; 2] = ["jane_guest", "bob_traveler"];

    pub const REVIEW_COMMENTS: [&str; 5] = [
        "Great place to stay! Highly recommended.",
        "Beautiful location and excellent amenities.",
        "Host was very responsive and helpful.",
        "Clean and comfortable accommodation.",
        "Amazing views and peaceful environment.",
    ];

    pub fn sample_users() -> Vec<UserSpec> {
        vec![
            UserSpec::new("john_host", "john@example.com", "John", "Doe"),
            UserSpec::new("jane_guest", "jane@example.com", "Jane", "Smith"),
            UserSpec::new("bob_traveler", "bob@example.com", "Bob", "Johnson"),
            UserSpec::new("alice_host", "alice@example.com", "Alice", "Brown"),
        ]
    }

    fn listing(
        title: &str,
        description: &str,
        price: &str,
        location: &str,
        amenities: &str,
    ) -> ListingSpec {
        ListingSpec {
            title: title.to_owned(),
            description: description.to_owned(),
            price_per_night: Decimal::from_str(price).unwrap_or_default(),
            location: location.to_owned(),
            amenities: amenities.to_owned(),
        }
    }

    pub fn sample_listings() -> Vec<ListingSpec> {
        vec![
            listing(
                "Cozy Beach House",
                "Beautiful beach house with ocean view",
                "150.00",
                "Miami, FL",
                "WiFi, Pool, Beach Access, Parking",
            ),
            listing(
                "Mountain Cabin Retreat",
                "Peaceful cabin in the mountains",
                "120.00",
                "Aspen, CO",
                "WiFi, Fireplace, Hiking Trails, Parking",
            ),
            listing(
                "Downtown Apartment",
                "Modern apartment in city center",
                "200.00",
                "New York, NY",
                "WiFi, Gym, Concierge, Public Transport",
            ),
            listing(
                "Lakeside Villa",
                "Luxurious villa by the lake",
                "300.00",
                "Lake Tahoe, CA",
                "WiFi, Private Dock, Hot Tub, Parking",
            ),
        ]
    }
}
