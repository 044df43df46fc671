use clap::{Parser, Subcommand};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

mod bootstrap;
mod config;
mod db;
mod errors;
mod mail;
mod models;
mod notifier;
mod queue;
mod seeder;
mod utils;

use config::Config;
use db::{StatusChange, Store};
use errors::AppError;
use notifier::Notifier;
use queue::{confirm_booking, CompletedJob, NotificationQueue, WorkerPool};
use seeder::Seeder;

/// Database setup, sample data and booking confirmations for the travel app.
#[derive(Parser, Debug)]
#[command(name = "alx-travel-seed", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clear old data and seed sample users, listings, bookings and reviews.
    Seed,

    /// Create the database if needed and run migrations.
    Setup {
        /// Also run the seed command after setup.
        #[arg(long)]
        seed: bool,
    },

    /// Send confirmation mails for the given booking references.
    Notify {
        #[arg(required = true)]
        booking_ids: Vec<String>,
    },

    /// Mark a pending booking confirmed and send its confirmation mail.
    Confirm { booking_id: String },

    /// List every booking with its stay length, total and status.
    Bookings,

    /// Delete a listing together with its bookings and reviews.
    RemoveListing { listing_id: i64 },
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    run(cli).await.map_err(|e| {
        log::error!("{}", failure_message(&e));
        std::io::Error::from(e)
    })
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Bootstrap(e) => bootstrap::describe(e),
        other => other.to_string(),
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::Seed => {
            let store = Store::connect(&config.database_url).await?;
            seed(&store, &config).await?;
            store.close().await;
        }
        Commands::Setup { seed: with_seed } => {
            info!("Setting up ALX Travel App database...");
            let store = bootstrap::prepare(&config.database_url).await?;
            if with_seed {
                info!("Seeding database...");
                seed(&store, &config).await?;
            }
            store.close().await;
            info!("Database setup completed successfully!");
        }
        Commands::Notify { booking_ids } => {
            let store = Store::connect(&config.database_url).await?;
            let (queue, pool) = start_workers(&store, &config);
            for booking_id in booking_ids {
                queue.enqueue(booking_id);
            }
            drop(queue);
            report(pool.await?);
            store.close().await;
        }
        Commands::Confirm { booking_id } => {
            let store = Store::connect(&config.database_url).await?;
            let (queue, pool) = start_workers(&store, &config);
            match confirm_booking(&store, &queue, &booking_id).await? {
                StatusChange::Updated => info!("Booking {} confirmed", booking_id),
                StatusChange::NotFound => {
                    log::warn!("Booking with ID {} not found", booking_id)
                }
                StatusChange::Refused(current) => log::warn!(
                    "Booking {} is {} and cannot be confirmed",
                    booking_id,
                    current
                ),
            }
            drop(queue);
            report(pool.await?);
            store.close().await;
        }
        Commands::Bookings => {
            let store = Store::connect(&config.database_url).await?;
            for booking in store.list_bookings().await? {
                println!(
                    "{}  listing={} guest={} {} -> {} ({} nights) ${:.2} {}",
                    booking.booking_id,
                    booking.listing_id,
                    booking.guest_id,
                    booking.check_in_date,
                    booking.check_out_date,
                    booking.nights(),
                    booking.total_price,
                    booking.status
                );
            }
            store.close().await;
        }
        Commands::RemoveListing { listing_id } => {
            let store = Store::connect(&config.database_url).await?;
            store.delete_listing(listing_id).await?;
            store.close().await;
        }
    }
    Ok(())
}

async fn seed(store: &Store, config: &Config) -> Result<(), AppError> {
    let rng = match config.seed.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Seeder::new(store, &config.seed, rng).run().await?;
    Ok(())
}

fn start_workers(
    store: &Store,
    config: &Config,
) -> (
    NotificationQueue,
    tokio::task::JoinHandle<Vec<CompletedJob>>,
) {
    let transport = mail::transport_from_config(&config.mail);
    let notifier = Notifier::new(store.clone(), transport, &config.mail);
    let (queue, rx) = NotificationQueue::new();
    let pool = WorkerPool::spawn(notifier, rx, config.notify_workers);
    (queue, pool)
}

fn report(completed: Vec<CompletedJob>) {
    let sent = completed.iter().filter(|(_, o)| o.is_sent()).count();
    for (booking_id, outcome) in &completed {
        println!("{}: {}", booking_id, outcome);
    }
    info!("{} of {} confirmations sent", sent, completed.len());
}
