use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use review_service::{
    Config, JsonStore, MemoryStore, PostgresStore, ReservationEvent, ReservationEventStore,
    ReservationStatus, Review, ReviewError, ReviewService, ReviewStore, StorageBackend, TargetType,
};

#[derive(Parser)]
#[command(name = "review-service")]
#[command(about = "Host and accommodation reviews, gated on completed reservations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(long, default_value = "review-service.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List all reviews
    List,

    /// Show one review
    Show {
        /// Review ID
        id: Uuid,
    },

    /// List reviews about a host or an accommodation
    ByTarget {
        /// host or accommodation
        #[arg(long, value_parser = parse_target_type)]
        target_type: TargetType,

        /// Host username or accommodation ID
        #[arg(long)]
        target_id: String,
    },

    /// Submit a review, or change the stars of an existing one when --id is given
    Add {
        /// Reviewing guest
        #[arg(long)]
        reviewer: String,

        /// Host being reviewed
        #[arg(long, conflicts_with = "accommodation", required_unless_present = "accommodation")]
        host: Option<String>,

        /// Accommodation being reviewed
        #[arg(long)]
        accommodation: Option<i64>,

        #[arg(long)]
        stars: u8,

        /// Existing review ID to resubmit under
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Change the stars of a review
    Update {
        /// Review ID
        id: Uuid,

        #[arg(long)]
        stars: u8,
    },

    /// Delete a review as its author
    Delete {
        /// Review ID
        id: Uuid,

        /// Acting username
        #[arg(long, env = "USER")]
        user: String,
    },

    /// Record or remove reservation events
    Reservation {
        #[command(subcommand)]
        command: ReservationCommands,
    },

    /// Run database migrations (postgres backend)
    Migrate,
}

#[derive(Subcommand)]
enum ReservationCommands {
    /// Record a reservation event
    Record {
        /// Reservation ID
        #[arg(long)]
        id: String,

        #[arg(long)]
        guest: String,

        #[arg(long)]
        host: String,

        #[arg(long)]
        accommodation: i64,

        /// reserved, completed or cancelled
        #[arg(long, default_value = "completed", value_parser = parse_status)]
        status: ReservationStatus,
    },

    /// Remove a reservation event
    Remove {
        /// Reservation ID
        id: String,
    },
}

fn parse_target_type(s: &str) -> Result<TargetType, String> {
    TargetType::parse(s).ok_or_else(|| format!("expected host or accommodation, got {}", s))
}

fn parse_status(s: &str) -> Result<ReservationStatus, String> {
    ReservationStatus::parse(s)
        .ok_or_else(|| format!("expected reserved, completed or cancelled, got {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    // Logs go to stderr, stdout carries JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log_level.parse()?))
        .init();

    match config.storage.backend {
        StorageBackend::Json => {
            let store = JsonStore::new(&config.storage.json_path)?;
            run(ReviewService::new(store.clone(), store), cli.command).await
        }
        StorageBackend::Memory => {
            let store = MemoryStore::new();
            run(ReviewService::new(store.clone(), store), cli.command).await
        }
        StorageBackend::Postgres => {
            let url = config.storage.database_url()?;
            let store = PostgresStore::new(&url, config.storage.max_connections).await?;

            if let Commands::Migrate = cli.command {
                return store.migrate().await;
            }

            run(ReviewService::new(store.clone(), store), cli.command).await
        }
    }
}

async fn run<R, E>(service: ReviewService<R, E>, command: Commands) -> Result<()>
where
    R: ReviewStore,
    E: ReservationEventStore,
{
    match command {
        Commands::List => print_json(&service.get_all().await?),
        Commands::Show { id } => {
            let review = service
                .get_by_id(&id)
                .await?
                .ok_or(ReviewError::NotFound(id))?;
            print_json(&review)
        }
        Commands::ByTarget {
            target_type,
            target_id,
        } => print_json(&service.get_by_target(target_type, &target_id).await?),
        Commands::Add {
            reviewer,
            host,
            accommodation,
            stars,
            id,
        } => {
            let review = match (host, accommodation) {
                (Some(host), _) => Review::for_host(reviewer, host, stars),
                (None, Some(accommodation)) => {
                    Review::for_accommodation(reviewer, accommodation, stars)
                }
                (None, None) => anyhow::bail!("Either --host or --accommodation is required"),
            };
            let review = match id {
                Some(id) => review.with_id(id),
                None => review,
            };

            service.add_review(&review).await?;

            let stored = service
                .get_by_id(&review.id)
                .await?
                .context("Review missing right after saving")?;
            print_json(&stored)
        }
        Commands::Update { id, stars } => {
            let mut patch = service
                .get_by_id(&id)
                .await?
                .ok_or(ReviewError::NotFound(id))?;
            patch.stars = stars;

            print_json(&service.update_review(&id, &patch).await?)
        }
        Commands::Delete { id, user } => {
            service.delete_review(&id, &user).await?;
            println!("Deleted review {}", id);
            Ok(())
        }
        Commands::Reservation { command } => match command {
            ReservationCommands::Record {
                id,
                guest,
                host,
                accommodation,
                status,
            } => {
                let event = ReservationEvent::new(id, guest, host, accommodation, status);
                service.save_reservation_event(&event).await?;
                print_json(&event)
            }
            ReservationCommands::Remove { id } => {
                service.remove_reservation_event(&id).await?;
                println!("Removed reservation event {}", id);
                Ok(())
            }
        },
        Commands::Migrate => {
            info!("Nothing to migrate for this storage backend");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
