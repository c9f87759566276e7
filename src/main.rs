mod availability;
mod client;
mod commands;
mod config;
mod interval;
mod models;
mod scheduler;
mod web;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::BookingInput;

/// Barbershop scheduler: check barber availability and book appointments.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short = 'c', long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Read services, employees and appointments from a JSON export
    /// instead of the backend
    #[arg(long, global = true, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Log debug output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct Booking {
    /// Barber id or name
    #[arg(short, long)]
    barber: String,

    /// Day of the appointment (YYYY-MM-DD)
    #[arg(short, long)]
    date: String,

    /// Comma-separated service ids or names, e.g. "corte,barba"
    #[arg(short, long)]
    services: String,

    /// Id of the appointment being edited; it does not conflict with itself
    #[arg(short, long)]
    edit: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List active barbers and the services on offer
    Catalog,

    /// Check whether a barber can take an appointment
    ///
    /// Example:
    ///   check -b andres -d 2026-03-10 -t 10:30 -s corte,barba
    Check {
        #[command(flatten)]
        booking: Booking,

        /// Start time (HH:MM)
        #[arg(short, long)]
        time: String,
    },

    /// Show a barber's day and the free start times for the given services
    Slots {
        #[command(flatten)]
        booking: Booking,
    },

    /// Check availability and, if free, create (or update) the appointment
    Book {
        #[command(flatten)]
        booking: Booking,

        /// Start time (HH:MM)
        #[arg(short, long)]
        time: String,

        /// Client id (defaults to the logged-in user)
        #[arg(long)]
        client: Option<String>,

        /// Check and show the request without submitting it
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the availability dashboard
    Serve {
        /// Listen address (e.g. "0.0.0.0:3000")
        #[arg(short = 'a', long, default_value = "0.0.0.0:3009")]
        addr: String,
    },
}

impl Booking {
    fn input<'a>(&'a self, time: Option<&'a str>) -> BookingInput<'a> {
        BookingInput {
            barber: &self.barber,
            date: &self.date,
            time,
            services: &self.services,
            edit: self.edit.as_deref(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;
    let snapshot = cli.snapshot.as_deref();

    match &cli.command {
        Command::Catalog => {
            let catalog = commands::load_catalog(&cfg, snapshot, None).await?;
            commands::run_catalog(&catalog);
        }
        Command::Check { booking, time } => {
            commands::run_check(&cfg, snapshot, &booking.input(Some(time.as_str()))).await?;
        }
        Command::Slots { booking } => {
            commands::run_slots(&cfg, snapshot, &booking.input(None)).await?;
        }
        Command::Book {
            booking,
            time,
            client,
            dry_run,
        } => {
            commands::run_book(
                &cfg,
                snapshot,
                &booking.input(Some(time.as_str())),
                client.as_deref(),
                *dry_run,
            )
            .await?;
        }
        Command::Serve { addr } => {
            web::serve(cfg, cli.snapshot.clone(), addr).await?;
        }
    }

    Ok(())
}
