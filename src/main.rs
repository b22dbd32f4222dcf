//! # cf - ConnectFlow CLI
//!
//! Command-line front end for store task management: create and publish
//! tasks, submit results from the field, review the queue and report
//! completion per store and department.
//!
//! ## Quick Start
//!
//! ```bash
//! # Load the demo data set
//! cf seed
//!
//! # What needs reviewing?
//! cf review queue
//!
//! # Create and publish a photo task for one store
//! cf task add "Endcap Check" --store "Store A" --due "in 3d" \
//!     --req "image:Endcap photo:1:2" --assigned-by USR-002 --publish
//!
//! # Submit against it
//! cf submit TSK-013 --by "User 2" --store "Store A" --image 0=endcap.jpg
//!
//! # Completion report, or CSV for a spreadsheet
//! cf report stores
//! cf report stores --csv -o report.csv
//! ```
//!
//! Data lives in one JSON file (`--db`, `CONNECTFLOW_DB`, `data_file` in the
//! config file, or the platform data directory). Logs go to stderr; set
//! `RUST_LOG` to override the configured level.

use std::io;
use std::process;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use connectflow::cli::Cli;
use connectflow::cmd::*;
use connectflow::config::{config_path, Config};
use connectflow::db::Database;
use connectflow::{Error, Result};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match config_path(cli.config.as_deref()) {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    };
    let level = config.as_ref().map_or_else(|_| "info".to_string(), |c| c.logging.level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("connectflow={level}"))))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        report_error(&e);
        process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    // Commands that don't touch the store.
    match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            return Ok(());
        }
        Commands::Validate { photo, standard } => return cmd_validate(&config, photo, standard).await,
        _ => {}
    }

    let db_path = config.data_file_path(cli.db.as_deref())?;
    debug!(path = %db_path.display(), "using database");
    let mut db = Database::load(&db_path)?;

    match cli.command {
        Commands::Completions { .. } | Commands::Validate { .. } => unreachable!("handled above"),

        Commands::Task { action } => match action {
            TaskAction::Add {
                name, store, due, time, desc, requirements, recurring, repeat_end, assigned_by, publish,
            } => cmd_task_add(
                &mut db, &db_path, name, store, due, time, desc, requirements, recurring, repeat_end, assigned_by,
                publish,
            ),
            TaskAction::Publish { id } => cmd_task_publish(&mut db, &db_path, id),
            TaskAction::List { all, status, task_type, store, due, sort, limit } => {
                cmd_task_list(&db, all, status, task_type, store, due, sort, limit);
                Ok(())
            }
            TaskAction::View { id } => cmd_task_view(&db, id),
            TaskAction::Requirements { id, entries } => cmd_task_requirements(&mut db, &db_path, id, entries),
            TaskAction::SweepOverdue => cmd_task_sweep_overdue(&mut db, &db_path),
        },

        Commands::Submit {
            task_id, submitted_by, store, date, values, texts, choices, multi_choices, images, checks,
        } => {
            cmd_submit(
                &mut db, &db_path, &config, task_id, submitted_by, store, date, values, texts, choices,
                multi_choices, images, checks,
            )
            .await
        }

        Commands::Submission { action } => match action {
            SubmissionAction::List { status, task, store } => {
                cmd_submission_list(&db, status, task, store);
                Ok(())
            }
            SubmissionAction::View { id } => cmd_submission_view(&db, id),
        },

        Commands::Review { action } => match action {
            ReviewAction::Queue { filter } => cmd_review_queue(&db, filter),
            ReviewAction::Approve { id, feedback } => cmd_review_approve(&mut db, &db_path, id, feedback),
            ReviewAction::Reject { id, feedback } => cmd_review_reject(&mut db, &db_path, id, feedback),
            ReviewAction::Run { filter } => {
                cmd_review_run(&mut db, &db_path, filter, io::stdin().lock(), &mut io::stdout())
            }
        },

        Commands::Report { action } => match action {
            ReportAction::Stores { csv, output } => cmd_report_stores(&db, &config, csv, output),
            ReportAction::Summary { store } => {
                cmd_report_summary(&db, store);
                Ok(())
            }
        },

        Commands::Users => {
            cmd_users(&db);
            Ok(())
        }

        Commands::Notifications { action } => match action {
            NotificationAction::List { unread } => {
                cmd_notifications_list(&db, unread);
                Ok(())
            }
            NotificationAction::Read { id, all } => cmd_notifications_read(&mut db, &db_path, id, all),
        },

        Commands::Seed { force } => cmd_seed(&mut db, &db_path, force),
    }
}

fn report_error(e: &Error) {
    match e {
        Error::Validation(_) => {
            eprintln!("error: validation failed");
            for fe in e.field_errors() {
                eprintln!("  {fe}");
            }
        }
        Error::StandardNotMet { reason, zones } => {
            eprintln!("error: visual standard not met: {reason}");
            for zone in zones {
                eprintln!("  {}: {}", zone.zone_id, zone.reason);
            }
            eprintln!("Your entries were not saved; fix the photo and submit again.");
        }
        Error::NotFound { kind, .. } => {
            eprintln!("error: {e}");
            eprintln!("  see `{}`", entity_hint(*kind));
        }
        e if e.is_retryable() => {
            eprintln!("error: {e}");
            eprintln!("  this may be temporary; try again");
        }
        e => eprintln!("error: {e}"),
    }
}
