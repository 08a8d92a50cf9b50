use anyhow::{Context, Result, bail};
use board_feedback::{BoardImage, CellCorrection, Config, FeedbackStore, Orientation, PieceLabel};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Confirm;
use std::any::Any;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "board_feedback.json";

fn cli() -> Command {
    let all = Arg::new("all")
        .long("all")
        .action(ArgAction::SetTrue)
        .help("Include superseded records");

    Command::new("board-feedback")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and extend the piece-recognition correction log")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Store config (JSON)")
                .default_value(DEFAULT_CONFIG)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("feedback-file")
                .long("feedback-file")
                .value_name("FILE")
                .help("Override the feedback log location")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand_required(true)
        .subcommand(Command::new("stats").about("Correction statistics").arg(all.clone()))
        .subcommand(
            Command::new("training-set")
                .about("List (image, label) pairs")
                .arg(all),
        )
        .subcommand(Command::new("sessions").about("Per-session record counts"))
        .subcommand(
            Command::new("session")
                .about("List the records of one session")
                .arg(Arg::new("id").required(true)),
        )
        .subcommand(
            Command::new("correct")
                .about("Record a correction for one square of a board image")
                .arg(
                    Arg::new("board")
                        .long("board")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(Arg::new("row").long("row").required(true).value_parser(value_parser!(u32)))
                .arg(Arg::new("col").long("col").required(true).value_parser(value_parser!(u32)))
                .arg(
                    Arg::new("orientation")
                        .long("orientation")
                        .default_value("white")
                        .value_parser(["white", "black"]),
                )
                .arg(Arg::new("predicted").long("predicted").required(true))
                .arg(
                    Arg::new("confidence")
                        .long("confidence")
                        .required(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(Arg::new("corrected").long("corrected").required(true))
                .arg(Arg::new("session").long("session").help("Session id (generated if omitted)")),
        )
        .subcommand(
            Command::new("export")
                .about("Copy the full log to another file")
                .arg(Arg::new("path").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("clear")
                .about("Delete every record and square image")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Skip the confirmation prompt"),
                ),
        )
}

fn arg<'a, T: Any + Clone + Send + Sync + 'static>(
    matches: &'a ArgMatches,
    id: &str,
) -> Result<&'a T> {
    matches
        .get_one::<T>(id)
        .with_context(|| format!("missing --{id}"))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    let config_path: &PathBuf = arg(&matches, "config")?;
    let mut config = Config::load(config_path).context("Failed to load config")?;
    if let Some(file) = matches.get_one::<PathBuf>("feedback-file") {
        config.feedback_file = file.clone();
    }

    let session = matches
        .subcommand_matches("correct")
        .and_then(|m| m.get_one::<String>("session"))
        .cloned();
    let store = FeedbackStore::open(&config, session).with_context(|| {
        format!("Failed to open feedback log {}", config.feedback_file.display())
    })?;

    match matches.subcommand() {
        Some(("stats", m)) => {
            print!("{}", store.get_statistics(!m.get_flag("all")));
        }
        Some(("training-set", m)) => {
            let pairs = store.get_training_set(!m.get_flag("all"));
            if pairs.is_empty() {
                println!("Training set is empty.");
            }
            for (image, label) in pairs {
                println!("{label:<13} {image}");
            }
        }
        Some(("sessions", _)) => {
            for (session, summary) in store.session_summary() {
                println!(
                    "{session}: {} total, {} active",
                    summary.total_count, summary.active_count
                );
            }
        }
        Some(("session", m)) => {
            let id: &String = arg(m, "id")?;
            for record in store.get_by_session(id) {
                println!(
                    "{} {} {} -> {} ({:.2}){}",
                    record.created_at().format("%Y-%m-%d %H:%M:%S"),
                    record.square_name(),
                    record.original_label().map_or("-", PieceLabel::name),
                    record.corrected_label(),
                    record.original_confidence(),
                    if record.is_active() { "" } else { " [superseded]" }
                );
            }
        }
        Some(("correct", m)) => {
            let orientation: Orientation = arg::<String>(m, "orientation")?.parse()?;
            let cell = CellCorrection {
                row: *arg(m, "row")?,
                col: *arg(m, "col")?,
                orientation,
                predicted: arg::<String>(m, "predicted")?.parse()?,
                confidence: *arg(m, "confidence")?,
                corrected: arg::<String>(m, "corrected")?.parse()?,
            };
            let board_path: &PathBuf = arg(m, "board")?;
            let board = BoardImage::open(board_path, &config.fingerprinter())
                .with_context(|| format!("Failed to load board image {}", board_path.display()))?;
            let record = store
                .record_correction(&board, cell, None)
                .context("Correction was not recorded")?;
            println!(
                "Recorded {}: {} (key {})",
                record.square_name(),
                record.corrected_label(),
                record.content_key().map_or("-", |k| k.as_str())
            );
        }
        Some(("export", m)) => {
            let path: &PathBuf = arg(m, "path")?;
            store.export(path).context("Failed to export feedback")?;
            println!("Exported {} records to {}", store.len(), path.display());
        }
        Some(("clear", m)) => {
            let confirmed = m.get_flag("yes")
                || Confirm::new()
                    .with_prompt(format!(
                        "Delete all {} records and their square images? This cannot be undone",
                        store.len()
                    ))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Nothing deleted.");
                return Ok(());
            }
            store.clear().context("Failed to clear feedback store")?;
            println!("Feedback store cleared.");
        }
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("no command given"),
    }

    Ok(())
}
