//! Deepwatch CLI - watch operations on a JSON document
//!
//! Commands:
//!   deepwatch run <source.json> <script>  - Run a script, printing every event
//!   deepwatch split <path>                - Split a path into its segments

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use deepwatch::script::{Outcome, Script};
use deepwatch::{callback, format_path, Engine, EventKind, EventRecord, RawSettings, Reply};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deepwatch")]
#[command(about = "Watch every operation performed on a JSON document", long_about = None)]
struct Cli {
    /// Log engine internals (-v debug, -vv trace)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a watch script against a JSON document
    Run {
        /// Path to the JSON document
        source: PathBuf,

        /// Path to the script
        script: PathBuf,

        /// TOML settings file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Event to print (repeatable; defaults to all)
        #[arg(long = "on", value_name = "EVENT")]
        on: Vec<EventKind>,

        /// Let callbacks decide the result instead of always running the operation
        #[arg(long)]
        no_default_action: bool,

        /// Attach events raised during a call to the call's own event
        #[arg(long)]
        contain_function_events: bool,

        /// Report paths as segment lists
        #[arg(long)]
        path_as_array: bool,

        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Split a path (or a JSON object of paths) into segments
    Split {
        /// A path such as `a.b[0].c`, or a JSON object with `--json`
        path: String,

        /// Treat the input as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            source,
            script,
            config,
            on,
            no_default_action,
            contain_function_events,
            path_as_array,
            json,
        } => {
            let mut settings = match config {
                Some(path) => RawSettings::load(&path)?,
                None => RawSettings::new(),
            };
            if no_default_action {
                settings.default_action = Some(false);
            }
            settings.contain_function_events |= contain_function_events;
            settings.path_as_array |= path_as_array;
            run_command(&source, &script, settings, &on, json)
        }
        Commands::Split { path, json } => split_command(&path, json),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(
    source: &Path,
    script: &Path,
    settings: RawSettings,
    events: &[EventKind],
    json: bool,
) -> anyhow::Result<()> {
    let document = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let document: serde_json::Value = serde_json::from_str(&document)
        .with_context(|| format!("Failed to parse {}", source.display()))?;
    let script_source = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let script = Script::parse(&script_source)?;

    let mut engine = Engine::from_json(&document, settings)?;
    let kinds = if events.is_empty() {
        EventKind::OBSERVABLE.to_vec()
    } else {
        events.to_vec()
    };
    for kind in kinds {
        engine.on(
            kind,
            callback(move |event| {
                print_event(event, json);
                Reply::Canceled
            }),
        )?;
    }

    script.run(&mut engine, |outcome| print_outcome(outcome, json))?;
    Ok(())
}

fn split_command(path: &str, json: bool) -> anyhow::Result<()> {
    let input = if json {
        serde_json::from_str(path).context("Failed to parse JSON input")?
    } else {
        serde_json::Value::String(path.to_string())
    };
    let output = format_path(&input).unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn print_event(event: &EventRecord, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "could not render event"),
        }
    } else {
        print_event_text(event, "");
    }
}

fn print_event_text(event: &EventRecord, indent: &str) {
    let mut line = format!("{}{:<16} {}", indent, event.kind.name(), event.path.value);
    if let Some(value) = &event.value {
        line.push_str(&format!(" = {}", value));
    }
    if let Some(args) = &event.args {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        line.push_str(&format!("({})", args.join(", ")));
    }
    println!("{}", line);

    let nested_indent = format!("{}  ", indent);
    for nested in &event.nested {
        print_event_text(nested, &nested_indent);
    }
}

fn print_outcome(outcome: &Outcome, json: bool) {
    if json {
        let line = serde_json::json!({ "result": outcome });
        println!("{}", line);
    } else {
        println!("  -> {} {}: {}", outcome.command, outcome.path, outcome.result);
    }
}
