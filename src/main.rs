use dashfeed::core::db::SqliteConnector;
use dashfeed::dashboards::{self, Dashboard, DashboardDef};
use dashfeed::settings::resolve_settings;
use dashfeed::summary;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: dashfeed [--settings <path>] [--json] <cold-wave|incidents|flood|all>";

#[derive(Debug, PartialEq)]
struct Args {
    settings: Option<PathBuf>,
    json: bool,
    dashboard: String,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut settings = None;
    let mut json = false;
    let mut dashboard = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--settings" => settings = Some(PathBuf::from(iter.next()?)),
            "--json" => json = true,
            name if !name.starts_with("--") && dashboard.is_none() => {
                dashboard = Some(name.to_string())
            }
            _ => return None,
        }
    }
    Some(Args {
        settings,
        json,
        dashboard: dashboard?,
    })
}

fn selected(name: &str) -> Option<Vec<&'static DashboardDef>> {
    if name == "all" {
        return Some(dashboards::ALL.to_vec());
    }
    dashboards::find(name).map(|def| vec![def])
}

fn main() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&raw_args) else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let Some(defs) = selected(&args.dashboard) else {
        eprintln!("Unknown dashboard: {}", args.dashboard);
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let settings = match resolve_settings(args.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize the logging system using tracing subscriber
    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(config_dir = %settings.config_dir.display(), "Starting dashfeed...");

    let connector = Arc::new(SqliteConnector);
    for def in defs {
        let dashboard = match Dashboard::new(def, connector.clone(), &settings) {
            Ok(dashboard) => dashboard,
            Err(e) => {
                eprintln!("{}: {}", def.name, e);
                continue;
            }
        };
        let outcome = dashboard.load();

        if args.json {
            match outcome.table.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("{}: {}", def.name, e),
            }
            if let Some(err) = &outcome.error {
                eprintln!("{}", def.failure_message);
                eprintln!("Error: {}", err);
            }
        } else {
            let now = chrono::Local::now().naive_local();
            println!("{}\n", summary::render(def, &outcome, now));
        }

        if let Err(e) = dashboard.close() {
            warn!(dashboard = def.name, error = %e, "failed to close connection");
        }
    }
    ExitCode::SUCCESS
}
