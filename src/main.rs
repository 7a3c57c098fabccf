use std::fs::{self, OpenOptions};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod domain;
mod fetcher;
mod model;
mod pager;
mod table;
mod ui;

use controller::Controller;
use domain::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, DEFAULT_TABLE, Filter, PVConfig, PVError};
use fetcher::HttpTableSource;
use model::{Model, Status};
use pager::PagerConfig;
use ui::TableUI;

/// Page through the records of a backend table.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Backend base url, records are read from {base_url}/api/{table}
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Table to fetch
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Query parameter handed to the backend, can be given multiple times
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Records per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: NonZeroUsize,

    /// Go back to the first page whenever data is (re)loaded
    #[arg(long)]
    reset_on_load: bool,

    /// Backend request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Terminal event poll time in ms
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,

    #[arg(long, default_value = "~/.ptv.log")]
    log_file: String,

    /// Log filter, e.g. "info" or "ptv=trace"
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<PVConfig, PVError> {
        if self.table.trim().is_empty() {
            return Err(PVError::InvalidConfig("table name must not be empty".into()));
        }
        let filter: Filter = self
            .filters
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect();
        let pager = PagerConfig::default()
            .with_page_size(self.page_size)
            .with_reset_on_load(self.reset_on_load);

        Ok(PVConfig::default()
            .with_base_url(self.base_url)
            .with_table(self.table)
            .with_filter(filter)
            .with_pager(pager)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_column_width(self.max_column_width)
            .with_event_poll_time(self.event_poll_time))
    }
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got \"{s}\"")),
    }
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            error!("Fatal: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run() -> Result<(), PVError> {
    let cli = Cli::parse();
    init_logging(&cli.log_file, &cli.log_level)?;
    let cfg = cli.into_config()?;
    info!("Starting ptv for {}/api/{}", cfg.base_url, cfg.table);

    let source = HttpTableSource::new(cfg.base_url.clone(), cfg.request_timeout)?;
    let mut model = Model::init(&cfg, Arc::new(source));
    let mut ui = TableUI::new();
    let controller = Controller::new(&cfg);

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut model, &mut ui, &controller);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    ui: &mut TableUI,
    controller: &Controller,
) -> Result<(), PVError> {
    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event()?;
        model.update(message)?;
    }
    Ok(())
}

/// Logs go to a file, the terminal belongs to the UI.
fn init_logging(log_file: &str, log_level: &str) -> Result<(), PVError> {
    let path = shellexpand::full(log_file)
        .map_err(|e| PVError::InvalidConfig(format!("log file \"{log_file}\": {e}")))?;
    let path = PathBuf::from(path.as_ref());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_new(log_level)
        .map_err(|e| PVError::InvalidConfig(format!("log level \"{log_level}\": {e}")))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| PVError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use serde_json::json;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_products_view() {
        let cfg = Cli::try_parse_from(["ptv"]).unwrap().into_config().unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.table, "products");
        assert!(cfg.filter.is_empty());
        assert_eq!(cfg.pager.page_size.get(), 10);
        assert!(!cfg.pager.reset_on_load);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn filters_and_paging_options_are_parsed() {
        let cli = Cli::try_parse_from([
            "ptv",
            "--table",
            "orders",
            "--filter",
            "category=Audio Equipment",
            "--filter",
            "direction=DESC",
            "--page-size",
            "25",
            "--reset-on-load",
        ])
        .unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.table, "orders");
        assert_eq!(cfg.filter["category"], json!("Audio Equipment"));
        assert_eq!(cfg.filter["direction"], json!("DESC"));
        assert_eq!(cfg.pager.page_size.get(), 25);
        assert!(cfg.pager.reset_on_load);
    }

    #[test]
    fn rejects_invalid_options() {
        assert!(Cli::try_parse_from(["ptv", "--page-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["ptv", "--filter", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["ptv", "--filter", "=x"]).is_err());

        let err = Cli::try_parse_from(["ptv", "--table", " "])
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(matches!(err, PVError::InvalidConfig(_)));
    }

    #[test]
    fn filter_values_may_contain_equal_signs() {
        assert_eq!(
            parse_filter("q=a=b"),
            Ok(("q".to_string(), "a=b".to_string()))
        );
    }
}
