//! Snip a screen region, have a vision model read it, and get spreadsheet-ready cells back.

mod client;
mod config;
mod machine_id;
mod models;
mod paths;
mod prompt;
mod secret;
mod session;
mod system;
mod table;
mod view;
mod worker;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub use client::{ApiClient, ApiError, KeyUsage, UsageSummary};
pub use config::{Config, ConfigError, ConfigStore};
pub use prompt::{OutputMode, TableDimensions};
pub use system::{CapturedImage, ClipboardError, Region, ScreenshotError};
pub use table::Table;
pub use view::ResultView;

use session::Session;
use system::ClipboardSink;
use worker::Dispatcher;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("No API key configured, run `snip2excel set-key`")]
    MissingKey,
}

/// Options for a single non-interactive capture.
#[derive(Debug, Clone, Default)]
pub struct SnipOptions {
    /// Read this image instead of capturing the screen.
    pub image: Option<PathBuf>,
    pub region: Option<Region>,
    pub mode: Option<OutputMode>,
    pub model: Option<String>,
    pub dimensions: Option<TableDimensions>,
    pub copy: bool,
}

/// Loaded configuration plus the runtime every network call goes through.
struct App {
    store: ConfigStore,
    config: Config,
    runtime: Runtime,
}

impl App {
    fn start() -> Result<Self, AppError> {
        let store = ConfigStore::at_default_location()?;
        init_tracing(&store);
        let config = store.load();
        debug!(path = %store.path().display(), ?config, "Config loaded");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            store,
            config,
            runtime,
        })
    }

    fn base_url(&self) -> String {
        client::resolve_base_url(self.config.api_base_url.as_deref())
    }

    fn client(&self) -> Result<ApiClient, AppError> {
        if !self.config.has_api_key() {
            return Err(AppError::MissingKey);
        }
        Ok(ApiClient::new(&self.config.api_key, self.base_url())?)
    }

    /// Makes sure a usable key is configured, asking on the terminal if not.
    /// Returns `false` if the user gave up.
    fn ensure_api_key(&mut self) -> Result<bool, AppError> {
        if self.config.has_api_key() && client::is_plausible_key(&self.config.api_key) {
            return Ok(true);
        }
        if self.config.has_api_key() {
            warn!("Stored API key looks invalid, asking for a new one");
        }
        self.ask_api_key()
    }

    fn ask_api_key(&mut self) -> Result<bool, AppError> {
        let base_url = self.base_url();
        let runtime = &self.runtime;
        let validate = |key: &str| match ApiClient::new(key, base_url.clone()) {
            Ok(client) => runtime.block_on(client.validate_key()),
            Err(e) => {
                error!(error = %e, "Failed to build HTTP client");
                false
            }
        };

        let stdin = io::stdin();
        let key = session::prompt_for_api_key(
            &mut stdin.lock(),
            &mut io::stdout(),
            &mut self.config,
            &self.store,
            validate,
        )?;
        Ok(key.is_some())
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(store: &ConfigStore) {
    let level = config::peek_log_level(store.path());
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .try_init();
}

/// Interactive session until the user quits.
pub fn run_session() -> Result<(), AppError> {
    let mut app = App::start()?;
    info!("Starting Snip2Excel session");
    if !app.ensure_api_key()? {
        println!("No API key, exiting.");
        return Ok(());
    }

    let client = app.client()?;
    let (events_tx, events_rx) = mpsc::channel();
    session::spawn_input_reader(events_tx.clone());
    let dispatcher = Dispatcher::new(app.runtime.handle().clone(), client, events_tx);

    let session = Session::new(app.config, app.store, dispatcher, None, io::stdout());
    session.run(events_rx);
    app.runtime.shutdown_background();
    Ok(())
}

/// Captures once, prints the result to stdout and optionally copies it.
pub fn run_snip(options: SnipOptions) -> Result<(), AppError> {
    let mut app = App::start()?;
    if !app.ensure_api_key()? {
        return Err(AppError::MissingKey);
    }

    let image = match &options.image {
        Some(path) => system::load_image(path, options.region)?,
        None => {
            if options.region.is_some() {
                warn!("--region only applies to --image, ignoring it");
            }
            system::capture_region()?
        }
    };
    info!(width = image.width, height = image.height, "Image ready");

    let mode = options.mode.unwrap_or(app.config.output_mode);
    let model_name = options
        .model
        .as_deref()
        .unwrap_or(&app.config.selected_model);
    let model_id = models::model_id_or_default(model_name).to_string();
    let prompt = prompt::build_prompt(app.config.prompt_for(mode), mode, options.dimensions);
    let request = prompt::ChatRequest::new(&model_id, prompt, &image.png);

    let client = app.client()?;
    info!(model = %model_id, %mode, "Sending request");
    let raw = app.runtime.block_on(client.complete(&request))?;
    let view = ResultView::from_response(mode, &raw);

    let text = view.clipboard_text().unwrap_or_default();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}")?;
    stdout.flush()?;

    if options.copy && !text.is_empty() {
        ClipboardSink::new()?.copy_and_wait(&text)?;
        info!(len = text.len(), "Result copied");
    }
    Ok(())
}

/// Prints credit usage for the configured key.
pub fn run_usage() -> Result<(), AppError> {
    let app = App::start()?;
    let client = app.client()?;
    let usage = app.runtime.block_on(client.key_usage())?;
    let summary = UsageSummary::from(&usage);
    match (summary.percent, summary.level) {
        (Some(percent), Some(level)) => {
            println!("{} ({percent:.0}%, {level:?})", summary.label)
        }
        _ => println!("{}", summary.label),
    }
    Ok(())
}

/// Lists the model catalog, marking the selected entry.
pub fn run_models() -> Result<(), AppError> {
    let app = App::start()?;
    let selected = models::model_id_or_default(&app.config.selected_model);
    for (name, id) in models::MODELS {
        let marker = if *id == selected { "*" } else { " " };
        println!("{marker} {name:<30} {id}");
    }
    Ok(())
}

/// Asks for a new API key and stores it.
pub fn run_set_key() -> Result<(), AppError> {
    let mut app = App::start()?;
    if app.ask_api_key()? {
        println!("API key saved to {}", app.store.path().display());
    }
    Ok(())
}

/// Prints where the config file lives.
pub fn run_config_path() -> Result<(), AppError> {
    let path = paths::config_file().ok_or(ConfigError::NoConfigDir)?;
    println!("{}", path.display());
    Ok(())
}
