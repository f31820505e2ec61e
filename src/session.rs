//! Interactive terminal session: capture -> confirm -> request -> render -> copy.
//!
//! The session loop runs on the main thread and is the single consumer of [`UiEvent`]s. A stdin
//! reader thread feeds typed lines; [`Dispatcher`] tasks feed request results. Preference
//! changes are saved immediately.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;

use tracing::{debug, error, info, warn};

use crate::client::{is_plausible_key, UsageSummary};
use crate::config::{Config, ConfigStore};
use crate::models::{self, MODELS};
use crate::prompt::{build_prompt, ChatRequest, OutputMode, TableDimensions};
use crate::system::{self, CapturedImage, ClipboardSink, Region};
use crate::view::ResultView;
use crate::worker::{Dispatcher, EventSender, UiEvent};

/// Successful requests between automatic usage refreshes.
const USAGE_REFRESH_EVERY: u32 = 5;

const HELP: &str = "Commands:
  capture                 select a screen region
  open <file> [x,y,w,h]   use an image file, optionally cropped
  process                 send the pending capture to the model
  show                    print the last result
  copy                    copy the last result to the clipboard
  mode [excel|docs]       show or set the output mode
  model [name]            show or set the model
  models                  list available models
  dims <cols> <rows>      ask for an exact table size (excel mode)
  dims auto               let the model pick the table size
  auto [on|off]           process captures without confirmation
  prompt                  edit the instruction for the current mode
  usage                   show API credit usage
  help                    show this help
  quit                    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capture,
    Open(PathBuf, Option<Region>),
    Process,
    Show,
    Copy,
    Mode(Option<OutputMode>),
    Model(Option<String>),
    Models,
    Dims(Option<TableDimensions>),
    Auto(Option<bool>),
    Prompt,
    Usage,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then_some(rest);

    match name.to_ascii_lowercase().as_str() {
        "capture" | "c" => Ok(Command::Capture),
        "open" | "o" => {
            let rest = arg.ok_or("usage: open <file> [x,y,w,h]")?;
            // a trailing x,y,w,h token is a crop region
            match rest.rsplit_once(char::is_whitespace) {
                Some((path, region)) if region.contains(',') => Ok(Command::Open(
                    PathBuf::from(path.trim()),
                    Some(region.parse()?),
                )),
                _ => Ok(Command::Open(PathBuf::from(rest), None)),
            }
        }
        "process" | "p" | "y" | "yes" => Ok(Command::Process),
        "show" => Ok(Command::Show),
        "copy" => Ok(Command::Copy),
        "mode" => arg.map(str::parse).transpose().map(Command::Mode),
        "model" => Ok(Command::Model(arg.map(str::to_string))),
        "models" => Ok(Command::Models),
        "dims" => {
            let rest = arg.ok_or("usage: dims <cols> <rows> | dims auto")?;
            if rest.eq_ignore_ascii_case("auto") {
                return Ok(Command::Dims(None));
            }
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(cols), Some(rows), None) => TableDimensions::parse(cols, rows)
                    .map(|d| Command::Dims(Some(d)))
                    .ok_or_else(|| "dimensions must be positive whole numbers".to_string()),
                _ => Err("usage: dims <cols> <rows> | dims auto".to_string()),
            }
        }
        "auto" => match arg.map(str::to_ascii_lowercase).as_deref() {
            None => Ok(Command::Auto(None)),
            Some("on" | "true" | "yes") => Ok(Command::Auto(Some(true))),
            Some("off" | "false" | "no") => Ok(Command::Auto(Some(false))),
            Some(other) => Err(format!("expected on or off, got '{other}'")),
        },
        "prompt" => Ok(Command::Prompt),
        "usage" => Ok(Command::Usage),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}', type 'help'")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Session<W: Write> {
    config: Config,
    store: ConfigStore,
    dispatcher: Dispatcher,
    clipboard: Option<ClipboardSink>,
    out: W,
    pending: Option<CapturedImage>,
    dimensions: Option<TableDimensions>,
    current: Option<ResultView>,
    in_flight: usize,
    completed_since_refresh: u32,
    prompt_edit: Option<Vec<String>>,
}

impl<W: Write> Session<W> {
    pub fn new(
        config: Config,
        store: ConfigStore,
        dispatcher: Dispatcher,
        clipboard: Option<ClipboardSink>,
        out: W,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            clipboard,
            out,
            pending: None,
            dimensions: None,
            current: None,
            in_flight: 0,
            completed_since_refresh: 0,
            prompt_edit: None,
        }
    }

    /// Runs until the user quits or stdin closes.
    pub fn run(mut self, events: mpsc::Receiver<UiEvent>) {
        self.say(&format!(
            "Snip2Excel ready. Mode: {}, model: {}. Type 'help' for commands.",
            self.config.output_mode, self.config.selected_model
        ));
        self.dispatcher.refresh_usage();

        while let Ok(event) = events.recv() {
            if self.handle(event) == Flow::Quit {
                break;
            }
        }
        info!("Session ended");
    }

    fn handle(&mut self, event: UiEvent) -> Flow {
        match event {
            UiEvent::Input(line) => self.handle_line(&line),
            UiEvent::InputClosed => Flow::Quit,
            UiEvent::Completed { id, view } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.on_completed(id, view);
                Flow::Continue
            }
            UiEvent::Usage(result) => {
                match result {
                    Ok(usage) => {
                        let summary = UsageSummary::from(&usage);
                        self.say(&format!("API usage: {}", summary.label));
                    }
                    Err(err) => {
                        warn!(error = %err, "Usage refresh failed");
                        self.say("Could not fetch API usage");
                    }
                }
                Flow::Continue
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        if let Some(lines) = self.prompt_edit.as_mut() {
            if line.trim_end() != "." {
                lines.push(line.trim_end_matches(['\r', '\n']).to_string());
                return Flow::Continue;
            }
            let lines = self.prompt_edit.take().unwrap_or_default();
            self.finish_prompt_edit(lines.join("\n"));
            return Flow::Continue;
        }

        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match parse_command(line) {
            Ok(command) => self.execute(command),
            Err(message) => {
                self.say(&message);
                Flow::Continue
            }
        }
    }

    fn execute(&mut self, command: Command) -> Flow {
        debug!(?command, "Executing command");
        match command {
            Command::Capture => match system::capture_region() {
                Ok(image) => self.on_captured(image),
                Err(system::ScreenshotError::Cancelled) => self.say("Capture cancelled."),
                Err(err) => {
                    error!(error = %err, "Screen capture failed");
                    self.say(&format!("Could not capture the screen: {err}"));
                }
            },
            Command::Open(path, region) => match system::load_image(&path, region) {
                Ok(image) => self.on_captured(image),
                Err(err) => self.say(&format!("Could not open {}: {err}", path.display())),
            },
            Command::Process => match self.pending.take() {
                Some(image) => self.process(&image),
                None => self.say("Nothing captured yet. Use 'capture' or 'open <file>'."),
            },
            Command::Show => match &self.current {
                Some(view) => {
                    let text = view.to_string();
                    self.say(&text);
                }
                None => self.say("No result yet."),
            },
            Command::Copy => self.copy_current(),
            Command::Mode(None) => {
                let mode = self.config.output_mode;
                self.say(&format!("Mode: {mode}"));
            }
            Command::Mode(Some(mode)) => {
                self.change_config(|cfg| cfg.output_mode = mode);
                self.say(&format!("Mode set to {mode}."));
            }
            Command::Model(None) => {
                let name = self.config.selected_model.clone();
                self.say(&format!("Model: {name} ({})", models::model_id_or_default(&name)));
            }
            Command::Model(Some(name)) => match models::resolve_model(&name) {
                Some(id) => {
                    let id = id.to_string();
                    self.change_config(|cfg| cfg.selected_model = name.trim().to_string());
                    self.say(&format!("Model set to {} ({id}).", name.trim()));
                }
                None => self.say(&format!("Unknown model '{name}'. Type 'models' for the list.")),
            },
            Command::Models => {
                let listing = MODELS
                    .iter()
                    .map(|(name, id)| format!("  {name:<30} {id}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.say(&listing);
            }
            Command::Dims(dims) => {
                self.dimensions = dims;
                match dims {
                    Some(d) => self.say(&format!(
                        "Tables will have exactly {} columns and {} rows.",
                        d.columns, d.rows
                    )),
                    None => self.say("Table size: automatic."),
                }
            }
            Command::Auto(None) => {
                let state = if self.config.auto_process_enabled { "on" } else { "off" };
                self.say(&format!("Auto-process: {state}"));
            }
            Command::Auto(Some(enabled)) => {
                self.change_config(|cfg| cfg.auto_process_enabled = enabled);
                let state = if enabled { "on" } else { "off" };
                self.say(&format!("Auto-process {state}."));
            }
            Command::Prompt => {
                let mode = self.config.output_mode;
                let current = self.config.prompt_for(mode).to_string();
                self.say(&format!(
                    "Current {mode} prompt:\n{current}\n\nType the new prompt, end with a line containing only '.'; an empty prompt keeps the current one."
                ));
                self.prompt_edit = Some(Vec::new());
            }
            Command::Usage => {
                self.dispatcher.refresh_usage();
                self.say("Fetching API usage...");
            }
            Command::Help => self.say(HELP),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn on_captured(&mut self, image: CapturedImage) {
        if self.config.auto_process_enabled {
            self.process(&image);
            return;
        }
        self.say(&format!(
            "Captured {}x{} image. Type 'process' to send it, or 'capture' to try again.",
            image.width, image.height
        ));
        self.pending = Some(image);
    }

    fn process(&mut self, image: &CapturedImage) {
        let mode = self.config.output_mode;
        if mode == OutputMode::Docs && self.dimensions.is_some() {
            debug!("Table dimensions ignored in docs mode");
        }
        let prompt = build_prompt(self.config.prompt_for(mode), mode, self.dimensions);
        let model_id = models::model_id_or_default(&self.config.selected_model).to_string();
        let request = ChatRequest::new(&model_id, prompt, &image.png);

        let id = self.dispatcher.submit(mode, request);
        self.in_flight += 1;
        self.say(&format!("Processing with {model_id}... (request #{id})"));
    }

    fn on_completed(&mut self, id: u64, view: ResultView) {
        let text = view.to_string();
        self.say(&format!("--- Result #{id} ---\n{text}"));
        if !view.is_error() {
            self.say("Type 'copy' to copy it to the clipboard.");
            self.completed_since_refresh += 1;
            if self.completed_since_refresh >= USAGE_REFRESH_EVERY {
                self.completed_since_refresh = 0;
                self.dispatcher.refresh_usage();
            }
        }
        // last completed wins, regardless of submission order
        self.current = Some(view);
    }

    fn copy_current(&mut self) {
        let Some(text) = self.current.as_ref().and_then(ResultView::clipboard_text) else {
            self.say("Nothing to copy.");
            return;
        };
        if self.clipboard.is_none() {
            match ClipboardSink::new() {
                Ok(sink) => self.clipboard = Some(sink),
                Err(err) => {
                    warn!(error = %err, "Clipboard unavailable");
                    self.say(&format!("{err}"));
                    return;
                }
            }
        }
        let result = match self.clipboard.as_mut() {
            Some(sink) => sink.copy(&text),
            None => return,
        };
        match result {
            Ok(()) => self.say("Copied."),
            Err(err) => self.say(&format!("{err}")),
        }
    }

    fn finish_prompt_edit(&mut self, prompt: String) {
        if prompt.trim().is_empty() {
            self.say("Prompt unchanged.");
            return;
        }
        let mode = self.config.output_mode;
        self.change_config(|cfg| cfg.set_prompt_for(mode, prompt));
        self.say(&format!("{mode} prompt saved."));
    }

    fn change_config<F>(&mut self, change: F)
    where
        F: FnOnce(&mut Config),
    {
        if let Err(err) = self.store.update(&mut self.config, change) {
            error!(error = %err, "Failed to save config");
            self.say(&format!("Could not save configuration: {err}"));
        }
    }

    fn say(&mut self, message: &str) {
        if let Err(e) = writeln!(self.out, "{message}").and_then(|()| self.out.flush()) {
            warn!(error = %e, "Failed to write to terminal");
        }
    }
}

/// Forwards stdin lines as [`UiEvent::Input`] from a background thread.
pub fn spawn_input_reader(events: EventSender) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if events.send(UiEvent::Input(line)).is_err() {
                return;
            }
        }
        let _ = events.send(UiEvent::InputClosed);
    });
}

/// Asks for an API key until `validate` accepts one. Returns `None` if the user gives up
/// (empty line, `q`, or end of input). The accepted key is saved to `store`.
pub fn prompt_for_api_key<R, W, V>(
    input: &mut R,
    out: &mut W,
    config: &mut Config,
    store: &ConfigStore,
    mut validate: V,
) -> io::Result<Option<String>>
where
    R: BufRead,
    W: Write,
    V: FnMut(&str) -> bool,
{
    writeln!(out, "An OpenRouter API key is required.")?;
    writeln!(out, "  1. Go to https://openrouter.ai/settings/keys")?;
    writeln!(out, "  2. Create a new API key")?;
    writeln!(out, "  3. Paste it here (empty line or 'q' to quit)")?;

    loop {
        write!(out, "API key: ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let key = line.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        if !is_plausible_key(key) {
            writeln!(out, "That does not look like an OpenRouter key (sk-...). Try again.")?;
            continue;
        }
        if !validate(key) {
            writeln!(out, "The key was rejected by OpenRouter. Try again.")?;
            continue;
        }

        let key = key.to_string();
        if let Err(err) = store.update(config, |cfg| cfg.api_key = key.clone()) {
            error!(error = %err, "Failed to save API key");
            writeln!(out, "Could not save configuration: {err}")?;
        }
        info!("API key accepted");
        return Ok(Some(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiClient, KeyUsage};
    use crate::secret::KeyCipher;
    use std::io::Cursor;

    fn test_store(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("config.json"), KeyCipher::from_seed("session"))
    }

    fn test_session(
        dir: &tempfile::TempDir,
        runtime: &tokio::runtime::Runtime,
    ) -> (Session<Vec<u8>>, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel();
        let client = ApiClient::new("sk-test-0000000000000000", "http://127.0.0.1:9".into())
            .unwrap();
        let dispatcher = Dispatcher::new(runtime.handle().clone(), client, tx);
        let session = Session::new(
            Config::default(),
            test_store(dir),
            dispatcher,
            None,
            Vec::new(),
        );
        (session, rx)
    }

    fn output(session: &mut Session<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(&mut session.out)).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command(" capture "), Ok(Command::Capture));
        assert_eq!(
            parse_command("mode docs"),
            Ok(Command::Mode(Some(OutputMode::Docs)))
        );
        assert_eq!(parse_command("mode"), Ok(Command::Mode(None)));
        assert_eq!(
            parse_command("dims 3 4"),
            Ok(Command::Dims(TableDimensions::new(3, 4)))
        );
        assert_eq!(parse_command("dims AUTO"), Ok(Command::Dims(None)));
        assert!(parse_command("dims 0 4").is_err());
        assert_eq!(parse_command("auto on"), Ok(Command::Auto(Some(true))));
        assert_eq!(
            parse_command("model GPT-4.1 Mini"),
            Ok(Command::Model(Some("GPT-4.1 Mini".into())))
        );
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_parse_open_with_region() {
        assert_eq!(
            parse_command("open /tmp/shot.png 0,0,10,20"),
            Ok(Command::Open(
                PathBuf::from("/tmp/shot.png"),
                Some(Region {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 20
                })
            ))
        );
        assert_eq!(
            parse_command("open my shot.png"),
            Ok(Command::Open(PathBuf::from("my shot.png"), None))
        );
    }

    #[test]
    fn test_last_completed_result_wins() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, _rx) = test_session(&dir, &runtime);

        session.handle(UiEvent::Completed {
            id: 2,
            view: ResultView::from_response(OutputMode::Excel, "late\tsubmit"),
        });
        session.handle(UiEvent::Completed {
            id: 1,
            view: ResultView::from_response(OutputMode::Excel, "early\tsubmit"),
        });

        let current = session.current.as_ref().and_then(ResultView::clipboard_text);
        assert_eq!(current.as_deref(), Some("early\tsubmit"));
        assert!(output(&mut session).contains("--- Result #1 ---"));
    }

    #[test]
    fn test_usage_refreshed_after_five_results() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, rx) = test_session(&dir, &runtime);

        for id in 1..=5 {
            session.handle(UiEvent::Completed {
                id,
                view: ResultView::Text("ok".into()),
            });
        }
        assert_eq!(session.completed_since_refresh, 0);
        let event = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .unwrap();
        assert!(matches!(event, UiEvent::Usage(Err(_))));
    }

    #[test]
    fn test_errors_do_not_count_toward_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, _rx) = test_session(&dir, &runtime);

        session.handle(UiEvent::Completed {
            id: 1,
            view: ResultView::from_error("HTTP 500"),
        });
        assert_eq!(session.completed_since_refresh, 0);
        session.handle(UiEvent::Input("copy".into()));
        assert!(output(&mut session).ends_with("Nothing to copy.\n"));
    }

    #[test]
    fn test_preferences_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, _rx) = test_session(&dir, &runtime);

        session.handle(UiEvent::Input("mode docs".into()));
        session.handle(UiEvent::Input("auto on".into()));
        session.handle(UiEvent::Input("model GPT-4.1 Mini".into()));
        session.handle(UiEvent::Input("prompt".into()));
        session.handle(UiEvent::Input("Only the numbers.".into()));
        session.handle(UiEvent::Input(".".into()));

        let saved = test_store(&dir).load();
        assert_eq!(saved.output_mode, OutputMode::Docs);
        assert!(saved.auto_process_enabled);
        assert_eq!(saved.selected_model, "GPT-4.1 Mini");
        assert_eq!(saved.prompt_docs, "Only the numbers.");
    }

    #[test]
    fn test_process_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, _rx) = test_session(&dir, &runtime);

        assert_eq!(session.handle(UiEvent::Input("process".into())), Flow::Continue);
        assert!(output(&mut session).contains("Nothing captured yet"));
        assert_eq!(session.handle(UiEvent::Input("quit".into())), Flow::Quit);
        assert_eq!(session.handle(UiEvent::InputClosed), Flow::Quit);
    }

    #[test]
    fn test_usage_event_prints_summary() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut session, _rx) = test_session(&dir, &runtime);

        session.handle(UiEvent::Usage(Ok(KeyUsage {
            usage: 1.0,
            limit: None,
            is_free_tier: true,
        })));
        assert_eq!(output(&mut session), "API usage: Free: 1.00$ used\n");
    }

    #[test]
    fn test_prompt_for_api_key_retries_until_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let mut config = Config::default();
        let mut input = Cursor::new("short\nsk-rejected-0000000000000\nsk-good-00000000000000000\n");
        let mut out = Vec::new();

        let key = prompt_for_api_key(&mut input, &mut out, &mut config, &store, |k| {
            k.starts_with("sk-good")
        })
        .unwrap();

        assert_eq!(key.as_deref(), Some("sk-good-00000000000000000"));
        assert_eq!(store.load().api_key, "sk-good-00000000000000000");
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("does not look like"));
        assert!(out.contains("rejected by OpenRouter"));
    }

    #[test]
    fn test_prompt_for_api_key_quit() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let mut config = Config::default();
        let mut out = Vec::new();

        let key = prompt_for_api_key(&mut Cursor::new("q\n"), &mut out, &mut config, &store, |_| true)
            .unwrap();
        assert_eq!(key, None);
        let key = prompt_for_api_key(&mut Cursor::new(""), &mut out, &mut config, &store, |_| true)
            .unwrap();
        assert_eq!(key, None);
    }
}
