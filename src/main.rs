use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use autodl_core::config::{LoopConfig, PostClick, Strategy};
use autodl_core::controller::{ControlHandle, LoopController};
use autodl_core::events::{Event, LoggerSink};
use autodl_core::logger::{self, Level, LogLine};
use autodl_core::matcher::create_matcher;
use autodl_core::platform::create_platform;
use autodl_core::templates::{load_templates, TemplateSet};
use autodl_core::types::{LoopState, Point};
use autodl_core::BotError;

/// Clicks whatever on-screen element matches one of the template images.
#[derive(Parser, Debug)]
#[command(name = "autodl", version)]
struct Cli {
    /// Match threshold in [0, 1]
    #[arg(long)]
    confidence: Option<f32>,
    /// Match on grayscale images (`--grayscale false` for color)
    #[arg(long)]
    grayscale: Option<bool>,
    /// Shortest pause between ticks, in seconds
    #[arg(long, value_name = "SECS")]
    min_sleep_interval: Option<f64>,
    /// Longest pause between ticks, in seconds
    #[arg(long, value_name = "SECS")]
    max_sleep_interval: Option<f64>,
    /// Directory holding the template images
    #[arg(long, value_name = "DIR")]
    templates_path: Option<PathBuf>,
    /// Consecutive misses before scrolling (0 never scrolls)
    #[arg(long, value_name = "N")]
    retries_before_scroll: Option<u32>,
    /// Don't scroll when the same template keeps matching
    #[arg(long)]
    disable_transparent_ads_fix: bool,
    /// Repeated matches that count as a stuck overlay
    #[arg(long, value_name = "N")]
    overlay_streak: Option<u32>,
    /// Vertical click jitter, in pixels
    #[arg(long, value_name = "PX")]
    tol_pixels: Option<u32>,
    /// Scroll distance; positive scrolls down
    #[arg(long, value_name = "LINES", allow_hyphen_values = true)]
    scroll_amount: Option<i32>,
    /// correlation or feature
    #[arg(long)]
    strategy: Option<Strategy>,
    /// Park the pointer here after each click instead of restoring it
    #[arg(long, value_name = "X,Y")]
    park_at: Option<Point>,
    /// Settings file
    #[arg(long, value_name = "FILE", default_value = "settings.json")]
    settings: PathBuf,
    /// Write the effective configuration to the settings file
    #[arg(long)]
    save_settings: bool,
    /// Run without the terminal UI, logging to stderr
    #[arg(long)]
    headless: bool,
    /// Use the stub platform (blank screen, logged pointer)
    #[arg(long)]
    stub: bool,
    #[arg(long, value_name = "DIR", default_value = "logs")]
    logs_dir: PathBuf,
    /// Include debug lines in the log
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags win over the settings file.
    fn apply(&self, config: &mut LoopConfig) {
        if let Some(v) = self.confidence {
            config.confidence = v;
        }
        if let Some(v) = self.grayscale {
            config.grayscale = v;
        }
        if let Some(v) = self.min_sleep_interval {
            config.min_sleep = v;
        }
        if let Some(v) = self.max_sleep_interval {
            config.max_sleep = v;
        }
        if let Some(v) = &self.templates_path {
            config.templates_path = v.clone();
        }
        if let Some(v) = self.retries_before_scroll {
            config.retries_before_scroll = v;
        }
        if self.disable_transparent_ads_fix {
            config.transparent_ads_fix = false;
        }
        if let Some(v) = self.overlay_streak {
            config.overlay_streak = v;
        }
        if let Some(v) = self.tol_pixels {
            config.tol_pixels = v;
        }
        if let Some(v) = self.scroll_amount {
            config.scroll_amount = v;
        }
        if let Some(v) = self.strategy {
            config.strategy = v;
        }
        if let Some(p) = self.park_at {
            config.post_click = PostClick::Park(p);
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            logger::error(&format!("{:#}", e));
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    logger::init(&cli.logs_dir)
        .with_context(|| format!("cannot open log file in {}", cli.logs_dir.display()))?;
    logger::set_echo(cli.headless);
    if cli.verbose {
        logger::set_min_level(Level::Debug);
    }

    let mut config = LoopConfig::load(&cli.settings);
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        report(cli.headless, &e.to_string());
        return Ok(ExitCode::from(2));
    }
    if cli.save_settings {
        config.save(&cli.settings)?;
        logger::info(&format!("saved settings to {}", cli.settings.display()));
    }

    let templates = match load_templates(&config.templates_path) {
        Ok(t) => Arc::new(t),
        Err(BotError::NoTemplates { dir, created }) => {
            let hint = if created { "created it; put" } else { "put" };
            report(
                cli.headless,
                &format!(
                    "no templates in {}: {} screenshots of the elements to click there (PNG, JPEG or BMP) and run again",
                    dir.display(),
                    hint
                ),
            );
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };
    logger::info(&format!("autodl started, {} template(s) loaded", templates.len()));

    if cli.headless {
        run_headless(config, templates, cli.stub)
    } else {
        run_tui(config, templates, cli.stub)
    }
}

/// Startup failures go to the log; without the echo they also need stderr.
fn report(headless: bool, msg: &str) {
    logger::error(msg);
    if !headless {
        eprintln!("error: {}", msg);
    }
}

fn run_headless(config: LoopConfig, templates: Arc<TemplateSet>, stub: bool) -> Result<ExitCode> {
    let platform = create_platform(stub)?;
    let matcher = create_matcher(config.strategy);
    let control = ControlHandle::new();
    watch_ctrl_c(control.clone())?;
    let mut controller =
        LoopController::new(config, templates, matcher, platform, Box::new(LoggerSink::new(None)))
            .with_control(control);
    Ok(exit_code(controller.run()))
}

/// Turns Ctrl-C into a stop request so the loop finishes its tick and exits 0.
fn watch_ctrl_c(control: ControlHandle) -> Result<()> {
    stop_on(control, async {
        tokio::signal::ctrl_c().await.ok();
        logger::info("interrupted, stopping");
    })
}

/// Requests a stop once `signal` completes, driven on its own thread.
fn stop_on<F>(control: ControlHandle, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start signal runtime")?;
    thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            runtime.block_on(signal);
            control.request_stop();
        })
        .context("cannot spawn signal thread")?;
    Ok(())
}

fn run_tui(config: LoopConfig, templates: Arc<TemplateSet>, stub: bool) -> Result<ExitCode> {
    // Channels
    let (log_tx, log_rx) = mpsc::channel::<LogLine>();
    let (event_tx, event_rx) = mpsc::channel::<Event>();

    // Wire logger to TUI
    logger::set_tui_sender(log_tx);

    let control = ControlHandle::new();
    let names = templates.names();

    // The platform and matcher are not Send, so they are built on the loop thread.
    let worker = {
        let control = control.clone();
        let config = config.clone();
        thread::spawn(move || {
            let sink = LoggerSink::new(Some(event_tx.clone()));
            let result = create_platform(stub).and_then(|platform| {
                let matcher = create_matcher(config.strategy);
                LoopController::new(config, templates, matcher, platform, Box::new(sink))
                    .with_control(control)
                    .run()
            });
            if let Err(e) = &result {
                if let BotError::Platform(_) = e {
                    logger::error(&e.to_string());
                }
                event_tx.send(Event::State(LoopState::Stopped)).ok();
            }
            result
        })
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = autodl_tui::App::new(config, names, log_rx, event_rx, control.clone());

    // Run TUI event loop on main thread
    let result = autodl_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    control.request_stop();
    let loop_result = worker.join().map_err(|_| anyhow!("loop thread panicked"))?;
    logger::info("shutting down");

    result?;
    Ok(exit_code(loop_result))
}

fn exit_code(result: autodl_core::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(BotError::FailSafe) => {
            logger::info("fail-safe triggered, exiting");
            ExitCode::SUCCESS
        }
        Err(BotError::NoTemplates { .. }) => ExitCode::from(1),
        Err(e) => {
            logger::error(&format!("exiting: {}", e));
            ExitCode::from(2)
        }
    }
}
