// tracetty: step through a C program's memory effects in the terminal

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use tracetty::constants::{
    DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_LOOP_ITERATIONS, DEFAULT_PLAYBACK_DELAY_MS,
};
use tracetty::executor::{run_with_delay, Executor, RecordingSink};
use tracetty::parser::parse;
use tracetty::snapshot::VisualState;
use tracetty::trace::Trace;
use tracetty::ui::App;
use tracetty::unroller::{unroll_with_limits, UnrollLimits};

#[derive(Parser, Debug)]
#[command(
    name = "tracetty",
    version,
    about = "Unroll a C program into a step trace and replay its memory effects"
)]
struct Cli {
    /// C source file to trace
    file: PathBuf,

    /// Iterations unrolled per loop
    #[arg(long, default_value_t = DEFAULT_MAX_LOOP_ITERATIONS)]
    max_iterations: usize,

    /// Nested call depth unrolled
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,

    /// Milliseconds between steps while playing
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Print the unrolled trace as JSON lines and exit
    #[arg(long)]
    dump_steps: bool,

    /// Replay headlessly and print every effect as JSON lines
    #[arg(long)]
    effects: bool,

    /// Start at this step index instead of the beginning
    #[arg(long)]
    seek: Option<usize>,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Set log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_format);

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", cli.file.display(), e);
            process::exit(1);
        }
    };

    let root = match parse(&source) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let limits = UnrollLimits {
        max_loop_iterations: cli.max_iterations,
        max_call_depth: cli.max_depth,
    };
    let trace = unroll_with_limits(&root, limits);
    info!(steps = trace.len(), file = %cli.file.display(), "trace built");

    if cli.dump_steps {
        return dump_steps(&trace);
    }
    if cli.effects {
        return print_effects(trace, cli.seek, cli.delay_ms.unwrap_or(0));
    }

    let delay = Duration::from_millis(cli.delay_ms.unwrap_or(DEFAULT_PLAYBACK_DELAY_MS));
    let mut executor = Executor::new(trace, VisualState::new());
    if let Some(index) = cli.seek {
        executor.seek(index);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(executor, source, delay);
    let res = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn dump_steps(trace: &Trace) -> Result<(), Box<dyn std::error::Error>> {
    for (index, step) in trace.iter().enumerate() {
        let line = serde_json::json!({ "index": index, "step": step });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn print_effects(
    trace: Trace,
    seek: Option<usize>,
    delay_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut executor = Executor::new(trace, RecordingSink::new());
    match seek {
        Some(index) => executor.seek(index),
        None => {
            let state = run_with_delay(&mut executor, Duration::from_millis(delay_ms), || false);
            info!(?state, applied = executor.applied().len(), "replay done");
        }
    }
    if executor.sink().effects().is_empty() {
        warn!("replay produced no effects");
    }
    for effect in executor.sink().since_reset() {
        println!("{}", serde_json::to_string(effect)?);
    }
    Ok(())
}

/// Logs go to stderr; the TUI owns stdout
fn setup_logging(verbose: u8, log_format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .with_level(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr),
            )
            .init(),
    }
}
