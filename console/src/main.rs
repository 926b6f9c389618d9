mod keys;
mod render;
mod samples;
mod session;
mod sim;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, anyhow};
use clap::{Parser, ValueEnum};
use crossbeam::channel;
use treadmill_core::Controller;
use treadmill_core::buttons::ButtonDriver;
use treadmill_core::config::ControllerConfig;
use treadmill_core::link::{DeviceLink, PortRegistry};
use treadmill_core::repl::commands::CommandExecutor;
use treadmill_core::telemetry::{ChannelObserver, NullSink, Observer, PersistenceSink};

use keys::KeyMap;
use render::RenderMode;
use samples::CsvSampleLog;
use session::Session;

#[derive(Parser, Debug)]
#[command(name = "treadmill-console", version, about = "Treadmill controller console")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device path of the treadmill link (overrides the config file).
    #[arg(short, long)]
    port: Option<String>,

    /// Input source.
    #[arg(long, value_enum, default_value_t = InputMode::Lines)]
    input: InputMode,

    /// Write a timestamped transcript of the line session.
    #[arg(long)]
    transcript: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum InputMode {
    /// Raw keyboard: arrows, Enter, Home, s, h, 1, 2, q.
    Keys,
    /// Prompted command lines.
    Lines,
}

fn load_config(cli: &Cli) -> anyhow::Result<ControllerConfig> {
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port.clone_from(port);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let (treadmill, buttons) = sim::simulated();
    let link = PortRegistry::global().get_or_open(&config.port, |path| {
        log::info!("{path}: using simulated treadmill");
        Ok(Box::new(treadmill) as Box<dyn DeviceLink>)
    })?;

    let (events_tx, events_rx) = channel::unbounded();
    let observer: Arc<dyn Observer> = Arc::new(ChannelObserver::new(events_tx));
    let controller = Arc::new(
        Controller::new(link, buttons, config.clone()).with_observer(observer),
    );

    let sink: Box<dyn PersistenceSink> = match &config.sample_log {
        Some(path) => Box::new(
            CsvSampleLog::open(path).with_context(|| format!("opening sample log {path}"))?,
        ),
        None => Box::new(NullSink),
    };
    let monitor = controller.monitor(sink).spawn()?;

    let mode = match cli.input {
        InputMode::Keys => RenderMode::StatusLine,
        InputMode::Lines => RenderMode::Log,
    };
    // Detached: workers may still hold observers when the console exits.
    let _renderer = render::spawn(events_rx, mode, io::stdout())?;

    let executor = CommandExecutor::new(Arc::clone(&controller));
    let result = match cli.input {
        InputMode::Keys => run_keys(&executor, &KeyMap::new(&config.keyboard)),
        InputMode::Lines => run_lines(Session::new(executor, cli.transcript.as_deref())?),
    };

    monitor.shutdown_and_join();
    result
}

fn run_keys<L, B>(executor: &CommandExecutor<L, B>, keymap: &KeyMap) -> anyhow::Result<()>
where
    L: DeviceLink + 'static,
    B: ButtonDriver + 'static,
{
    thread::scope(|scope| {
        thread::Builder::new()
            .name("keyboard".into())
            .spawn_scoped(scope, || keys::run(executor, keymap))?
            .join()
            .map_err(|_| anyhow!("keyboard worker panicked"))?
    })
}

fn run_lines<L, B>(mut session: Session<L, B>) -> anyhow::Result<()>
where
    L: DeviceLink + 'static,
    B: ButtonDriver + 'static,
{
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    println!("Treadmill console ready. Type `help` for commands or `exit` to quit.");

    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;

        if reader.read_line(&mut line)? == 0 {
            println!();
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if should_terminate(trimmed) {
            println!("Session closed.");
            break;
        }

        for response in session.handle_command(trimmed)? {
            println!("{response}");
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}
