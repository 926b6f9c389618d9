use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use treadmill_core::buttons::ButtonDriver;
use treadmill_core::link::DeviceLink;
use treadmill_core::repl::commands::{CommandExecutor, CommandOutcome, ExecuteError};
use treadmill_core::state::ControlState;
use treadmill_core::telemetry::TelemetryRecord;

/// Line-oriented console over a [`CommandExecutor`], with an optional
/// timestamped transcript of everything typed and answered.
pub struct Session<L, B> {
    executor: CommandExecutor<L, B>,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
}

impl<L, B> Session<L, B>
where
    L: DeviceLink + 'static,
    B: ButtonDriver + 'static,
{
    pub fn new(executor: CommandExecutor<L, B>, transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;
        Ok(Self {
            executor,
            transcript,
            started_at: Instant::now(),
        })
    }

    pub fn executor(&self) -> &CommandExecutor<L, B> {
        &self.executor
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.log(elapsed, TranscriptRole::Host, trimmed)?;

        let lines = match self.executor.execute(trimmed) {
            Ok(CommandOutcome::Dispatched(operation)) => vec![format!("OK {operation} dispatched")],
            Ok(CommandOutcome::Status(state)) => describe_state(&state),
            Ok(CommandOutcome::Events(events)) => self.describe_events(&events),
            Ok(CommandOutcome::Help(text)) => vec![text],
            Err(ExecuteError::Parse(err)) => vec![format!("ERR syntax {err}")],
            Err(err) => vec![format!("ERR {err}")],
        };

        for response in &lines {
            self.log(elapsed, TranscriptRole::Console, response)?;
        }
        Ok(lines)
    }

    fn log(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }

    fn describe_events(&self, events: &[TelemetryRecord]) -> Vec<String> {
        if events.is_empty() {
            return vec!["no events".to_string()];
        }
        events
            .iter()
            .map(|record| {
                let at = record.timestamp.saturating_duration_since(self.started_at);
                format!("#{:<4} +{:>7} ms {}", record.id, at.as_millis(), record.event)
            })
            .collect()
    }
}

fn describe_state(state: &ControlState) -> Vec<String> {
    let mut lines = vec![format!(
        "status={} device={}",
        state.status,
        state.device_status.as_deref().unwrap_or("-")
    )];
    lines.push(format!(
        "speed current={} target={} resume={}",
        format_value(state.current_speed),
        format_value(state.target_speed),
        format_value(state.resume_speed)
    ));
    lines.push(format!(
        "grade current={} target={}",
        format_value(state.current_grade),
        format_value(state.target_grade)
    ));
    if state.interval_deadline.is_some() {
        lines.push("interval running".to_string());
    }
    lines
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.1}"))
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Treadmill console transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Console,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Console => "TRD <",
        }
    }
}
