//! Rendering thread: folds observer events into a status line.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Receiver;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use treadmill_core::state::AppStatus;
use treadmill_core::telemetry::{UiEvent, format_clock, status_caption};

/// How the status is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Redraw one line in place (raw keyboard mode).
    StatusLine,
    /// Print a line only when the caption or app status changes, so the
    /// output interleaves cleanly with a prompt.
    Log,
}

/// Everything shown on the status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusView {
    caption: String,
    status: AppStatus,
    speed: f64,
    grade: f64,
    elapsed: Option<Duration>,
    interval_visible: bool,
    interval_remaining: Duration,
}

impl StatusView {
    /// Folds `event` in. Returns a failure message for command failures.
    pub fn apply(&mut self, event: UiEvent) -> Option<String> {
        match event {
            UiEvent::StatusText(text) => self.caption = status_caption(&text).to_string(),
            UiEvent::Speed(kmh) => self.speed = kmh,
            UiEvent::Grade(percent) => self.grade = percent,
            UiEvent::Elapsed(elapsed) => self.elapsed = Some(elapsed),
            UiEvent::IntervalVisible(visible) => self.interval_visible = visible,
            UiEvent::IntervalRemaining(remaining) => self.interval_remaining = remaining,
            UiEvent::AppStatus(status) => {
                self.status = status;
                if status == AppStatus::Idle {
                    self.elapsed = None;
                }
            }
            UiEvent::CommandFailed { operation, message } => {
                return Some(format!("{operation} failed: {message}"));
            }
        }
        None
    }

    /// Short form used in log mode.
    pub fn headline(&self) -> String {
        format!("[{}] {}", self.status, self.caption)
    }

    pub fn line(&self) -> String {
        let mut line = format!(
            "[{}] {} | {:.1} km/h | {:.1} %",
            self.status, self.caption, self.speed, self.grade
        );
        if let Some(elapsed) = self.elapsed {
            line.push_str(&format!(" | {}", format_clock(elapsed)));
        }
        if self.interval_visible {
            line.push_str(&format!(
                " | interval {}",
                format_clock(self.interval_remaining)
            ));
        }
        line
    }
}

/// Spawns the renderer; it exits once every event sender is dropped.
pub fn spawn(
    events: Receiver<UiEvent>,
    mode: RenderMode,
    out: impl Write + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("renderer".into())
        .spawn(move || {
            if let Err(err) = render(&events, mode, out) {
                log::error!("renderer stopped: {err}");
            }
        })
}

fn render(events: &Receiver<UiEvent>, mode: RenderMode, mut out: impl Write) -> io::Result<()> {
    let mut view = StatusView::default();
    let mut shown = String::new();

    for event in events {
        if let Some(failure) = view.apply(event) {
            if mode == RenderMode::StatusLine {
                queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
                shown.clear();
            }
            write!(out, "{failure}\r\n")?;
        }

        let next = match mode {
            RenderMode::StatusLine => view.line(),
            RenderMode::Log => view.headline(),
        };
        if next == shown {
            out.flush()?;
            continue;
        }
        match mode {
            RenderMode::StatusLine => {
                queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(&next))?;
            }
            RenderMode::Log => writeln!(out, "{next}")?,
        }
        out.flush()?;
        shown = next;
    }
    Ok(())
}
