//! Keyboard input worker: maps key presses onto console commands.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use treadmill_core::buttons::ButtonDriver;
use treadmill_core::config::{KeyboardConfig, Preset};
use treadmill_core::link::DeviceLink;
use treadmill_core::repl::commands::CommandExecutor;
use treadmill_core::repl::grammar::{Adjust, Command};

/// How often the worker wakes to check for shutdown.
const POLL_TICK: Duration = Duration::from_millis(250);

/// What a key press asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Command(Command),
    Quit,
    None,
}

/// Maps keys onto commands using the configured nudge steps.
#[derive(Debug, Clone)]
pub struct KeyMap {
    speed_step: f64,
    grade_step: f64,
}

impl KeyMap {
    pub fn new(config: &KeyboardConfig) -> Self {
        Self {
            speed_step: config.speed_step,
            grade_step: config.grade_step,
        }
    }

    pub fn handle_key(&self, event: KeyEvent) -> KeyAction {
        if event.kind != KeyEventKind::Press {
            return KeyAction::None;
        }
        if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c') {
            return KeyAction::Quit;
        }

        let command = match event.code {
            KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
            KeyCode::Up => Command::Grade(Adjust::By(self.grade_step)),
            KeyCode::Down => Command::Grade(Adjust::By(-self.grade_step)),
            KeyCode::Right => Command::Speed(Adjust::By(self.speed_step)),
            KeyCode::Left => Command::Speed(Adjust::By(-self.speed_step)),
            KeyCode::Enter => Command::Toggle,
            KeyCode::Home => Command::Reset,
            KeyCode::Char('s') => Command::Stop,
            KeyCode::Char('h') => Command::Interval {
                speed: None,
                duration: None,
                end_speed: None,
            },
            KeyCode::Char('1') => Command::Preset(Preset::Normal),
            KeyCode::Char('2') => Command::Preset(Preset::Fast),
            _ => return KeyAction::None,
        };
        KeyAction::Command(command)
    }
}

/// Leaves raw mode when dropped, including on early return.
struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            log::error!("failed to leave raw mode: {err}");
        }
    }
}

/// Reads keys until quit, dispatching each mapped command.
///
/// Dispatch failures are logged and do not end the loop.
pub fn run<L, B>(executor: &CommandExecutor<L, B>, keymap: &KeyMap) -> anyhow::Result<()>
where
    L: DeviceLink + 'static,
    B: ButtonDriver + 'static,
{
    let _raw = RawMode::enable()?;
    log::info!("keyboard ready: arrows nudge, Enter toggles, Home resets, q quits");

    loop {
        if !event::poll(POLL_TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match keymap.handle_key(key) {
            KeyAction::Quit => return Ok(()),
            KeyAction::Command(command) => {
                if let Err(err) = executor.dispatch(command) {
                    log::error!("key {:?}: {err}", key.code);
                }
            }
            KeyAction::None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap() -> KeyMap {
        KeyMap::new(&KeyboardConfig::default())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    #[test]
    fn arrows_nudge_by_configured_steps() {
        let keymap = keymap();

        assert_eq!(
            keymap.handle_key(key(KeyCode::Up)),
            KeyAction::Command(Command::Grade(Adjust::By(0.5)))
        );
        assert_eq!(
            keymap.handle_key(key(KeyCode::Down)),
            KeyAction::Command(Command::Grade(Adjust::By(-0.5)))
        );
        assert_eq!(
            keymap.handle_key(key(KeyCode::Right)),
            KeyAction::Command(Command::Speed(Adjust::By(0.2)))
        );
        assert_eq!(
            keymap.handle_key(key(KeyCode::Left)),
            KeyAction::Command(Command::Speed(Adjust::By(-0.2)))
        );
    }

    #[test]
    fn select_and_reset_keys() {
        let keymap = keymap();

        assert_eq!(
            keymap.handle_key(key(KeyCode::Enter)),
            KeyAction::Command(Command::Toggle)
        );
        assert_eq!(
            keymap.handle_key(key(KeyCode::Home)),
            KeyAction::Command(Command::Reset)
        );
        assert_eq!(
            keymap.handle_key(key(KeyCode::Char('2'))),
            KeyAction::Command(Command::Preset(Preset::Fast))
        );
    }

    #[test]
    fn quit_keys() {
        let keymap = keymap();

        assert_eq!(keymap.handle_key(key(KeyCode::Char('q'))), KeyAction::Quit);
        assert_eq!(keymap.handle_key(key(KeyCode::Esc)), KeyAction::Quit);
        assert_eq!(
            keymap.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Quit
        );
    }

    #[test]
    fn releases_and_unmapped_keys_are_ignored() {
        let keymap = keymap();
        let mut release = key(KeyCode::Enter);
        release.kind = KeyEventKind::Release;

        assert_eq!(keymap.handle_key(release), KeyAction::None);
        assert_eq!(keymap.handle_key(key(KeyCode::Char('z'))), KeyAction::None);
    }
}
