//! Parser for the line-oriented command console.
//!
//! Keywords are case-insensitive and arguments are whitespace separated.
//! The parser is built from `winnow` combinators directly over the input
//! `&str`; errors carry the byte offset of the offending input.

use core::fmt;
use core::time::Duration;

use thiserror::Error;
use winnow::ascii::{float, space0, space1};
use winnow::combinator::{alt, eof, fail, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stream;
use winnow::token::{one_of, take_while};

use crate::config::Preset;

/// Relative or absolute change to a speed or grade.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Adjust {
    /// Signed delta, written with a leading `+` or `-`.
    By(f64),
    /// Absolute value.
    To(f64),
}

/// Commands understood by the console.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Walk,
    Run,
    Toggle,
    Speed(Adjust),
    Grade(Adjust),
    /// Omitted values fall back to configuration.
    Interval {
        speed: Option<f64>,
        duration: Option<Duration>,
        end_speed: Option<f64>,
    },
    Preset(Preset),
    Status,
    Events,
    Help(Option<String>),
}

/// Every command keyword, for help listings.
pub const KEYWORDS: [&str; 15] = [
    "start", "stop", "reset", "walk", "run", "toggle", "speed", "grade", "interval", "hiit",
    "preset", "status", "events", "help", "?",
];

/// A line that did not parse.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("parse error at column {}: {message}", offset + 1)]
pub struct ParseError {
    /// Byte offset into the input line.
    pub offset: usize,
    pub message: String,
}

/// Parses one console line.
///
/// # Errors
///
/// Returns a [`ParseError`] pointing at the first unexpected input.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    command.parse(line).map_err(|err| {
        let message = err.inner().to_string();
        ParseError {
            offset: err.offset(),
            message: if message.is_empty() {
                "invalid command".to_string()
            } else {
                message.replace('\n', "; ")
            },
        }
    })
}

fn command(input: &mut &str) -> ModalResult<Command> {
    space0.parse_next(input)?;
    let start = input.checkpoint();
    let word = keyword.parse_next(input)?;

    let parsed = match word.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "reset" => Command::Reset,
        "walk" => Command::Walk,
        "run" => Command::Run,
        "toggle" => Command::Toggle,
        "speed" => Command::Speed(argument(adjust, "speed value").parse_next(input)?),
        "grade" => Command::Grade(argument(adjust, "grade value").parse_next(input)?),
        "interval" | "hiit" => interval.parse_next(input)?,
        "preset" => Command::Preset(argument(preset, "preset name").parse_next(input)?),
        "status" => Command::Status,
        "events" => Command::Events,
        "help" | "?" => Command::Help(opt(preceded(space1, topic)).parse_next(input)?),
        _ => {
            input.reset(&start);
            return fail
                .context(StrContext::Label("command"))
                .context(StrContext::Expected(StrContextValue::Description(
                    "one of start, stop, reset, walk, run, toggle, speed, grade, interval, \
                     preset, status, events, help",
                )))
                .parse_next(input);
        }
    };

    (space0, eof)
        .context(StrContext::Expected(StrContextValue::Description(
            "end of command",
        )))
        .parse_next(input)?;
    Ok(parsed)
}

fn keyword<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    alt((take_while(1.., |c: char| c.is_ascii_alphabetic()), "?"))
        .context(StrContext::Label("command"))
        .parse_next(input)
}

fn argument<'i, O>(
    parser: impl Parser<&'i str, O, ErrMode<ContextError>>,
    label: &'static str,
) -> impl Parser<&'i str, O, ErrMode<ContextError>> {
    preceded(space1, parser).context(StrContext::Label(label))
}

fn number(input: &mut &str) -> ModalResult<f64> {
    float
        .verify(|value: &f64| value.is_finite())
        .context(StrContext::Expected(StrContextValue::Description("number")))
        .parse_next(input)
}

fn adjust(input: &mut &str) -> ModalResult<Adjust> {
    let sign = opt(one_of(['+', '-'])).parse_next(input)?;
    let magnitude = number.parse_next(input)?;
    Ok(match sign {
        Some('-') => Adjust::By(-magnitude),
        Some(_) => Adjust::By(magnitude),
        None => Adjust::To(magnitude),
    })
}

fn period(input: &mut &str) -> ModalResult<Duration> {
    (
        number.verify(|value: &f64| *value >= 0.0),
        opt(alt(("ms", "s", "m"))),
    )
        .try_map(|(value, unit)| {
            let seconds = match unit {
                Some("ms") => value / 1_000.0,
                Some("m") => value * 60.0,
                _ => value,
            };
            Duration::try_from_secs_f64(seconds)
        })
        .context(StrContext::Expected(StrContextValue::Description("duration")))
        .parse_next(input)
}

fn interval(input: &mut &str) -> ModalResult<Command> {
    let speed = opt(preceded(space1, number)).parse_next(input)?;
    let duration = match speed {
        Some(_) => opt(preceded(space1, period)).parse_next(input)?,
        None => None,
    };
    let end_speed = match duration {
        Some(_) => opt(preceded(space1, number)).parse_next(input)?,
        None => None,
    };
    Ok(Command::Interval {
        speed,
        duration,
        end_speed,
    })
}

fn preset(input: &mut &str) -> ModalResult<Preset> {
    let name = take_while(1.., |c: char| c.is_ascii_alphabetic()).parse_next(input)?;
    if name.eq_ignore_ascii_case("normal") {
        Ok(Preset::Normal)
    } else if name.eq_ignore_ascii_case("fast") {
        Ok(Preset::Fast)
    } else {
        fail.context(StrContext::Expected(StrContextValue::Description(
            "normal or fast",
        )))
        .parse_next(input)
    }
}

fn topic(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-')
        .map(str::to_ascii_lowercase)
        .parse_next(input)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => f.write_str("start"),
            Command::Stop => f.write_str("stop"),
            Command::Reset => f.write_str("reset"),
            Command::Walk => f.write_str("walk"),
            Command::Run => f.write_str("run"),
            Command::Toggle => f.write_str("toggle"),
            Command::Speed(Adjust::By(delta)) => write!(f, "speed {delta:+}"),
            Command::Speed(Adjust::To(value)) => write!(f, "speed {value}"),
            Command::Grade(Adjust::By(delta)) => write!(f, "grade {delta:+}"),
            Command::Grade(Adjust::To(value)) => write!(f, "grade {value}"),
            Command::Interval { .. } => f.write_str("interval"),
            Command::Preset(preset) => write!(f, "preset {}", preset.name()),
            Command::Status => f.write_str("status"),
            Command::Events => f.write_str("events"),
            Command::Help(_) => f.write_str("help"),
        }
    }
}
