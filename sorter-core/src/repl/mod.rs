//! Line grammar of the operator console.
//!
//! The console exposes the same stimuli the machine receives (button edges,
//! ticks, objects on the tray) plus a few inspection commands. Parsing is done
//! with `winnow` and never allocates, so the grammar can be shared with a
//! serial console on the target.

use core::fmt;

use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, preceded, separated_pair};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::debounce::ButtonId;

/// Longest console line accepted, excluding the terminator.
pub const MAX_LINE_LEN: usize = 64;

/// Light an object reflects onto the sensor, 8 bits per channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Swatch {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Swatch {
    pub const RED: Self = Self::new(200, 40, 40);
    pub const GREEN: Self = Self::new(40, 200, 40);
    pub const BLUE: Self = Self::new(40, 40, 200);

    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

impl fmt::Display for Swatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.red, self.green, self.blue)
    }
}

/// A parsed console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    /// Raw edge on a button, subject to debouncing.
    Press(ButtonId),
    /// One system tick, delivered only while the tick is running.
    Tick,
    /// Lets the given number of milliseconds pass, ticking along the way.
    Wait(u32),
    /// Puts an object on the tray.
    Place(Swatch),
    /// Takes the object off the tray.
    Remove,
    Status,
    History,
    Help,
    Exit,
}

/// Errors returned by [`parse`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// Blank line.
    Empty,
    /// Line longer than [`MAX_LINE_LEN`].
    TooLong,
    /// The line does not match any command.
    Syntax,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => f.write_str("empty line"),
            ConsoleError::TooLong => write!(f, "line exceeds {MAX_LINE_LEN} characters"),
            ConsoleError::Syntax => f.write_str("unknown command, try `help`"),
        }
    }
}

/// One-line summaries printed by `help`.
pub const HELP: &[(&str, &str)] = &[
    ("btn1", "press button 1"),
    ("btn2", "press button 2"),
    ("tick", "deliver one system tick"),
    ("wait <ms>", "let time pass"),
    ("place <red|green|blue|R G B>", "put an object on the tray"),
    ("remove", "clear the tray"),
    ("status", "show state, counters, and display"),
    ("history", "show recent dispatches"),
    ("help", "show this list"),
    ("exit | quit", "leave the console"),
];

/// Parses one console line. Surrounding whitespace is ignored.
///
/// # Errors
///
/// [`ConsoleError`] describing why the line was rejected.
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    if line.len() > MAX_LINE_LEN {
        return Err(ConsoleError::TooLong);
    }
    if line.trim().is_empty() {
        return Err(ConsoleError::Empty);
    }
    (space0, command, space0)
        .map(|(_, command, _)| command)
        .parse(line.trim_end_matches(['\r', '\n']))
        .map_err(|_| ConsoleError::Syntax)
}

fn command(input: &mut &str) -> Result<ConsoleCommand, ContextError> {
    alt((
        "btn1".value(ConsoleCommand::Press(ButtonId::Btn1)),
        "btn2".value(ConsoleCommand::Press(ButtonId::Btn2)),
        "tick".value(ConsoleCommand::Tick),
        preceded(("wait", space1), dec_uint).map(ConsoleCommand::Wait),
        preceded(("place", space1), swatch).map(ConsoleCommand::Place),
        "remove".value(ConsoleCommand::Remove),
        "status".value(ConsoleCommand::Status),
        "history".value(ConsoleCommand::History),
        "help".value(ConsoleCommand::Help),
        alt(("exit", "quit")).value(ConsoleCommand::Exit),
    ))
    .parse_next(input)
}

fn swatch(input: &mut &str) -> Result<Swatch, ContextError> {
    alt((
        "red".value(Swatch::RED),
        "green".value(Swatch::GREEN),
        "blue".value(Swatch::BLUE),
        separated_pair(channel, space1, separated_pair(channel, space1, channel))
            .map(|(red, (green, blue))| Swatch::new(red, green, blue)),
    ))
    .parse_next(input)
}

fn channel(input: &mut &str) -> Result<u8, ContextError> {
    dec_uint.parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_commands() {
        assert_eq!(parse("btn1"), Ok(ConsoleCommand::Press(ButtonId::Btn1)));
        assert_eq!(parse("  btn2  "), Ok(ConsoleCommand::Press(ButtonId::Btn2)));
        assert_eq!(parse("tick\r\n"), Ok(ConsoleCommand::Tick));
        assert_eq!(parse("remove"), Ok(ConsoleCommand::Remove));
        assert_eq!(parse("wait 500"), Ok(ConsoleCommand::Wait(500)));
        assert_eq!(parse("history"), Ok(ConsoleCommand::History));
        assert_eq!(parse("help"), Ok(ConsoleCommand::Help));
        assert_eq!(parse("quit"), Ok(ConsoleCommand::Exit));
        assert_eq!(parse("exit"), Ok(ConsoleCommand::Exit));
    }

    #[test]
    fn place_accepts_names_and_triplets() {
        assert_eq!(parse("place red"), Ok(ConsoleCommand::Place(Swatch::RED)));
        assert_eq!(
            parse("place 10 20 30"),
            Ok(ConsoleCommand::Place(Swatch::new(10, 20, 30)))
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert_eq!(parse(""), Err(ConsoleError::Empty));
        assert_eq!(parse("   "), Err(ConsoleError::Empty));
        assert_eq!(parse("btn3"), Err(ConsoleError::Syntax));
        assert_eq!(parse("tick tock"), Err(ConsoleError::Syntax));
        assert_eq!(parse("place"), Err(ConsoleError::Syntax));
        assert_eq!(parse("place 300 0 0"), Err(ConsoleError::Syntax));
        assert_eq!(parse("place 1 2"), Err(ConsoleError::Syntax));
        assert_eq!(parse("wait"), Err(ConsoleError::Syntax));
        assert_eq!(parse("wait -5"), Err(ConsoleError::Syntax));
    }

    #[test]
    fn overlong_lines_are_rejected_before_parsing() {
        let line = [b'x'; MAX_LINE_LEN + 1];
        let line = core::str::from_utf8(&line).unwrap();
        assert_eq!(parse(line), Err(ConsoleError::TooLong));
    }
}
