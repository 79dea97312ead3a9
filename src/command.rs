//! Command grammar for mention-stripped chat text.
//!
//! Grammar, after markup removal and entity decoding:
//!
//! ```text
//! command   = ws* name (ws+ parameter)? ws*
//! name      = any run of non-whitespace, matched case-insensitively
//! parameter = free text up to the end of input
//! ```
//!
//! Markup tags are token boundaries: `<p>status</p>` and `status<br/>` both
//! parse as `status`.

use std::fmt::Write;

use lazy_regex::regex;
use strum::{Display, EnumIter, EnumMessage, EnumString, IntoEnumIterator};

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumMessage)]
#[strum(ascii_case_insensitive)]
pub enum CommandName {
    #[strum(to_string = "status", message = "Report whether the bot is on")]
    Status,
    #[strum(to_string = "version", message = "Show the running version")]
    Version,
    #[strum(to_string = "help", message = "List the commands I understand")]
    Help,
    #[strum(
        to_string = "start-stream",
        serialize = "startstream",
        message = "Join the call and start recording its audio"
    )]
    StartStream,
    #[strum(
        to_string = "stop-stream",
        serialize = "stopstream",
        message = "Leave the call and save the recording"
    )]
    StopStream,
}

/// A parsed command: a known name, or the unrecognized fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Known {
        name: CommandName,
        parameters: Vec<String>,
    },
    /// Carries the original text as its only parameter.
    Unrecognized(String),
}

impl Command {
    #[must_use]
    pub fn name(&self) -> Option<CommandName> {
        match self {
            Command::Known { name, .. } => Some(*name),
            Command::Unrecognized(_) => None,
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &[String] {
        match self {
            Command::Known { parameters, .. } => parameters,
            Command::Unrecognized(text) => std::slice::from_ref(text),
        }
    }
}

/// Parse mention-stripped text into a command. Never fails: empty or unknown
/// input yields [`Command::Unrecognized`].
#[must_use]
pub fn parse(text: &str) -> Command {
    let plain = to_plain_text(text);
    let mut tokens = plain.splitn(2, char::is_whitespace);
    let Some(first) = tokens.next().filter(|token| !token.is_empty()) else {
        return Command::Unrecognized(text.to_string());
    };

    match first.parse::<CommandName>() {
        Ok(name) => {
            let parameters = tokens
                .next()
                .map(str::trim)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect();
            Command::Known { name, parameters }
        }
        Err(_) => Command::Unrecognized(text.to_string()),
    }
}

/// Strip markup tags and decode entities, collapsing surrounding whitespace.
fn to_plain_text(text: &str) -> String {
    let tag = regex!(r"<[^>]*>");
    let without_tags = tag.replace_all(text, " ");
    html_escape::decode_html_entities(&without_tags)
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Help text listing every command with its description.
#[must_use]
pub fn help_text() -> String {
    let mut help = String::from("Commands I understand:");
    for command in CommandName::iter() {
        let _ = write!(
            help,
            "<br><b>{command}</b> - {}",
            command.get_message().unwrap_or_default()
        );
    }
    help
}
