//! Reply items for the built-in commands.

use crate::command::help_text;
use crate::types::TextItem;

/// Version of the running build.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn status(parent_id: Option<&str>) -> TextItem {
    TextItem::rich(parent_id, None, "Status <b>On</b>")
}

pub fn version(parent_id: Option<&str>) -> TextItem {
    TextItem::rich(parent_id, None, format!("Version: <b>{VERSION}</b>"))
}

pub fn help(parent_id: Option<&str>) -> TextItem {
    TextItem::rich(parent_id, Some("HELP"), help_text())
}

/// `text` is rich text already and is quoted as is.
pub fn not_understood(parent_id: Option<&str>, text: &str) -> TextItem {
    TextItem::rich(parent_id, None, format!("I do not understand <b>[{text}]</b>"))
}

pub fn greeting(nick_name: &str) -> TextItem {
    TextItem::rich(None, Some(&format!("Hi from {nick_name}")), "I am ready")
}
