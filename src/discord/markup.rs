//! Conversion between Discord message text and the rich-text markup the core
//! works with.

use lazy_regex::regex;
use poise::serenity_prelude::User;

use crate::types::TextItem;

/// Name shown for a user: the global display name, else the username.
#[must_use]
pub fn display_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

/// Escape Discord message content into rich text, rendering user mentions as
/// mention spans.
#[must_use]
pub fn to_rich_text(content: &str, mentions: &[User]) -> String {
    let mut rich = html_escape::encode_text(content).into_owned();
    for user in mentions {
        let span = format!(
            r#"<span class="mention" abbr="{}">{}</span>"#,
            user.id,
            html_escape::encode_text(&display_name(user))
        );
        rich = rich
            .replace(&format!("&lt;@{}&gt;", user.id), &span)
            .replace(&format!("&lt;@!{}&gt;", user.id), &span);
    }
    rich
}

/// Render an outbound item as Discord markdown.
#[must_use]
pub fn to_markdown(item: &TextItem) -> String {
    let body = rich_to_markdown(&item.content);
    match item.subject.as_deref() {
        Some(subject) if !subject.is_empty() => format!("**{subject}**\n{body}"),
        _ => body,
    }
}

fn rich_to_markdown(rich: &str) -> String {
    let mention = regex!(r#"(?is)<span\b[^>]*\babbr\s*=\s*["'](\d+)["'][^>]*>.*?</span>"#);
    let line_break = regex!(r"(?i)<br\s*/?>|</p>\s*<p>");
    let bold = regex!(r"(?i)</?(b|strong)>");
    let italic = regex!(r"(?i)</?(i|em)>");
    // Leaves the `<@id>` mentions produced above in place.
    let tag = regex!(r"<[^@>][^>]*>");

    let text = mention.replace_all(rich, "<@$1>");
    let text = line_break.replace_all(&text, "\n");
    let text = bold.replace_all(&text, "**");
    let text = italic.replace_all(&text, "*");
    let text = tag.replace_all(&text, "");
    html_escape::decode_html_entities(&text).into_owned()
}
