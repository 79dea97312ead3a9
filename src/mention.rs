//! Detects messages addressed to the bot and strips the addressing markup.
//!
//! A mention is rich-text markup of the form
//! `<span class="mention" abbr="USER_ID">DISPLAY NAME</span>`. The `abbr`
//! attribute is optional.

use lazy_regex::regex;

use crate::types::Identity;

/// Entity editors emit as the separator after a mention.
const NBSP_ENTITY: &str = "&nbsp;";

/// Decides whether rich text is addressed to the bot.
#[derive(Debug, Clone, Copy)]
pub struct MentionFilter<'a> {
    identity: &'a Identity,
}

impl<'a> MentionFilter<'a> {
    #[must_use]
    pub fn new(identity: &'a Identity) -> Self {
        Self { identity }
    }

    /// True when some mention in `raw` names the bot, by display name or by
    /// user id.
    #[must_use]
    pub fn is_addressed_to_bot(&self, raw: &str) -> bool {
        let mention = regex!(
            r#"(?is)<span\b(?P<attrs>[^>]*\bclass\s*=\s*["'][^"']*\bmention\b[^"']*["'][^>]*)>(?P<name>.*?)</span>"#
        );
        let abbr = regex!(r#"(?i)\babbr\s*=\s*["'](?P<id>[^"']*)["']"#);

        mention.captures_iter(raw).any(|caps| {
            let name = mentioned_name(&caps["name"]);
            if !self.identity.display_name.is_empty() && name == self.identity.display_name {
                return true;
            }
            !self.identity.user_id.is_empty()
                && abbr
                    .captures(&caps["attrs"])
                    .is_some_and(|id| id["id"] == self.identity.user_id)
        })
    }
}

/// Visible name inside a mention, without nested markup or a leading `@`.
fn mentioned_name(inner: &str) -> String {
    let tag = regex!(r"<[^>]*>");
    let text = tag.replace_all(inner, "");
    html_escape::decode_html_entities(text.trim())
        .trim_start_matches('@')
        .trim()
        .to_string()
}

/// Remove everything up to and including the first closing mention tag, plus
/// one separator.
///
/// The separator is a single character, or a `&nbsp;` entity. Text without a
/// mention is returned unchanged. The remainder may be empty and may still
/// contain markup.
#[must_use]
pub fn strip_mention(raw: &str) -> &str {
    let mention = regex!(r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*\bmention\b[^"']*["'][^>]*>.*?</span>"#);
    let Some(found) = mention.find(raw) else {
        return raw;
    };

    let rest = &raw[found.end()..];
    if let Some(after) = rest.strip_prefix(NBSP_ENTITY) {
        return after;
    }
    let mut chars = rest.chars();
    chars.next();
    chars.as_str()
}
