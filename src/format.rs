//! Message rendering.
//!
//! [`Formatter`] turns a stream snapshot into the two display strings the
//! executor sends: the long HTML body for text messages and the short plain
//! caption for media messages. Both must be deterministic and pure.
//!
//! [`DefaultFormatter`] renders the stock layout: a state icon, the stream
//! title, the game (omitted when the title already names it) and the channel
//! URL. The short form is capped at 200 characters by shortening the status
//! line and appending an ellipsis; the cut is always on a character boundary
//! and never inside the icon prefix.

use crate::types::StreamSnapshot;

/// Maximum length of the short caption form, in characters.
const SHORT_LIMIT: usize = 200;

const TIMEOUT_ICON: &str = "⏲";
const OFFLINE_ICON: &str = "🏁";
const RECORD_ICON: &str = "📽️";

pub trait Formatter: Send + Sync {
    /// Plain caption accompanying a media message.
    fn render_short(&self, snapshot: &StreamSnapshot) -> String;

    /// HTML body of a text message.
    fn render_long(&self, snapshot: &StreamSnapshot) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultFormatter;

impl Formatter for DefaultFormatter {
    fn render_short(&self, snapshot: &StreamSnapshot) -> String {
        let text = short_text(snapshot, 0);
        let len = text.chars().count();
        if len > SHORT_LIMIT {
            short_text(snapshot, len - SHORT_LIMIT)
        } else {
            text
        }
    }

    fn render_long(&self, snapshot: &StreamSnapshot) -> String {
        let symbol = state_icon(snapshot);
        let title = snapshot.title.as_str();
        let game = effective_game(snapshot);
        let name = snapshot.channel_name.as_str();
        let url = snapshot.url.as_str();

        let mut status_parts: Vec<String> = Vec::new();
        if !symbol.is_empty() {
            status_parts.push(symbol.to_string());
        }
        if !title.is_empty() {
            status_parts.push(sanitize(title));
        }
        let status_line = status_parts.join(" ");

        let mut desc_parts: Vec<&str> = Vec::new();
        if !name.is_empty() {
            desc_parts.push(name);
        }
        if !game.is_empty() {
            if !name.is_empty() {
                desc_parts.push("—");
            }
            desc_parts.push(game);
        }
        let desc_line = desc_parts.join(" ");

        let mut lines: Vec<String> = Vec::new();
        if !status_line.is_empty() {
            lines.push(status_line);
        }
        if !desc_line.is_empty() {
            if url.is_empty() {
                lines.push(sanitize(&desc_line));
            } else {
                lines.push(anchor(&desc_line, url));
            }
        } else if !url.is_empty() {
            lines.push(url.to_string());
        }
        lines.join("\n")
    }
}

fn short_text(snapshot: &StreamSnapshot, strip: usize) -> String {
    let symbol = state_icon(snapshot);
    let title = snapshot.title.as_str();
    let game = effective_game(snapshot);
    let url = snapshot.url.as_str();

    let mut parts: Vec<&str> = Vec::new();
    if !symbol.is_empty() {
        parts.push(symbol);
    }
    if !title.is_empty() {
        parts.push(title);
    }
    if !game.is_empty() {
        if !title.is_empty() {
            parts.push("—");
        }
        parts.push(game);
    }
    let mut status_line = parts.join(" ");

    if strip > 0 && !status_line.is_empty() {
        let total = status_line.chars().count();
        // Leave the icon prefix intact even when the budget is tight.
        let floor = symbol.chars().count();
        let keep = total.saturating_sub(strip + 3).max(floor);
        let truncated: String = status_line.chars().take(keep).collect();
        status_line = format!("{}...", truncated.trim_end());
    }

    let mut lines: Vec<&str> = Vec::new();
    if !status_line.is_empty() {
        lines.push(&status_line);
    }
    if !url.is_empty() {
        lines.push(url);
    }
    lines.join("\n")
}

/// Icon for the stream's current state; empty while plainly live.
fn state_icon(snapshot: &StreamSnapshot) -> &'static str {
    if snapshot.is_timeout {
        TIMEOUT_ICON
    } else if snapshot.is_offline {
        OFFLINE_ICON
    } else if snapshot.is_record {
        RECORD_ICON
    } else {
        ""
    }
}

/// The game line is dropped when the title already mentions it.
fn effective_game(snapshot: &StreamSnapshot) -> &str {
    if snapshot.title.contains(snapshot.game.as_str()) {
        ""
    } else {
        snapshot.game.as_str()
    }
}

fn sanitize(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn sanitize_attr(text: &str) -> String {
    sanitize(text).replace('"', "&quot;")
}

fn anchor(text: &str, url: &str) -> String {
    format!("<a href=\"{}\">{}</a>", sanitize_attr(url), sanitize(text))
}
