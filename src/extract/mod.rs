//! Pure extraction over DOM snapshots
//!
//! Everything in here is a plain function from [`CardSnapshot`] /
//! [`LoginProbe`] data to records and decisions. No page access: the driver
//! gathers, this module interprets. Per-card failures are reported as `None`
//! and the caller moves on; a bad card never terminates a run.

use chrono::{DateTime, Utc};

use crate::driver::{CardSnapshot, LoginProbe};
use crate::records::{Reply, RootPost};

/// Canonical media placeholder tags appended to post text.
pub const TAG_IMAGE: &str = "[图片]";
pub const TAG_VIDEO: &str = "[视频]";
pub const TAG_LINK: &str = "[链接]";

/// Known mojibake renderings of the media tags (UTF-8 bytes decoded as
/// Windows-1252 somewhere upstream), normalised on write.
const MISENCODED_TAGS: [(&str, &str); 3] = [
    ("[å›¾ç‰‡]", TAG_IMAGE),
    ("[è§†é¢‘]", TAG_VIDEO),
    ("[é“¾æŽ¥]", TAG_LINK),
];

/// Rewrite known mis-encoded media tags to their canonical form.
pub fn normalize_media_tags(text: &str) -> String {
    let mut out = text.to_string();
    for (broken, canonical) in MISENCODED_TAGS {
        if out.contains(broken) {
            out = out.replace(broken, canonical);
        }
    }
    out
}

/// Parse an engagement count label: commas stripped, a trailing `K`/`M`
/// expands the value. Empty or absent labels are zero.
pub fn parse_count(label: Option<&str>) -> u64 {
    let Some(label) = label else { return 0 };
    let cleaned = label.trim().replace(',', "");
    if cleaned.is_empty() {
        return 0;
    }
    let (digits, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier).round() as u64,
        _ => 0,
    }
}

/// Split the flattened author block `"<name>@<handle>"`.
///
/// Display names may themselves contain `@`, so the split happens at the
/// last occurrence.
pub fn parse_author_line(line: &str) -> (String, String) {
    match line.rsplit_once('@') {
        Some((name, handle)) => (name.trim().to_string(), handle.trim().to_string()),
        None => (line.trim().to_string(), String::new()),
    }
}

/// Pick the id a card stands for.
///
/// Prefers the anchor wrapping the `<time>` element; when that resolves to
/// the root id (the platform lists the root as the first card of its own
/// conversation) and other ids exist, prefer a non-root one.
pub fn extract_id(card: &CardSnapshot, root_id: Option<&str>) -> Option<String> {
    let preferred = card
        .time_anchor_id
        .clone()
        .or_else(|| card.status_ids.first().cloned())?;

    if let Some(root) = root_id
        && preferred == root
        && let Some(other) = card.status_ids.iter().find(|id| id.as_str() != root)
    {
        return Some(other.clone());
    }
    Some(preferred)
}

/// Body text of a card with the media-tag suffix applied.
///
/// An empty body falls back to a link placeholder built from the embedded
/// card title (first 50 characters), or the bare tag when no card exists.
pub fn card_text(card: &CardSnapshot) -> String {
    let mut text = if card.text.trim().is_empty() {
        match card.card_title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => {
                let clipped: String = title.chars().take(50).collect();
                format!("{TAG_LINK} {clipped}")
            }
            _ => TAG_LINK.to_string(),
        }
    } else {
        card.text.trim().to_string()
    };

    if card.has_photo && !text.contains(TAG_IMAGE) {
        text.push(' ');
        text.push_str(TAG_IMAGE);
    }
    if (card.has_video_player || card.has_raw_video) && !text.contains(TAG_VIDEO) {
        text.push(' ');
        text.push_str(TAG_VIDEO);
    }
    normalize_media_tags(&text)
}

fn parse_created_at(datetime: Option<&str>) -> DateTime<Utc> {
    datetime
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Build the root-post record from the first article of a conversation page.
pub fn extract_root_post(card: &CardSnapshot) -> Option<RootPost> {
    let id = extract_id(card, None)?;
    let (author_name, author_handle) = parse_author_line(&card.author_line);
    if author_handle.is_empty() {
        log::debug!("card {id} has no author handle; skipping");
        return None;
    }
    Some(RootPost {
        id,
        author_name,
        author_handle,
        text: card_text(card),
        created_at: parse_created_at(card.datetime.as_deref()),
        like_count: parse_count(card.like_count.as_deref()),
        reply_count: parse_count(card.reply_count.as_deref()),
        repost_count: parse_count(card.repost_count.as_deref()),
    })
}

/// Build a reply record from a post card inside the conversation.
///
/// Returns `None` for the root's own card and for cards without a usable
/// id or author. The DOM does not expose ancestor ids reliably, so
/// `reply_to` falls back to the root id.
pub fn extract_reply(card: &CardSnapshot, root_id: &str) -> Option<Reply> {
    let id = extract_id(card, Some(root_id))?;
    if id == root_id {
        return None;
    }
    let (author_name, author_handle) = parse_author_line(&card.author_line);
    if author_handle.is_empty() {
        log::debug!("reply card {id} has no author handle; skipping");
        return None;
    }
    Some(Reply {
        id,
        root_id: root_id.to_string(),
        author_id: author_handle.clone(),
        author_name,
        author_handle,
        text: card_text(card),
        created_at: parse_created_at(card.datetime.as_deref()),
        like_count: parse_count(card.like_count.as_deref()),
        reply_to: root_id.to_string(),
    })
}

/// The login-wall decision: a login prompt together with a "view N replies"
/// teaser and at most two rendered cards.
pub fn is_login_walled(probe: &LoginProbe) -> bool {
    probe.has_login_prompt && probe.has_replies_teaser && probe.card_count <= 2
}
