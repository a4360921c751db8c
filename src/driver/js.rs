//! JavaScript evaluation scripts
//!
//! Everything the engine needs from a live page is gathered by these IIFE
//! scripts and decoded from their JSON return values. Label sets for the
//! language-dependent scripts live in `data/*.txt`, one literal per line,
//! and are compiled into alternations here.

use once_cell::sync::Lazy;

/// Multilingual labels of folded-branch expander buttons.
pub const EXPAND_LABELS_RAW: &str = include_str!("../../data/expand_labels.txt");

/// Multilingual labels of the heading that opens the recommendations block.
pub const CUTOFF_LABELS_RAW: &str = include_str!("../../data/cutoff_labels.txt");

fn non_empty_lines(raw: &str) -> Vec<&str> {
    raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

pub fn expand_labels() -> Vec<&'static str> {
    non_empty_lines(EXPAND_LABELS_RAW)
}

pub fn cutoff_labels() -> Vec<&'static str> {
    non_empty_lines(CUTOFF_LABELS_RAW)
}

/// Case-insensitive alternation over the expander labels, usable both in JS
/// and as a Rust regex.
pub static EXPAND_PATTERN: Lazy<String> = Lazy::new(|| {
    expand_labels()
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|")
});

/// Snapshot every post card currently in the DOM.
///
/// Field names match [`super::CardSnapshot`]; keep the two in sync.
pub const CARDS_SCRIPT: &str = r#"
    (() => {
        const cards = Array.from(document.querySelectorAll('article'));
        return cards.map(card => {
            const status_ids = [];
            let time_anchor_id = null;
            for (const anchor of card.querySelectorAll('a[href*="/status/"]')) {
                const m = (anchor.getAttribute('href') || '').match(/\/status\/(\d+)/);
                if (!m) continue;
                if (!status_ids.includes(m[1])) status_ids.push(m[1]);
                if (!time_anchor_id && anchor.querySelector('time')) time_anchor_id = m[1];
            }

            const userName = card.querySelector('[data-testid="User-Name"]');
            let author_line = '';
            if (userName) {
                const lines = userName.innerText.split('\n').map(s => s.trim()).filter(Boolean);
                const name = lines[0] || '';
                const handle = (lines.find(l => l.startsWith('@')) || '@').slice(1);
                author_line = name + '@' + handle;
            }

            const cardWrapper = card.querySelector('[data-testid="card.wrapper"]');
            const card_title = cardWrapper
                ? (cardWrapper.innerText.split('\n').map(s => s.trim()).filter(Boolean)[0] || null)
                : null;

            const rect = card.getBoundingClientRect();

            return {
                status_ids,
                time_anchor_id,
                datetime: card.querySelector('time')?.getAttribute('datetime') || null,
                text: card.querySelector('[data-testid="tweetText"]')?.innerText || '',
                author_line,
                card_title,
                has_photo: !!card.querySelector('[data-testid="tweetPhoto"]'),
                has_video_player: !!card.querySelector('[data-testid="videoPlayer"]'),
                has_raw_video: !!card.querySelector('video'),
                reply_count: card.querySelector('[data-testid="reply"]')?.innerText?.trim() || null,
                repost_count: card.querySelector('[data-testid="retweet"]')?.innerText?.trim() || null,
                like_count: card.querySelector('[data-testid="like"]')?.innerText?.trim() || null,
                top_y: rect.top + window.scrollY
            };
        });
    })()
"#;

/// Absolute y of the first recommendations heading under the primary
/// column, or null when the page has none.
pub fn cutoff_script() -> String {
    let labels = serde_json::to_string(
        &cutoff_labels()
            .iter()
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
    (() => {{
        const labels = {labels};
        const column = document.querySelector('[data-testid="primaryColumn"]') || document.body;
        for (const h of column.querySelectorAll('h2, [role="heading"]')) {{
            const text = (h.innerText || '').trim().toLowerCase();
            if (!text) continue;
            if (labels.some(l => text.includes(l))) {{
                return h.getBoundingClientRect().top + window.scrollY;
            }}
        }}
        return null;
    }})()
"#
    )
}

/// Click the reply-sort tab for the given labels. Returns "clicked",
/// "already", or "absent".
pub fn sort_tab_script(target_labels: &[&str]) -> String {
    let labels = serde_json::to_string(
        &target_labels
            .iter()
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
    (() => {{
        const targets = {labels};
        for (const tab of document.querySelectorAll('[role="tab"]')) {{
            const text = (tab.innerText || '').trim().toLowerCase();
            if (!text) continue;
            if (targets.some(t => text === t || text.includes(t))) {{
                if (tab.getAttribute('aria-selected') === 'true') return 'already';
                tab.click();
                return 'clicked';
            }}
        }}
        return 'absent';
    }})()
"#
    )
}

/// Click the first visible folded-branch expander button. Returns whether
/// one was clicked.
pub fn expand_script() -> String {
    let pattern = serde_json::to_string(&*EXPAND_PATTERN).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"
    (() => {{
        const pattern = new RegExp({pattern}, 'i');
        for (const button of document.querySelectorAll('button, [role="button"]')) {{
            const text = (button.innerText || '').trim();
            if (!text || !pattern.test(text)) continue;
            button.scrollIntoView({{block: 'center'}});
            button.click();
            return true;
        }}
        return false;
    }})()
"#
    )
}

/// Raw signals for the login-wall predicate.
pub const LOGIN_PROBE_SCRIPT: &str = r#"
    (() => {
        const body = document.body ? document.body.innerText : '';
        return {
            has_login_prompt:
                !!document.querySelector('[data-testid="loginButton"], a[href="/login"]')
                || /log in|sign up|登录|注册/i.test(body),
            has_replies_teaser: /view\s+\d+\s+(more\s+)?repl|查看\s*\d+\s*条回复/i.test(body),
            card_count: document.querySelectorAll('article').length
        };
    })()
"#;

pub const SCROLL_LAST_CARD_SCRIPT: &str = r#"
    (() => {
        const cards = document.querySelectorAll('article');
        if (cards.length) cards[cards.length - 1].scrollIntoView({block: 'end'});
        return cards.length;
    })()
"#;

pub const SCROLL_PRIMARY_COLUMN_SCRIPT: &str = r#"
    (() => {
        const column = document.querySelector('[data-testid="primaryColumn"]');
        if (column) column.scrollTop = column.scrollHeight;
        return true;
    })()
"#;

pub fn scroll_window_by_script(pixels: f64) -> String {
    format!("window.scrollBy(0, {pixels}); true")
}

pub const SCROLL_TO_BOTTOM_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight); true";

pub const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";
