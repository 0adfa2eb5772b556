//! Rendering of news and vocabulary messages (Telegram HTML parse mode).

use chrono::{DateTime, FixedOffset};

use super::{InlineButton, InlineKeyboard, VOCAB_REFRESH};
use crate::storage::{NewsItem, VocabItem};

/// Summary lines kept per news item
pub const SUMMARY_MAX_LINES: usize = 3;

/// A rendered message with its optional buttons
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub text: String,
    pub controls: Option<InlineKeyboard>,
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// First `max` non-blank lines, trimmed
pub fn cap_lines(text: &str, max: usize) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(max)
        .collect::<Vec<_>>()
        .join("\n")
}

fn stamp(now: DateTime<FixedOffset>) -> String {
    format!("{} (UTC{})", now.format("%Y-%m-%d %H:%M"), now.format("%:z"))
}

pub fn news_card(items: &[NewsItem], now: DateTime<FixedOffset>) -> Card {
    let mut text = format!("<b>📰 AI News Briefing</b>\n<i>{}</i>\n\n", stamp(now));
    let mut buttons = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let n = idx + 1;
        text.push_str(&format!(
            "<b>{}. {}</b>\n📂 {}\n\n{}\n\n<a href=\"{}\">📎 Read original</a>\n\n",
            n,
            escape_html(&item.title),
            escape_html(&item.category),
            escape_html(&cap_lines(&item.summary, SUMMARY_MAX_LINES)),
            escape_html(&item.source_url),
        ));
        buttons.push(vec![InlineButton::link(format!("🔗 Article {}", n), &item.source_url)]);
    }

    Card {
        text,
        controls: (!buttons.is_empty()).then(|| InlineKeyboard {
            inline_keyboard: buttons,
        }),
    }
}

pub fn drill_card(words: &[VocabItem], now: DateTime<FixedOffset>) -> Card {
    let mut text = format!(
        "<b>📚 AI Vocabulary</b>\n<i>{}</i>\n\nWords to study today ✨\n\n",
        stamp(now)
    );
    for (idx, word) in words.iter().enumerate() {
        text.push_str(&format!("<b>{}. {}</b>\n📖 {}\n\n", idx + 1, escape_html(&word.word), escape_html(&word.meaning)));
        if !word.sentence.is_empty() {
            text.push_str(&format!("📜 {}\n\n", escape_html(&word.sentence)));
        }
        if !word.grammar.is_empty() {
            text.push_str(&format!("💡 {}\n\n", escape_html(&word.grammar)));
        }
    }

    Card {
        text,
        controls: Some(InlineKeyboard {
            inline_keyboard: vec![vec![InlineButton::callback("🔄 New words", VOCAB_REFRESH)]],
        }),
    }
}

/// Sent instead of a drill when no active word is left
pub fn all_memorized_card(now: DateTime<FixedOffset>) -> Card {
    Card {
        text: format!(
            "<b>📚 AI Vocabulary</b>\n<i>{}</i>\n\n🎉 Every word is memorized!\n\nAdd new words and keep going 💪",
            stamp(now)
        ),
        controls: None,
    }
}
