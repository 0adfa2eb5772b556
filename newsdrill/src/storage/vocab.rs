use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::Store;
use crate::llm::VocabDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
    Active,
    Memorized,
}

impl WordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordStatus::Active => "active",
            WordStatus::Memorized => "memorized",
        }
    }
}

impl fmt::Display for WordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WordStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(WordStatus::Active),
            "memorized" => Ok(WordStatus::Memorized),
            other => anyhow::bail!("unknown word status: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabItem {
    pub id: i64,
    pub book: String,
    pub word: String,
    pub meaning: String,
    pub grammar: String,
    pub sentence: String,
    pub example: String,
    pub added_date: NaiveDate,
    pub status: WordStatus,
    pub usage_count: i64,
}

#[derive(sqlx::FromRow)]
struct VocabRow {
    id: i64,
    book: String,
    word: String,
    meaning: String,
    grammar: String,
    sentence: String,
    example: String,
    added_date: NaiveDate,
    status: String,
    usage_count: i64,
}

impl TryFrom<VocabRow> for VocabItem {
    type Error = anyhow::Error;

    fn try_from(row: VocabRow) -> Result<Self> {
        Ok(VocabItem {
            status: row.status.parse()?,
            id: row.id,
            book: row.book,
            word: row.word,
            meaning: row.meaning,
            grammar: row.grammar,
            sentence: row.sentence,
            example: row.example,
            added_date: row.added_date,
            usage_count: row.usage_count,
        })
    }
}

const VOCAB_COLUMNS: &str =
    "id, book, word, meaning, grammar, sentence, example, added_date, status, usage_count";

fn into_items(rows: Vec<VocabRow>) -> Result<Vec<VocabItem>> {
    rows.into_iter().map(VocabItem::try_from).collect()
}

impl Store {
    /// Add words to a book; a word already in the book is left untouched.
    /// Returns the number of words inserted.
    pub async fn add_vocab_bulk(&self, book: &str, drafts: &[VocabDraft], added: NaiveDate) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let mut inserted = 0usize;
        for draft in drafts {
            let word = draft.target_word.trim();
            if word.is_empty() {
                continue;
            }
            let result = sqlx::query(
                "INSERT OR IGNORE INTO vocab (book, word, meaning, grammar, sentence, example, added_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(book)
            .bind(word)
            .bind(&draft.meaning)
            .bind(&draft.grammar_point)
            .bind(&draft.original_sentence)
            .bind(&draft.examples)
            .bind(added)
            .execute(&mut tx)
            .await
            .with_context(|| format!("failed to insert word {}", word))?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await.context("failed to commit vocab batch")?;
        Ok(inserted)
    }

    /// Random sample of words still being learned
    pub async fn random_active_words(&self, count: usize) -> Result<Vec<VocabItem>> {
        let sql = format!(
            "SELECT {} FROM vocab WHERE status = 'active' ORDER BY RANDOM() LIMIT ?",
            VOCAB_COLUMNS
        );
        let rows = sqlx::query_as::<_, VocabRow>(&sql)
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to sample active words")?;
        into_items(rows)
    }

    /// Words of one book (or all books), newest first
    pub async fn get_words(&self, book: Option<&str>, status: Option<WordStatus>) -> Result<Vec<VocabItem>> {
        let sql = format!(
            "SELECT {} FROM vocab
             WHERE (? IS NULL OR book = ?)
               AND (? IS NULL OR status = ?)
             ORDER BY id DESC",
            VOCAB_COLUMNS
        );
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, VocabRow>(&sql)
            .bind(book)
            .bind(book)
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch words")?;
        into_items(rows)
    }

    pub async fn set_word_status(&self, ids: &[i64], status: WordStatus) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        for id in ids {
            sqlx::query("UPDATE vocab SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(id)
                .execute(&mut tx)
                .await
                .with_context(|| format!("failed to update status of word {}", id))?;
        }
        tx.commit().await.context("failed to commit status update")?;
        Ok(())
    }

    pub async fn increment_usage(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE vocab SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to bump usage of word {}", id))?;
        Ok(())
    }

    pub async fn record_quiz_result(&self, word_id: i64, is_correct: bool) -> Result<()> {
        sqlx::query("INSERT INTO quiz_log (word_id, is_correct) VALUES (?, ?)")
            .bind(word_id)
            .bind(is_correct)
            .execute(&self.pool)
            .await
            .context("failed to record quiz result")?;
        Ok(())
    }

    /// (attempts, correct) for one word
    pub async fn quiz_stats(&self, word_id: i64) -> Result<(i64, i64)> {
        let stats = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(is_correct), 0) FROM quiz_log WHERE word_id = ?",
        )
        .bind(word_id)
        .fetch_one(&self.pool)
        .await
        .context("failed to read quiz stats")?;
        Ok(stats)
    }
}
