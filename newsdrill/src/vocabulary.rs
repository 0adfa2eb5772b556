use anyhow::Result;
use chrono::{FixedOffset, Utc};
use tracing::info;

use crate::llm::{ImageInput, ProviderChain, SentenceEvaluation, VocabDraft};
use crate::storage::Store;

/// Vocabulary book operations backed by the provider chain
pub struct VocabularyService {
    store: Store,
    providers: ProviderChain,
    offset: FixedOffset,
}

impl VocabularyService {
    pub fn new(store: Store, providers: ProviderChain, offset: FixedOffset) -> Self {
        Self {
            store,
            providers,
            offset,
        }
    }

    /// Generate entries for typed words or text and add them to `book`.
    /// Returns the number of words added.
    pub async fn add_from_text(&self, book: &str, text: &str) -> Result<usize> {
        let drafts = self
            .providers
            .first_accepted(
                "vocab generation",
                |provider| async move { provider.generate_vocab(text).await },
                |drafts: &Vec<VocabDraft>| !drafts.is_empty(),
            )
            .await
            .unwrap_or_default();
        self.save(book, &drafts).await
    }

    /// Extract words from a photographed page and add them to `book`.
    /// Only vision-capable providers can answer; the others report unsupported.
    pub async fn add_from_image(&self, book: &str, image: &ImageInput) -> Result<usize> {
        let drafts = self
            .providers
            .first_accepted(
                "vocab extraction",
                |provider| async move { provider.extract_vocab_from_image(image).await },
                |drafts: &Vec<VocabDraft>| !drafts.is_empty(),
            )
            .await
            .unwrap_or_default();
        self.save(book, &drafts).await
    }

    /// Judge a practice sentence and log the result against the word
    pub async fn evaluate(&self, word_id: i64, word: &str, sentence: &str) -> Result<SentenceEvaluation> {
        if self.providers.is_empty() {
            return Ok(SentenceEvaluation::rejected("API Key Error"));
        }
        let evaluation = self
            .providers
            .first_accepted(
                "sentence evaluation",
                |provider| async move { provider.evaluate_sentence(word, sentence).await },
                |_| true,
            )
            .await
            .unwrap_or_else(|| SentenceEvaluation::rejected("AI Error: No response"));

        self.store.record_quiz_result(word_id, evaluation.is_correct).await?;
        self.store.increment_usage(word_id).await?;
        Ok(evaluation)
    }

    async fn save(&self, book: &str, drafts: &[VocabDraft]) -> Result<usize> {
        let today = Utc::now().with_timezone(&self.offset).date_naive();
        let added = self.store.add_vocab_bulk(book, drafts, today).await?;
        info!("[{}] {} generated, {} new words", book, drafts.len(), added);
        Ok(added)
    }
}
