use serde_json::json;

use super::{ImageInput, LlmRequest};
use crate::ingestion::FeedCandidate;

/// Number of articles the model is asked to keep per category
pub const ARTICLES_PER_CATEGORY: usize = 5;

const ANALYST_SYSTEM: &str = "You are a top-tier economic analyst who provides structured news analysis in Korean. Output ONLY a JSON array, no wrapping object.";
const VOCAB_SYSTEM: &str = "You are a vocabulary expert who provides English definitions and example sentences. Output ONLY a JSON array, no wrapping object.";
const EVALUATOR_SYSTEM: &str = "You are an English language expert who evaluates sentence accuracy. Output ONLY a JSON object.";

pub fn curation_request(entries: &[FeedCandidate], category: &str) -> LlmRequest {
    let data: Vec<_> = entries
        .iter()
        .map(|e| json!({"title": e.title, "link": e.link}))
        .collect();

    let prompt = format!(
        r#"Analyze the news below (category: {category}) and select the {count} most critical articles.

For each selected article write a structural analysis in Korean:
1. The fact: what happened, with exact numbers.
2. The cause: why it happened.
3. The outlook: the risk or implication.
If the title already states what happened, skip the fact and give only cause and outlook.
The summary must be at most 3 lines, one point per line.

Output a JSON array of objects with the keys:
- "title": the title in Korean, keeping the original meaning
- "summary": at most 3 lines separated by newlines
- "link": the original link, unchanged
- "category": "{category}"

DATA: {data}"#,
        category = category,
        count = ARTICLES_PER_CATEGORY,
        data = serde_json::Value::Array(data),
    );

    LlmRequest {
        system: Some(ANALYST_SYSTEM.to_string()),
        prompt,
        image: None,
    }
}

pub fn vocab_from_text_request(text: &str) -> LlmRequest {
    let prompt = format!(
        r#"Analyze the following English words or text: "{text}"

For each distinct word or key phrase, output a JSON object. Output ONLY a JSON array with the keys:
- "target_word": the English word
- "meaning": a simple definition in English only
- "original_sentence": a natural sentence using the word
- "grammar_point": a short grammar tip or nuance, in Korean
- "examples": exactly 2 example sentences, in English only"#
    );

    LlmRequest {
        system: Some(VOCAB_SYSTEM.to_string()),
        prompt,
        image: None,
    }
}

pub fn vocab_from_image_request(image: ImageInput) -> LlmRequest {
    let prompt = r#"Extract 5-8 English words from the image. Output a JSON array of objects with the keys:
- "target_word": the English word
- "meaning": a simple definition in English only
- "original_sentence": the exact sentence from the image, with full context
- "grammar_point": a short grammar tip, in Korean
- "examples": exactly 2 example sentences, in English only"#;

    LlmRequest {
        system: Some(VOCAB_SYSTEM.to_string()),
        prompt: prompt.to_string(),
        image: Some(image),
    }
}

pub fn evaluate_sentence_request(word: &str, sentence: &str) -> LlmRequest {
    let prompt = format!(
        r#"Target word: "{word}"
User sentence: "{sentence}"
Task: check whether the sentence uses the word correctly.
Output ONLY a JSON object with "is_correct" (bool) and "feedback" (Korean)."#
    );

    LlmRequest {
        system: Some(EVALUATOR_SYSTEM.to_string()),
        prompt,
        image: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curation_prompt_carries_entries_and_category() {
        let entries = vec![FeedCandidate {
            title: "Rates \"hold\"".to_string(),
            link: "https://example.com/a".to_string(),
        }];
        let req = curation_request(&entries, "Economy");
        assert!(req.prompt.contains("category: Economy"));
        assert!(req.prompt.contains(r#""link":"https://example.com/a""#));
        // titles are JSON-escaped, not spliced raw
        assert!(req.prompt.contains(r#"Rates \"hold\""#));
        assert!(req.image.is_none());
    }
}
