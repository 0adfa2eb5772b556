mod support;

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use std::time::Duration;

use newsdrill::curation::CurationService;
use newsdrill::llm::{AiProvider, ImageInput, ProviderChain, ProviderError};
use newsdrill::notify::NotificationChannel;
use newsdrill::scheduler::{Delivery, DeliveryScheduler, SchedulerSettings};
use newsdrill::storage::{CuratedItem, NewsFilter, WordStatus, LAST_NEWS_UPDATE_KEY};
use newsdrill::vocabulary::VocabularyService;

use support::{candidate, memory_store, FlakyFeed, RecordingChannel, ScriptedProvider, StaticFeed};

fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

fn at(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn chain(providers: Vec<Arc<ScriptedProvider>>) -> ProviderChain {
    ProviderChain::new(
        providers
            .into_iter()
            .map(|p| p as Arc<dyn AiProvider>)
            .collect(),
    )
}

fn economy_feed() -> Vec<common::FeedConfig> {
    vec![common::FeedConfig {
        category: "Economy".to_string(),
        url: "https://feeds.example.com/economy".to_string(),
    }]
}

fn articles_reply(ids: &[usize]) -> String {
    let articles: Vec<serde_json::Value> = ids
        .iter()
        .map(|n| {
            serde_json::json!({
                "title": format!("기사 {}", n),
                "summary": ["요약 1", "요약 2", "요약 3"],
                "link": format!("https://news.example.com/{}", n),
                "category": "Economy"
            })
        })
        .collect();
    serde_json::Value::Array(articles).to_string()
}

#[tokio::test]
async fn curated_items_flow_from_feed_to_delivery() {
    let store = memory_store().await;
    let provider = ScriptedProvider::replying("xai", &articles_reply(&[1, 2, 3]));
    let service = CurationService::new(store.clone(), chain(vec![provider.clone()]), kst());
    let feed = StaticFeed((1..=3).map(candidate).collect());

    let saved = service.run_cycle(&feed, &economy_feed(), Duration::ZERO).await.unwrap();
    assert_eq!(saved, 3);
    assert_eq!(provider.calls(), 1);

    let queued = store.get_undelivered(&NewsFilter::category("Economy"), 10).await.unwrap();
    let urls: Vec<&str> = queued.iter().map(|n| n.source_url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://news.example.com/1",
            "https://news.example.com/2",
            "https://news.example.com/3"
        ]
    );
    assert!(queued.iter().all(|n| n.category == "Economy"));
    assert!(queued.iter().all(|n| n.summary.lines().count() <= 3));

    let channel = RecordingChannel::new();
    let settings = SchedulerSettings::from_config(&common::SchedulerConfig::default()).unwrap();
    let mut scheduler = DeliveryScheduler::load(
        store.clone(),
        channel.clone() as Arc<dyn NotificationChannel>,
        settings,
    )
    .await
    .unwrap();
    let deliveries = scheduler.tick(at("2026-03-02T06:10:00+09:00")).await.unwrap();

    assert_eq!(
        deliveries,
        vec![Delivery::News {
            trigger: "06:00".parse().unwrap(),
            items: 3
        }]
    );
    assert_eq!(channel.sent_count(), 1);
    assert!(channel.last_text().unwrap().contains("기사 1"));
    assert!(store
        .get_undelivered(&NewsFilter::category("Economy"), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn known_urls_are_dropped_before_the_provider_call() {
    let store = memory_store().await;
    let today = Utc::now().with_timezone(&kst()).date_naive();
    store
        .save_bulk(&[CuratedItem {
            collection_date: today,
            title: "Already here".to_string(),
            summary: "old".to_string(),
            source_url: "https://news.example.com/1".to_string(),
            category: "Economy".to_string(),
        }])
        .await
        .unwrap();

    let provider = ScriptedProvider::replying("xai", &articles_reply(&[2]));
    let service = CurationService::new(store.clone(), chain(vec![provider.clone()]), kst());
    let items = service.curate("Economy", vec![candidate(1), candidate(2), candidate(2)]).await;

    assert_eq!(items.len(), 1);
    let prompts = provider.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("https://news.example.com/2"));
    assert!(!prompts[0].contains("https://news.example.com/1"));
}

#[tokio::test]
async fn nothing_new_means_no_provider_call() {
    let store = memory_store().await;
    let provider = ScriptedProvider::replying("xai", &articles_reply(&[1]));
    let service = CurationService::new(store.clone(), chain(vec![provider.clone()]), kst());
    let feed = StaticFeed(vec![candidate(1)]);

    assert_eq!(service.run_cycle(&feed, &economy_feed(), Duration::ZERO).await.unwrap(), 1);
    assert_eq!(service.run_cycle(&feed, &economy_feed(), Duration::ZERO).await.unwrap(), 0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn rate_limited_provider_falls_through_to_the_next() {
    let store = memory_store().await;
    let xai = ScriptedProvider::failing("xai", || ProviderError::RateLimited { attempts: 3 });
    let groq = ScriptedProvider::replying("groq", &articles_reply(&[1, 2]));
    let gemini = ScriptedProvider::replying("gemini", &articles_reply(&[1]));
    let service = CurationService::new(
        store.clone(),
        chain(vec![xai.clone(), groq.clone(), gemini.clone()]),
        kst(),
    );

    let items = service.curate("Economy", vec![candidate(1), candidate(2)]).await;

    assert_eq!(items.len(), 2);
    assert_eq!((xai.calls(), groq.calls(), gemini.calls()), (1, 1, 0));
}

#[tokio::test]
async fn empty_provider_output_falls_through_to_the_next() {
    let store = memory_store().await;
    let xai = ScriptedProvider::replying("xai", "I could not find anything relevant.");
    let groq = ScriptedProvider::replying("groq", &articles_reply(&[1]));
    let service = CurationService::new(store.clone(), chain(vec![xai.clone(), groq.clone()]), kst());

    let items = service.curate("Economy", vec![candidate(1)]).await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_url, "https://news.example.com/1");
    assert_eq!((xai.calls(), groq.calls()), (1, 1));
}

#[tokio::test]
async fn all_providers_failing_stores_nothing() {
    let store = memory_store().await;
    let xai = ScriptedProvider::failing("xai", || ProviderError::Timeout);
    let groq = ScriptedProvider::failing("groq", || ProviderError::Http {
        status: 500,
        body: "oops".to_string(),
    });
    let service = CurationService::new(store.clone(), chain(vec![xai, groq]), kst());
    let feed = StaticFeed(vec![candidate(1)]);

    let saved = service.run_cycle(&feed, &economy_feed(), Duration::ZERO).await.unwrap();

    assert_eq!(saved, 0);
    assert!(!store.url_exists("https://news.example.com/1").await.unwrap());
}

#[tokio::test]
async fn failing_feed_does_not_stop_other_categories() {
    let store = memory_store().await;
    let provider = ScriptedProvider::replying("xai", &articles_reply(&[1, 2]));
    let service = CurationService::new(store.clone(), chain(vec![provider.clone()]), kst());
    let feeds = vec![
        common::FeedConfig {
            category: "Economy".to_string(),
            url: "https://feeds.example.com/economy".to_string(),
        },
        common::FeedConfig {
            category: "World".to_string(),
            url: "https://feeds.example.com/world".to_string(),
        },
    ];
    let source = FlakyFeed {
        failing_url: "https://feeds.example.com/economy".to_string(),
        entries: vec![candidate(1), candidate(2)],
    };

    let saved = service.run_cycle(&source, &feeds, Duration::ZERO).await.unwrap();

    assert_eq!(saved, 2);
    assert_eq!(provider.calls(), 1);
    assert!(store
        .get_undelivered(&NewsFilter::category("Economy"), 10)
        .await
        .unwrap()
        .is_empty());
    let world = store.get_undelivered(&NewsFilter::category("World"), 10).await.unwrap();
    assert_eq!(world.len(), 2);
    assert!(store.get_setting(LAST_NEWS_UPDATE_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn cycle_without_providers_is_skipped() {
    let store = memory_store().await;
    let service = CurationService::new(store.clone(), ProviderChain::default(), kst());
    let feed = StaticFeed(vec![candidate(1)]);

    let saved = service.run_cycle(&feed, &economy_feed(), Duration::ZERO).await.unwrap();

    assert_eq!(saved, 0);
    assert_eq!(store.get_setting(LAST_NEWS_UPDATE_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn cycle_records_last_update() {
    let store = memory_store().await;
    let provider = ScriptedProvider::replying("xai", "[]");
    let service = CurationService::new(store.clone(), chain(vec![provider]), kst());

    service
        .run_cycle(&StaticFeed(Vec::new()), &economy_feed(), Duration::ZERO)
        .await
        .unwrap();

    let stamp = store.get_setting(LAST_NEWS_UPDATE_KEY).await.unwrap().unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S").is_ok());
}

#[tokio::test]
async fn vocabulary_words_are_generated_and_evaluated() {
    let store = memory_store().await;
    let writer = ScriptedProvider::replying(
        "xai",
        r#"{"words": [
            {"target_word": "resilient", "meaning": "회복력 있는", "examples": ["She is resilient."]},
            {"target_word": "drift", "meaning": "표류하다"},
            {"target_word": "  ", "meaning": "blank"}
        ]}"#,
    );
    let vocab = VocabularyService::new(store.clone(), chain(vec![writer]), kst());

    assert_eq!(vocab.add_from_text("TOEIC", "resilient, drift").await.unwrap(), 2);
    let words = store.get_words(Some("TOEIC"), Some(WordStatus::Active)).await.unwrap();
    assert_eq!(words.len(), 2);

    let judge = ScriptedProvider::replying("groq", r#"[{"is_correct": true, "feedback": "Good"}]"#);
    let vocab = VocabularyService::new(store.clone(), chain(vec![judge]), kst());
    let word = &words[0];
    let evaluation = vocab.evaluate(word.id, &word.word, "A resilient economy.").await.unwrap();

    assert!(evaluation.is_correct);
    assert_eq!(store.quiz_stats(word.id).await.unwrap(), (1, 1));
    let after = store.get_words(Some("TOEIC"), None).await.unwrap();
    let bumped = after.iter().find(|w| w.id == word.id).unwrap();
    assert_eq!(bumped.usage_count, 1);
}

#[tokio::test]
async fn evaluation_without_providers_reports_key_error() {
    let store = memory_store().await;
    let vocab = VocabularyService::new(store, ProviderChain::default(), kst());
    let evaluation = vocab.evaluate(1, "drift", "Boats drift.").await.unwrap();
    assert!(!evaluation.is_correct);
    assert_eq!(evaluation.feedback, "API Key Error");
}

#[tokio::test]
async fn image_words_fall_back_past_text_only_providers() {
    let store = memory_store().await;
    let groq = ScriptedProvider::failing("groq", || ProviderError::Unsupported("image input"));
    let gemini = ScriptedProvider::replying(
        "gemini",
        r#"[{"target_word": "ledger", "meaning": "원장", "examples": ["Check the ledger."]}]"#,
    );
    let vocab = VocabularyService::new(store.clone(), chain(vec![groq.clone(), gemini.clone()]), kst());
    let image = ImageInput {
        mime_type: "image/png".to_string(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    };

    assert_eq!(vocab.add_from_image("Photos", &image).await.unwrap(), 1);
    assert_eq!((groq.calls(), gemini.calls()), (1, 1));
    let words = store.get_words(Some("Photos"), Some(WordStatus::Active)).await.unwrap();
    assert_eq!(words.len(), 1);
    assert_eq!(words[0].word, "ledger");
}
