#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use newsdrill::ingestion::{FeedCandidate, FeedSource};
use newsdrill::llm::{AiProvider, LlmRequest, ProviderError};
use newsdrill::notify::{InlineKeyboard, NotificationChannel};
use newsdrill::storage::Store;

pub async fn memory_store() -> Store {
    Store::new(common::init_memory_pool().await.expect("memory pool"))
}

pub fn candidate(n: usize) -> FeedCandidate {
    FeedCandidate {
        title: format!("Headline {}", n),
        link: format!("https://news.example.com/{}", n),
    }
}

/// Channel that records every message; can be switched to fail
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, Option<InlineKeyboard>)>>,
    pub answered: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(text, _)| text.clone())
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, text: &str, controls: Option<&InlineKeyboard>) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .push((text.to_string(), controls.cloned()));
        true
    }

    async fn answer_callback(&self, callback_id: &str, _text: &str) -> bool {
        self.answered.lock().unwrap().push(callback_id.to_string());
        true
    }
}

/// Provider answering every request with a fixed outcome, recording the prompts it saw
pub struct ScriptedProvider {
    pub name: &'static str,
    pub reply: std::result::Result<String, fn() -> ProviderError>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(name: &'static str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str, error: fn() -> ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: LlmRequest) -> std::result::Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// Feed source serving a fixed list
pub struct StaticFeed(pub Vec<FeedCandidate>);

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self, _url: &str) -> Result<Vec<FeedCandidate>> {
        Ok(self.0.clone())
    }
}

/// Feed source serving a fixed list, except for one URL that always fails
pub struct FlakyFeed {
    pub failing_url: String,
    pub entries: Vec<FeedCandidate>,
}

#[async_trait]
impl FeedSource for FlakyFeed {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedCandidate>> {
        if url == self.failing_url {
            return Err(anyhow!("feed {} is unreachable", url));
        }
        Ok(self.entries.clone())
    }
}

/// Shared buffer a tracing subscriber can write its log lines to
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Route this thread's tracing events into the buffer until the guard drops
    pub fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
