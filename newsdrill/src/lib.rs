// Library interface for newsdrill modules
// This allows tests and the binary to import modules

pub mod curation;
pub mod ingestion;
pub mod llm;
pub mod notify;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod vocabulary;
pub mod webhook;
