// Library interface for newschat modules
// This allows tests and other binaries to import modules

pub mod catalog;
pub mod chat;
pub mod driver;
pub mod ingestion;
pub mod llm;
pub mod scraping;
pub mod session;
