pub mod activity;
pub mod cli;
pub mod config;
pub mod error;
pub mod etag;
pub mod history;
pub mod indexer;
pub mod jsonl;
pub mod logging;
pub mod messages;
pub mod record;
pub mod store;

pub use activity::{ActivityDetector, ActivitySnapshot, ActivitySource, SystemActivitySource};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{HistoryPrompt, HistoryPromptCache};
pub use indexer::{FileIndexResult, IndexOutcome, Indexer, ProjectScan, SkipReason};
pub use messages::{MessageAccess, MessageList, MessageSummary, NumberedMessage};
pub use store::IndexStore;
