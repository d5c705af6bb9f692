#![forbid(unsafe_code)]

pub mod baseline;
pub mod batch;
pub mod cascade;
pub mod cli;
pub mod config;
pub mod error;
pub mod guardian;
pub mod health;
pub mod local;
pub mod logging;
pub mod model;
pub mod placeholder;
pub mod process;
pub mod provider;
pub mod quality;
pub mod retry;
pub mod sanitize;
pub mod structure;

pub use error::{ErrorClass, LoomError, LoomResult};
pub use guardian::Guardian;
pub use health::HealthRegistry;
pub use model::{BookDraft, CascadeResult, ChapterDraft, Tier};
