//! Structured logging utilities.
//!
//! `init_tracing` configures the global subscriber for the binaries;
//! `ItemLogger` gives per-item lifecycle events consistent fields.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ytx_models::ItemId;

/// Install the global tracing subscriber.
///
/// `LOG_FORMAT=json` selects the JSON formatter; otherwise output is the
/// ANSI human format. `RUST_LOG` directives are honoured on top of
/// `ytx=info`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "ytx=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Item logger for structured logging with consistent formatting.
///
/// Every event carries the item id and the operation being performed.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    item_id: String,
    operation: String,
}

impl ItemLogger {
    /// Create a new logger for a queue item and operation.
    pub fn new(item_id: &ItemId, operation: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            operation = %self.operation,
            "Item started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            operation = %self.operation,
            "Item progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            item_id = %self.item_id,
            operation = %self.operation,
            "Item warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            item_id = %self.item_id,
            operation = %self.operation,
            "Item error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            operation = %self.operation,
            "Item completed: {}", message
        );
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this item.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "item",
            item_id = %self.item_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_logger_fields() {
        let logger = ItemLogger::new(&ItemId::from("ab12cd34"), "process");
        assert_eq!(logger.item_id(), "ab12cd34");
        assert_eq!(logger.operation(), "process");
    }
}
