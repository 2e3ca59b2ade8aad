pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use tracing::info;

/// Outbound operator channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`, retrying internally. Returns whether delivery succeeded.
    async fn send(&self, text: &str) -> bool;
}

/// Writes messages to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> bool {
        info!("[notify] {}", text.replace('\n', " | "));
        true
    }
}
