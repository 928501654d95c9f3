// =============================================================================
// Notifier — fire-and-forget operator messages (spec.md, out-of-scope
// collaborator specified only by the interface the core consumes)
// =============================================================================
//
// The core never waits on notification delivery and never treats a failed
// notification as a pipeline error: it's purely an operator convenience.
// Grounded on the teacher's `binance/client.rs` request-building shape.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::Market;

/// Pushes a string, keyed by market, to an out-of-band messenger. Delivery
/// is best-effort: failures are logged, never propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, market: &Market, message: String);
}

/// Fire-and-forget convenience: spawns delivery and returns immediately,
/// matching spec.md §4.F/§4.D's "emit a notification" steps, which never
/// block the pipeline on delivery.
pub fn notify(notifier: &Arc<dyn Notifier>, market: &Market, message: String) {
    let notifier = notifier.clone();
    let market = market.clone();
    tokio::spawn(async move {
        notifier.send(&market, message).await;
    });
}

/// Telegram bot API notifier: `POST {bot_url}/sendMessage?chat_id=..&text=..`.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot_url: String,
    chat_id: i64,
    http: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_url: String, chat_id: i64) -> Self {
        Self {
            bot_url,
            chat_id,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build notifier http client"),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, market: &Market, message: String) {
        let url = format!("{}/sendMessage", self.bot_url.trim_end_matches('/'));
        let text = format!("[{market}] {message}");

        let result = self
            .http
            .post(&url)
            .query(&[("chat_id", self.chat_id.to_string()), ("text", text)])
            .send()
            .await;

        if let Err(e) = result {
            warn!(market = %market, error = %e, "failed to deliver notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: std::sync::Arc<parking_lot::Mutex<Vec<(Market, String)>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, market: &Market, message: String) {
            self.sent.lock().push((market.clone(), message));
        }
    }

    #[tokio::test]
    async fn notify_delivers_without_blocking_the_caller() {
        let recorder = RecordingNotifier::default();
        let sent = recorder.sent.clone();
        let notifier: Arc<dyn Notifier> = Arc::new(recorder);
        notify(&notifier, &"pi_ethusd".to_string(), "stop subscription".to_string());

        // notify() spawns; give the task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "pi_ethusd");
        assert_eq!(sent[0].1, "stop subscription");
    }
}
