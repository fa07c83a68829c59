//! Delivery analytics.
//!
//! Every successful send or update reports an event (category, action,
//! label) keyed by the sub-chat it touched. The sink is fire-and-forget:
//! recording failures are retried a bounded number of times and then
//! dropped, and nothing here ever reaches the delivery control flow.

use async_trait::async_trait;

use crate::types::SubChatId;

#[cfg(all(feature = "http", feature = "tracing"))]
fn trace_drop(detail: &str) {
    tracing::debug!(detail, "analytics event dropped");
}

#[cfg(all(feature = "http", not(feature = "tracing")))]
fn trace_drop(_detail: &str) {}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, chat: &SubChatId, category: &str, action: &str, label: &str);
}

/// Discards all events. The default when no analytics backend is wired in.
#[derive(Debug, Default, Clone)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsSink for NoopAnalytics {
    async fn record(&self, _chat: &SubChatId, _category: &str, _action: &str, _label: &str) {}
}

/// Sink posting events to an HTTP collector as form parameters.
///
/// Each event is shipped from a detached task so recording never blocks a
/// delivery. A failed post is retried up to 5 times with a fixed 250 ms
/// delay, then dropped.
#[cfg(feature = "http")]
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    endpoint: String,
    property_id: Option<String>,
}

#[cfg(feature = "http")]
impl HttpAnalyticsSink {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY_MS: u64 = 250;

    pub fn new(endpoint: impl Into<String>, property_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            property_id,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn record(&self, chat: &SubChatId, category: &str, action: &str, label: &str) {
        let Some(property_id) = self.property_id.clone() else {
            trace_drop("no property id configured");
            return;
        };

        let params: Vec<(&'static str, String)> = vec![
            ("v", "1".to_string()),
            ("tid", property_id),
            ("an", "bot".to_string()),
            ("t", "event".to_string()),
            ("cid", chat.0.clone()),
            ("ec", category.to_string()),
            ("ea", action.to_string()),
            ("el", label.to_string()),
        ];

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            let mut retries_left = Self::MAX_RETRIES;
            loop {
                match client.post(&endpoint).form(&params).send().await {
                    Ok(_) => return,
                    Err(err) => {
                        if retries_left == 0 {
                            trace_drop(&err.to_string());
                            return;
                        }
                        retries_left -= 1;
                        tokio::time::sleep(std::time::Duration::from_millis(
                            Self::RETRY_DELAY_MS,
                        ))
                        .await;
                    }
                }
            }
        });
    }
}
