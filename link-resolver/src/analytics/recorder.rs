use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use uuid::Uuid;

use crate::analytics::device::{detect_device_type, DeviceType};
use crate::metrics_utils::ANALYTICS_WRITES_COUNTER;
use crate::store::LinkStoreRef;

pub const MAX_TEXT_LENGTH: usize = 500;

/// One click, as persisted. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLinkAnalytics {
    pub id: Uuid,
    pub link_id: String,
    pub team_id: String,
    pub device: DeviceType,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewLinkAnalytics {
    pub fn new(
        link_id: &str,
        team_id: &str,
        user_agent: Option<&str>,
        referrer: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            link_id: link_id.to_string(),
            team_id: team_id.to_string(),
            device: detect_device_type(user_agent),
            user_agent: truncate_text(user_agent, MAX_TEXT_LENGTH),
            referrer: truncate_text(referrer, MAX_TEXT_LENGTH),
            created_at: Utc::now(),
        }
    }
}

/// Empty values are dropped, long ones cut to `max_chars` characters.
pub fn truncate_text(value: Option<&str>, max_chars: usize) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;
    Some(value.chars().take(max_chars).collect())
}

/// Writes click events. Never fails the caller: errors and timeouts are
/// logged and dropped.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    store: LinkStoreRef,
    write_timeout: Duration,
}

impl AnalyticsRecorder {
    pub fn new(store: LinkStoreRef, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
        }
    }

    pub async fn record(
        &self,
        link_id: &str,
        team_id: &str,
        user_agent: Option<&str>,
        referrer: Option<&str>,
    ) {
        let event = NewLinkAnalytics::new(link_id, team_id, user_agent, referrer);
        let device = event.device;

        let outcome = match tokio::time::timeout(
            self.write_timeout,
            self.store.insert_link_analytics(event),
        )
        .await
        {
            Ok(Ok(())) => "success",
            Ok(Err(error)) => {
                tracing::error!(
                    link_id,
                    team_id,
                    error = %error,
                    "Failed to record link analytics"
                );
                "error"
            }
            Err(_) => {
                tracing::warn!(
                    link_id,
                    team_id,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Timed out recording link analytics"
                );
                "timeout"
            }
        };

        counter!(
            ANALYTICS_WRITES_COUNTER,
            &[
                ("outcome", outcome.to_string()),
                ("device", device.as_str().to_string()),
            ]
        )
        .increment(1);
    }
}
