use crate::error::AppError;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_NOTICE_SECONDS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub raised_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Holds the most recent failure message for a limited time.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    ttl: Duration,
    current: Option<Notice>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_SECONDS)
    }
}

impl NoticeBoard {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            current: None,
        }
    }

    /// Replaces any previous notice.
    pub fn raise<M: Into<String>>(&mut self, message: M, now: OffsetDateTime) {
        self.current = Some(Notice {
            message: message.into(),
            raised_at: now,
            expires_at: now.checked_add(self.ttl).unwrap_or(now),
        });
    }

    pub fn raise_error(&mut self, err: &AppError, now: OffsetDateTime) {
        self.raise(err.to_string(), now);
    }

    pub fn current(&self, now: OffsetDateTime) -> Option<&Notice> {
        self.current
            .as_ref()
            .filter(|notice| now < notice.expires_at)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
