//! Contract between the fetch workers and the network layer
//!
//! The worker pool never talks HTTP itself. It asks a [`Protocol`] for the
//! robots rules of a target and for the raw response, then classifies the
//! [`ProtocolStatus`] into a fetch outcome on its own.

use crate::record::CrawlRecord;
use crate::robots::RobotRules;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Outcome of a protocol-level fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStatus {
    Success,
    Failed,
    Gone,
    Moved,
    TempMoved,
    NotFound,
    Retry,
    Exception,
    AccessDenied,
    RobotsDenied,
    RedirExceeded,
    NotModified,
    WouldBlock,
    Blocked,
}

impl ProtocolStatus {
    /// Maps an HTTP status code
    ///
    /// | Code | Status |
    /// |------|--------|
    /// | 2xx | Success |
    /// | 300, 301, 308 | Moved |
    /// | 302, 303, 307 | TempMoved |
    /// | 304 | NotModified |
    /// | 400, 410 | Gone |
    /// | 401, 403 | AccessDenied |
    /// | 404 | NotFound |
    /// | 429 | Blocked |
    /// | anything else | Exception |
    pub fn from_http_code(code: u16) -> Self {
        match code {
            200..=299 => Self::Success,
            300 | 301 | 308 => Self::Moved,
            302 | 303 | 307 => Self::TempMoved,
            304 => Self::NotModified,
            400 | 410 => Self::Gone,
            401 | 403 => Self::AccessDenied,
            404 => Self::NotFound,
            429 => Self::Blocked,
            _ => Self::Exception,
        }
    }

    /// Name stored in the record metadata
    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Gone => "gone",
            Self::Moved => "moved",
            Self::TempMoved => "temp_moved",
            Self::NotFound => "notfound",
            Self::Retry => "retry",
            Self::Exception => "exception",
            Self::AccessDenied => "access_denied",
            Self::RobotsDenied => "robots_denied",
            Self::RedirExceeded => "redir_exceeded",
            Self::NotModified => "notmodified",
            Self::WouldBlock => "would_block",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A content-level redirect (`<meta http-equiv="refresh">`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRefresh {
    /// Absolute target URL
    pub target: String,
    /// Delay before the refresh (seconds)
    pub delay_secs: u32,
}

/// Response handed back by a protocol
#[derive(Debug, Clone)]
pub struct ProtocolResponse {
    pub status: ProtocolStatus,

    /// Raw status code (0 if the protocol has none)
    pub code: u16,

    pub content: Vec<u8>,
    pub content_type: Option<String>,

    /// Absolute target of a protocol-level redirect
    pub redirect: Option<String>,

    /// Target of a content-level redirect
    pub refresh: Option<MetaRefresh>,

    /// Last-Modified time reported by the server (epoch ms, 0 = unknown)
    pub modified_time: i64,
}

impl ProtocolResponse {
    /// Creates a response with the given status and no payload
    pub fn with_status(status: ProtocolStatus) -> Self {
        Self {
            status,
            code: 0,
            content: Vec::new(),
            content_type: None,
            redirect: None,
            refresh: None,
            modified_time: 0,
        }
    }

    /// Creates a successful response carrying `content`
    pub fn success(content: impl Into<Vec<u8>>) -> Self {
        Self {
            code: 200,
            content: content.into(),
            ..Self::with_status(ProtocolStatus::Success)
        }
    }

    /// Creates a redirect response
    pub fn redirect(target: impl Into<String>, temporary: bool) -> Self {
        let (status, code) = if temporary {
            (ProtocolStatus::TempMoved, 302)
        } else {
            (ProtocolStatus::Moved, 301)
        };
        Self {
            code,
            redirect: Some(target.into()),
            ..Self::with_status(status)
        }
    }
}

/// Transport failures; the worker treats all of them as exceptions
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for ProtocolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Network collaborator used by the fetch workers
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Returns the robots rules governing `url`
    async fn robot_rules(&self, url: &Url) -> RobotRules;

    /// Fetches `url`; `record` carries the previous state (e.g. modified time)
    async fn fetch(&self, url: &Url, record: &CrawlRecord)
        -> Result<ProtocolResponse, ProtocolError>;
}
