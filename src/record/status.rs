/// Record status definitions
///
/// Statuses fall into three families: `Db*` statuses live in the record db,
/// `Fetch*` statuses are emitted by the fetcher for the reconciler, and the
/// remaining statuses tag auxiliary records (links, signatures, metadata).
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a crawl record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CrawlStatus {
    // ===== Db States =====
    /// Page was not fetched yet
    DbUnfetched,

    /// Page was successfully fetched
    DbFetched,

    /// Page no longer exists
    DbGone,

    /// Page temporarily redirects to another page
    DbRedirTemp,

    /// Page permanently redirects to another page
    DbRedirPerm,

    /// Page was fetched and found unmodified
    DbNotModified,

    /// Page was marked as a duplicate of another page
    DbDuplicate,

    /// Page is no longer linked from anywhere
    DbOrphan,

    // ===== Fetch Outcomes =====
    /// Fetch was successful
    FetchSuccess,

    /// Fetch failed with a transient error
    FetchRetry,

    /// Fetch failed permanently
    FetchGone,

    /// Fetch returned a temporary redirect
    FetchRedirTemp,

    /// Fetch returned a permanent redirect
    FetchRedirPerm,

    /// Fetch found the page unmodified
    FetchNotModified,

    // ===== Auxiliary =====
    /// Record carries only a content signature
    Signature,

    /// Record was injected from a seed list
    Injected,

    /// Record was discovered through a link or redirect
    Linked,

    /// Record carries only parse metadata
    ParseMeta,
}

impl CrawlStatus {
    /// Returns the stable numeric code of this status
    pub fn code(&self) -> u8 {
        match self {
            Self::DbUnfetched => 0x01,
            Self::DbFetched => 0x02,
            Self::DbGone => 0x03,
            Self::DbRedirTemp => 0x04,
            Self::DbRedirPerm => 0x05,
            Self::DbNotModified => 0x06,
            Self::DbDuplicate => 0x07,
            Self::DbOrphan => 0x08,
            Self::FetchSuccess => 0x21,
            Self::FetchRetry => 0x22,
            Self::FetchGone => 0x23,
            Self::FetchRedirTemp => 0x24,
            Self::FetchRedirPerm => 0x25,
            Self::FetchNotModified => 0x26,
            Self::Signature => 0x41,
            Self::Injected => 0x42,
            Self::Linked => 0x43,
            Self::ParseMeta => 0x44,
        }
    }

    /// Parses a status from its numeric code
    ///
    /// Returns None if the code doesn't match any known status.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::all_states().into_iter().find(|s| s.code() == code)
    }

    /// Returns true if this status belongs to a record stored in the db
    pub fn is_db_status(&self) -> bool {
        matches!(
            self,
            Self::DbUnfetched
                | Self::DbFetched
                | Self::DbGone
                | Self::DbRedirTemp
                | Self::DbRedirPerm
                | Self::DbNotModified
                | Self::DbDuplicate
                | Self::DbOrphan
        )
    }

    /// Returns true if this status is a fetch outcome
    pub fn is_fetch_status(&self) -> bool {
        matches!(
            self,
            Self::FetchSuccess
                | Self::FetchRetry
                | Self::FetchGone
                | Self::FetchRedirTemp
                | Self::FetchRedirPerm
                | Self::FetchNotModified
        )
    }

    /// Returns a lowercase name used in logs and statistics
    pub fn name(&self) -> &'static str {
        match self {
            Self::DbUnfetched => "db_unfetched",
            Self::DbFetched => "db_fetched",
            Self::DbGone => "db_gone",
            Self::DbRedirTemp => "db_redir_temp",
            Self::DbRedirPerm => "db_redir_perm",
            Self::DbNotModified => "db_notmodified",
            Self::DbDuplicate => "db_duplicate",
            Self::DbOrphan => "db_orphan",
            Self::FetchSuccess => "fetch_success",
            Self::FetchRetry => "fetch_retry",
            Self::FetchGone => "fetch_gone",
            Self::FetchRedirTemp => "fetch_redir_temp",
            Self::FetchRedirPerm => "fetch_redir_perm",
            Self::FetchNotModified => "fetch_notmodified",
            Self::Signature => "signature",
            Self::Injected => "injected",
            Self::Linked => "linked",
            Self::ParseMeta => "parse_meta",
        }
    }

    /// Returns all possible statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::DbUnfetched,
            Self::DbFetched,
            Self::DbGone,
            Self::DbRedirTemp,
            Self::DbRedirPerm,
            Self::DbNotModified,
            Self::DbDuplicate,
            Self::DbOrphan,
            Self::FetchSuccess,
            Self::FetchRetry,
            Self::FetchGone,
            Self::FetchRedirTemp,
            Self::FetchRedirPerm,
            Self::FetchNotModified,
            Self::Signature,
            Self::Injected,
            Self::Linked,
            Self::ParseMeta,
        ]
    }

    /// Returns the statuses that live in the record db
    pub fn db_states() -> Vec<Self> {
        Self::all_states()
            .into_iter()
            .filter(|s| s.is_db_status())
            .collect()
    }
}

impl TryFrom<u8> for CrawlStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown crawl status code 0x{:02x}", code))
    }
}

impl From<CrawlStatus> for u8 {
    fn from(status: CrawlStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
