use thiserror::Error;
use std::path::PathBuf;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    /// 数据源暂时不可用（5xx、超时、连接失败），稍后重试可能成功
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider rate limit hit (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 数据源不认识的代码，重试无意义
    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Unexpected provider response: {0}")]
    ProviderResponse(String),

    #[error("No snapshot available in {}", dir.display())]
    NoSnapshot { dir: PathBuf },

    #[error("Corrupt snapshot {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SnapshotError {
    /// Whether a provider failure could succeed on a later attempt.
    /// Nothing in this crate retries; callers and logs use this to tell
    /// a flaky network apart from a bad ticker.
    pub fn is_transient(&self) -> bool {
        match self {
            SnapshotError::ProviderUnavailable(_) | SnapshotError::RateLimited { .. } => true,
            SnapshotError::RequestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SnapshotError::CorruptSnapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

// 用于从字符串创建错误
impl From<String> for SnapshotError {
    fn from(s: String) -> Self {
        SnapshotError::Unknown(s)
    }
}

// 用于从&str创建错误
impl From<&str> for SnapshotError {
    fn from(s: &str) -> Self {
        SnapshotError::Unknown(s.to_string())
    }
}
