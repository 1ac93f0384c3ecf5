use crate::models::range::{Interval, Period};
use crate::models::snapshot::Snapshot;
use crate::errors::Result;
use async_trait::async_trait;

/// 一次下载请求：所有代码共用同一窗口与粒度
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub tickers: Vec<String>,
    pub period: Period,
    pub interval: Interval,
    pub auto_adjust: bool,
}

impl DownloadRequest {
    pub fn new(tickers: Vec<String>) -> Self {
        Self {
            tickers,
            period: Period::default(),
            interval: Interval::default(),
            auto_adjust: true,
        }
    }
}

/// Base trait for market data scrapers
#[async_trait]
pub trait PriceScraper {
    /// Name of the upstream source, used in logs
    fn source_name(&self) -> &'static str;

    /// Download all requested tickers jointly into one snapshot.
    /// Columns are (Field, Ticker) pairs, rows are the provider's trading periods.
    async fn download(&self, request: &DownloadRequest) -> Result<Snapshot>;
}
