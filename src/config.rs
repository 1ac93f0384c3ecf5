use chrono::NaiveTime;
use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SnapshotError};
use crate::models::range::{Interval, Period};

pub const DEFAULT_TICKERS: [&str; 5] = ["META", "AAPL", "AMZN", "NFLX", "GOOG"];

pub struct Config {
    pub tickers: Vec<String>,
    pub period: Period,
    pub interval: Interval,
    pub auto_adjust: bool,
    pub output_dir: PathBuf,
    pub read_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub anchor_time: NaiveTime,  // 主刻度所在的时刻（开盘）
    pub display_timezone: Tz,
}

impl Config {
    pub fn new() -> Self {
        Self {
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            period: Period::default(),
            interval: Interval::default(),
            auto_adjust: true,
            output_dir: PathBuf::from("data/"),
            read_dir: PathBuf::from("data/"),
            plot_dir: PathBuf::from("plots/"),
            anchor_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or_default(),
            display_timezone: Tz::UTC,
        }
    }

    pub fn with_tickers<S: AsRef<str>>(mut self, tickers: &[S]) -> Self {
        self.tickers = tickers
            .iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .collect();
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_auto_adjust(mut self, auto_adjust: bool) -> Self {
        self.auto_adjust = auto_adjust;
        self
    }

    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_read_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.read_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_plot_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.plot_dir = dir.as_ref().to_path_buf();
        self
    }

    /// 同时设置写入与读取目录
    pub fn with_data_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        self.with_output_dir(&dir).with_read_dir(&dir)
    }

    pub fn with_anchor_time(mut self, anchor: NaiveTime) -> Self {
        self.anchor_time = anchor;
        self
    }

    /// Parse an `HH:MM` anchor such as `14:30`.
    pub fn with_anchor_str(self, anchor: &str) -> Result<Self> {
        let anchor = NaiveTime::parse_from_str(anchor.trim(), "%H:%M")?;
        Ok(self.with_anchor_time(anchor))
    }

    pub fn with_display_timezone(mut self, tz: Tz) -> Self {
        self.display_timezone = tz;
        self
    }

    pub fn with_timezone_str(self, name: &str) -> Result<Self> {
        let tz: Tz = name
            .trim()
            .parse()
            .map_err(|e| SnapshotError::ConfigError(format!("Unknown timezone {}: {}", name, e)))?;
        Ok(self.with_display_timezone(tz))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(SnapshotError::ConfigError("Ticker list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for ticker in &self.tickers {
            if ticker.is_empty() {
                return Err(SnapshotError::ConfigError("Ticker list contains an empty symbol".to_string()));
            }
            if !seen.insert(ticker.as_str()) {
                return Err(SnapshotError::ConfigError(format!("Duplicate ticker: {}", ticker)));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
