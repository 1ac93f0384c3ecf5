use crate::models::snapshot::{ColumnKey, Field, Snapshot};
use crate::errors::{Result, SnapshotError};
use crate::scrapers::base::{DownloadRequest, PriceScraper};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use log::{debug, info, warn};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance 图表接口抓取器
pub struct YahooScraper {
    client: Client,
    last_request: Mutex<Option<Instant>>,
}

impl YahooScraper {
    /// 创建新的 Yahoo 数据抓取器
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SnapshotError::RequestError(e))?;

        Ok(Self {
            client,
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&self) {
        const MIN_INTERVAL: Duration = Duration::from_millis(250);

        let now = Instant::now();
        let should_wait = {
            let mut last = match self.last_request.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let should_wait = last
                .map(|instant| instant.elapsed())
                .filter(|elapsed| *elapsed < MIN_INTERVAL)
                .map(|elapsed| MIN_INTERVAL - elapsed);
            *last = Some(now);
            should_wait
        };

        if let Some(wait_time) = should_wait {
            debug!("Waiting {:?} between chart requests", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    async fn fetch_ticker(&self, ticker: &str, request: &DownloadRequest) -> Result<Snapshot> {
        debug!("Fetching {} ({} @ {})", ticker, request.period, request.interval);

        self.wait_for_rate_limit().await;

        let response = self.client
            .get(format!("{}/{}", CHART_URL, ticker))
            .query(&[
                ("range", request.period.as_token()),
                ("interval", request.interval.as_token()),
                ("includeAdjustedClose", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(SnapshotError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SnapshotError::InvalidTicker(ticker.to_string()));
        }
        if status.is_server_error() {
            return Err(SnapshotError::ProviderUnavailable(format!("HTTP {} for {}", status, ticker)));
        }
        if !status.is_success() {
            return Err(SnapshotError::ProviderResponse(format!("HTTP {} for {}", status, ticker)));
        }

        let text = response.text().await?;
        let chart: ChartResponse = serde_json::from_str(&text)?;
        parse_chart(ticker, chart, request.auto_adjust)
    }
}

#[async_trait]
impl PriceScraper for YahooScraper {
    fn source_name(&self) -> &'static str {
        "Yahoo Finance"
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Snapshot> {
        info!(
            "Downloading {} tickers from {} (period={}, interval={}, auto_adjust={})",
            request.tickers.len(),
            self.source_name(),
            request.period,
            request.interval,
            request.auto_adjust
        );

        let mut snapshot = Snapshot::empty();
        for ticker in &request.tickers {
            let part = match self.fetch_ticker(ticker, request).await {
                Ok(part) => part,
                Err(e) => {
                    warn!("Download of {} failed (transient: {}): {}", ticker, e.is_transient(), e);
                    return Err(e);
                }
            };
            debug!("{}: {} rows", ticker, part.len());
            snapshot = snapshot.outer_join(part);
        }

        info!("Downloaded {} rows for {:?}", snapshot.len(), snapshot.tickers());
        Ok(snapshot)
    }
}

/// Retry-After 可能是秒数，也可能是 HTTP 日期
fn parse_retry_after(value: &str) -> Option<u64> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(secs);
    }
    let when = httpdate::parse_http_date(value.trim()).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .map(|d| d.as_secs())
            .unwrap_or(0),
    )
}

/// 将单个代码的图表响应解析为快照
fn parse_chart(ticker: &str, resp: ChartResponse, auto_adjust: bool) -> Result<Snapshot> {
    let result = match resp.chart.result {
        Some(result) => result,
        None => {
            return Err(match resp.chart.error {
                Some(err) if err.code == "Not Found" => SnapshotError::InvalidTicker(ticker.to_string()),
                Some(err) => SnapshotError::ProviderResponse(format!(
                    "{}: {}",
                    err.code,
                    err.description.unwrap_or_default()
                )),
                None => SnapshotError::ProviderResponse("empty result with no error".to_string()),
            })
        }
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| SnapshotError::ProviderResponse(format!("no chart data for {}", ticker)))?;

    // 停牌或窗口内无交易时没有 timestamp
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let cell = |values: &Vec<Option<f64>>, i: usize| values.get(i).copied().flatten().filter(|v| v.is_finite());

    let mut index: Vec<DateTime<Utc>> = Vec::with_capacity(timestamps.len());
    let mut rows: BTreeMap<Field, Vec<Option<f64>>> = BTreeMap::new();

    for (i, &ts) in timestamps.iter().enumerate() {
        let mut open = cell(&quote.open, i);
        let mut high = cell(&quote.high, i);
        let mut low = cell(&quote.low, i);
        let mut close = cell(&quote.close, i);
        let volume = cell(&quote.volume, i);
        let adj_close = adj_closes.as_ref().and_then(|v| cell(v, i));

        // 跳过全部为空的行（非交易时段）
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none() {
            continue;
        }

        let time = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| SnapshotError::ProviderResponse(format!("invalid timestamp: {}", ts)))?;

        let repeated = match index.last() {
            Some(last) if *last > time => {
                debug!("{}: dropping out-of-order row at {}", ticker, time);
                continue;
            }
            Some(last) => *last == time,
            None => false,
        };

        // 没有复权收盘价的行不能复权，价格置空，避免同一列混入未复权数据
        if auto_adjust && adj_closes.is_some() {
            match (adj_close, close) {
                (Some(adj), Some(c)) if c != 0.0 => {
                    let factor = adj / c;
                    open = open.map(|v| v * factor);
                    high = high.map(|v| v * factor);
                    low = low.map(|v| v * factor);
                    close = Some(adj);
                }
                _ => {
                    open = None;
                    high = None;
                    low = None;
                    close = None;
                }
            }
        }

        // 盘中实时K线与上一行时间相同，以最新一行为准
        if repeated {
            debug!("{}: replacing row at {} with the live bar", ticker, time);
            index.pop();
            for values in rows.values_mut() {
                values.pop();
            }
        }

        index.push(time);
        rows.entry(Field::Open).or_default().push(open);
        rows.entry(Field::High).or_default().push(high);
        rows.entry(Field::Low).or_default().push(low);
        rows.entry(Field::Close).or_default().push(close);
        rows.entry(Field::Volume).or_default().push(volume);
        if !auto_adjust && adj_closes.is_some() {
            rows.entry(Field::AdjClose).or_default().push(adj_close);
        }
    }

    if index.is_empty() {
        return Err(SnapshotError::ProviderResponse(format!("no price data returned for {}", ticker)));
    }

    let columns = rows
        .into_iter()
        .map(|(field, values)| (ColumnKey::new(field, ticker), values))
        .collect();

    Snapshot::new(index, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-01-02 14:30 UTC 起的三根小时线，中间一行全空，最后一根重复出现
    const CHART_JSON: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704205800, 1704209400, 1704213000, 1704213000],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, null, 102.0, 102.5],
                        "high":   [101.0, null, 103.0, 103.5],
                        "low":    [99.0,  null, 101.0, 101.5],
                        "close":  [100.0, null, 102.0, 102.5],
                        "volume": [1000,  null, 3000,  3500]
                    }],
                    "adjclose": [{ "adjclose": [50.0, null, 51.0, 51.25] }]
                }
            }],
            "error": null
        }
    }"#;

    fn chart() -> ChartResponse {
        serde_json::from_str(CHART_JSON).unwrap()
    }

    #[test]
    fn parses_rows_skips_empty_periods_and_keeps_live_bar() {
        let snapshot = parse_chart("AAPL", chart(), false).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.index()[0], Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap());
        assert_eq!(snapshot.index()[1], Utc.with_ymd_and_hms(2024, 1, 2, 16, 30, 0).unwrap());
        // 重复时间戳取最后一行（实时K线）
        assert_eq!(snapshot.column(Field::Close, "AAPL").unwrap(), &[Some(100.0), Some(102.5)]);
        assert_eq!(snapshot.column(Field::Volume, "AAPL").unwrap(), &[Some(1000.0), Some(3500.0)]);
        assert_eq!(snapshot.column(Field::AdjClose, "AAPL").unwrap(), &[Some(50.0), Some(51.25)]);
    }

    #[test]
    fn auto_adjust_scales_prices_and_drops_adj_close() {
        let snapshot = parse_chart("AAPL", chart(), true).unwrap();

        assert_eq!(snapshot.fields(), vec![Field::Close, Field::High, Field::Low, Field::Open, Field::Volume]);
        assert_eq!(snapshot.column(Field::Close, "AAPL").unwrap(), &[Some(50.0), Some(51.25)]);
        assert_eq!(snapshot.column(Field::Open, "AAPL").unwrap(), &[Some(50.0), Some(51.25)]);
        assert_eq!(snapshot.column(Field::High, "AAPL").unwrap(), &[Some(50.5), Some(51.75)]);
        // 成交量不做复权
        assert_eq!(snapshot.column(Field::Volume, "AAPL").unwrap(), &[Some(1000.0), Some(3500.0)]);
    }

    #[test]
    fn auto_adjust_blanks_prices_without_adjusted_close() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{
                "timestamp": [1704205800, 1704209400],
                "indicators": {
                    "quote": [{
                        "open": [100.0, 102.0], "high": [101.0, 103.0], "low": [99.0, 101.0],
                        "close": [100.0, 102.0], "volume": [1000, 2000]
                    }],
                    "adjclose": [{ "adjclose": [50.0, null] }]
                }
            }],"error":null}}"#,
        )
        .unwrap();

        let snapshot = parse_chart("AAPL", resp, true).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.column(Field::Close, "AAPL").unwrap(), &[Some(50.0), None]);
        assert_eq!(snapshot.column(Field::Open, "AAPL").unwrap(), &[Some(50.0), None]);
        assert_eq!(snapshot.column(Field::Volume, "AAPL").unwrap(), &[Some(1000.0), Some(2000.0)]);

        // 完全没有复权数据时保留原始价格
        let raw: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{
                "timestamp": [1704205800],
                "indicators": {"quote": [{"close": [100.0], "volume": [1000]}]}
            }],"error":null}}"#,
        )
        .unwrap();
        let snapshot = parse_chart("AAPL", raw, true).unwrap();
        assert_eq!(snapshot.column(Field::Close, "AAPL").unwrap(), &[Some(100.0)]);
    }

    #[test]
    fn not_found_is_invalid_ticker() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .unwrap();
        let err = parse_chart("ZZZZ", resp, true).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidTicker(ref t) if t == "ZZZZ"));
        assert!(!err.is_transient());
    }

    #[test]
    fn other_provider_errors_are_response_errors() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input - interval=1h is not supported"}}}"#,
        )
        .unwrap();
        assert!(matches!(parse_chart("AAPL", resp, true), Err(SnapshotError::ProviderResponse(_))));
    }

    #[test]
    fn result_without_timestamps_is_an_error() {
        let resp: ChartResponse = serde_json::from_str(
            r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();
        assert!(matches!(parse_chart("AAPL", resp, true), Err(SnapshotError::ProviderResponse(_))));
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        assert_eq!(parse_retry_after("120"), Some(120));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), Some(0));
        assert_eq!(parse_retry_after("soon"), None);
    }
}
