use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::tempdir;

use market_snapshot::chart::ticks::TickLayout;
use market_snapshot::chart::{make_png_from_snapshot, ChartOptions};
use market_snapshot::scrapers::base::{DownloadRequest, PriceScraper};
use market_snapshot::util::csv_utils;
use market_snapshot::{ColumnKey, Config, Field, PipelineService, Result, Snapshot, SnapshotProvider};

/// Two trading days of hourly bars (14:30-20:30 UTC) with the night in between.
fn hourly_index() -> Vec<DateTime<Utc>> {
    let mut index = Vec::new();
    for day in [2, 3] {
        for hour in 14..=20 {
            index.push(Utc.with_ymd_and_hms(2024, 1, day, hour, 30, 0).unwrap());
        }
    }
    index
}

struct FixtureScraper;

#[async_trait]
impl PriceScraper for FixtureScraper {
    fn source_name(&self) -> &'static str {
        "fixture"
    }

    async fn download(&self, request: &DownloadRequest) -> Result<Snapshot> {
        let index = hourly_index();
        let rows = index.len();
        let mut columns = BTreeMap::new();
        for (i, ticker) in request.tickers.iter().enumerate() {
            let base = 100.0 * (i + 1) as f64;
            let closes = (0..rows)
                .map(|r| if r == 3 && i == 0 { None } else { Some(base + r as f64) })
                .collect();
            let volumes = (0..rows).map(|r| Some(1000.0 * (r + 1) as f64)).collect();
            columns.insert(ColumnKey::new(Field::Close, ticker.as_str()), closes);
            columns.insert(ColumnKey::new(Field::Volume, ticker.as_str()), volumes);
        }
        Snapshot::new(index, columns)
    }
}

#[tokio::test]
async fn ingest_then_render_produces_labelled_png() {
    let tmp = tempdir().unwrap();
    let config = Config::new()
        .with_tickers(&["AAPL", "META"])
        .with_data_dir(tmp.path().join("data"))
        .with_plot_dir(tmp.path().join("plots"));
    let service = PipelineService::new(config, Arc::new(FixtureScraper));

    let csv_path = service.ingest_and_save().await.unwrap();
    let filename = csv_path.file_name().unwrap().to_str().unwrap().to_string();
    let label = filename.trim_end_matches(".csv");

    let png = service.load_and_render().unwrap();

    assert_eq!(png, tmp.path().join("plots").join(format!("{}.png", label)));
    let bytes = fs::read(&png).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(service.list_snapshots().unwrap(), vec![filename]);
}

#[tokio::test]
async fn saved_snapshot_reads_back_unchanged() {
    let tmp = tempdir().unwrap();
    let config = Config::new().with_tickers(&["AAPL", "GOOG"]).with_data_dir(tmp.path());
    let service = PipelineService::new(config, Arc::new(FixtureScraper));

    let expected = service.fetch_snapshot().await.unwrap();
    let path = service.ingest_and_save().await.unwrap();

    let loaded = csv_utils::read_snapshot_from_csv(&path).unwrap();
    assert_eq!(loaded, expected);
    assert_eq!(loaded.column(Field::Close, "AAPL").unwrap()[3], None);
}

#[test]
fn render_picks_newest_snapshot_and_overwrites_existing_png() {
    let tmp = tempdir().unwrap();
    let data = tmp.path().join("data");
    let plots = tmp.path().join("plots");
    fs::create_dir_all(&data).unwrap();

    let body = "Price,Close,Volume\nTicker,AAPL,AAPL\n\
                2024-01-02 14:30:00+00:00,185.5,1000\n\
                2024-01-02 15:30:00+00:00,186,1200\n";
    fs::write(data.join("20240101-235900.csv"), body).unwrap();
    fs::write(data.join("20240102-000100.csv"), body).unwrap();
    fs::write(data.join("20991231-235959.csv.bak"), "garbage").unwrap();

    fs::create_dir_all(&plots).unwrap();
    fs::write(plots.join("20240102-000100.png"), b"stale").unwrap();

    let config = Config::new().with_data_dir(&data).with_plot_dir(&plots);
    let service = PipelineService::new(config, Arc::new(FixtureScraper));
    let png = service.load_and_render().unwrap();

    assert_eq!(png, plots.join("20240102-000100.png"));
    assert!(fs::read(&png).unwrap().starts_with(b"\x89PNG"));
}

#[test]
fn overnight_gap_collapses_to_adjacent_positions() {
    let index = hourly_index();
    let layout = TickLayout::compute(&index, NaiveTime::from_hms_opt(14, 30, 0).unwrap(), Tz::UTC);

    // 20:30 on the 2nd and 14:30 on the 3rd are 18 hours apart but one slot apart
    assert_eq!(layout.positions()[7] - layout.positions()[6], 1.0);
    assert_eq!(layout.major_positions(), vec![0.0, 7.0]);
    assert_eq!(layout.major_label(7.0), "3-Jan");
}

#[test]
fn chart_without_anchor_rows_still_renders() {
    let tmp = tempdir().unwrap();
    let index = vec![
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 16, 0, 0).unwrap(),
    ];
    let mut columns = BTreeMap::new();
    columns.insert(ColumnKey::new(Field::Close, "NFLX"), vec![Some(480.0), Some(482.5)]);
    columns.insert(ColumnKey::new(Field::Volume, "NFLX"), vec![Some(5000.0), None]);
    let snapshot = Snapshot::new(index, columns).unwrap();

    let png = make_png_from_snapshot(&snapshot, "20240102-160000", tmp.path(), &ChartOptions::default()).unwrap();
    assert!(png.is_file());
}

#[test]
fn provider_ignores_unrelated_files() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("notes.csv"), "x").unwrap();

    let provider = SnapshotProvider::new(tmp.path());
    assert!(provider.list_snapshots().unwrap().is_empty());
    assert!(provider.load_latest().is_err());
}
