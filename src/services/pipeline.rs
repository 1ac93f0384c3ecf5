use crate::models::snapshot::Snapshot;
use crate::scrapers::base::{DownloadRequest, PriceScraper};
use crate::errors::Result;
use crate::config::Config;
use crate::data_provider::SnapshotProvider;
use crate::chart::{self, ChartOptions};
use crate::util::{self, csv_utils};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 管道服务：下载并保存快照，读取最新快照并绘图
pub struct PipelineService {
    config: Config,
    scraper: Arc<dyn PriceScraper + Send + Sync>,
}

impl PipelineService {
    /// 创建新的管道服务实例
    pub fn new(config: Config, scraper: Arc<dyn PriceScraper + Send + Sync>) -> Self {
        Self { config, scraper }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 构造下载请求
    pub fn download_request(&self) -> DownloadRequest {
        DownloadRequest {
            tickers: self.config.tickers.clone(),
            period: self.config.period,
            interval: self.config.interval,
            auto_adjust: self.config.auto_adjust,
        }
    }

    /// 一次性下载所有代码的数据
    pub async fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.config.validate()?;

        let request = self.download_request();
        let snapshot = self.scraper.download(&request).await?;

        if snapshot.is_empty() {
            warn!("{} returned no rows for {:?}", self.scraper.source_name(), request.tickers);
        }
        debug!("Downloaded snapshot head:\n{}", snapshot.head(5));
        Ok(snapshot)
    }

    /// Ingest-and-save: ensure the output directory, download, write
    /// `<output_dir>/<YYYYMMDD-HHMMSS>.csv`. Returns the written path.
    pub async fn ingest_and_save(&self) -> Result<PathBuf> {
        util::check_directory(&self.config.output_dir)?;

        let snapshot = self.fetch_snapshot().await?;
        let path = write_snapshot(&snapshot, &self.config.output_dir)?;

        info!("Data written to {}", path.display());
        Ok(path)
    }

    /// Load-and-render: pick the newest snapshot in `read_dir`, read it and
    /// draw `<plot_dir>/<label>.png`. Returns the chart path.
    pub fn load_and_render(&self) -> Result<PathBuf> {
        util::check_directory(&self.config.read_dir)?;

        let provider = SnapshotProvider::new(&self.config.read_dir);
        let loaded = provider.load_latest()?;

        util::check_directory(&self.config.plot_dir)?;
        chart::make_png_from_snapshot(
            &loaded.snapshot,
            &loaded.label,
            &self.config.plot_dir,
            &ChartOptions::from(&self.config),
        )
    }

    /// 依次执行下载和绘图
    pub async fn run_all(&self) -> Result<()> {
        self.ingest_and_save().await?;
        self.load_and_render()?;
        Ok(())
    }

    /// 读取目录中现有的快照文件名（升序）
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        util::check_directory(&self.config.read_dir)?;
        SnapshotProvider::new(&self.config.read_dir).list_snapshots()
    }
}

/// 以当前时刻命名并写入快照；同一秒内再次写入会覆盖
pub fn write_snapshot(snapshot: &Snapshot, output_dir: &Path) -> Result<PathBuf> {
    let filename = util::snapshot_filename_from_now();
    let path = output_dir.join(filename);
    csv_utils::save_snapshot_to_csv(snapshot, &path)?;
    Ok(path)
}
