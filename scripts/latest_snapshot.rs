use std::env;
use std::error::Error;
use std::path::Path;

use market_snapshot::util::csv_utils;
use market_snapshot::{SnapshotError, SnapshotProvider};

fn main() -> Result<(), Box<dyn Error>> {
    // 默认读取 data/ 目录，可通过第一个参数覆盖
    let dir = env::args().nth(1).unwrap_or_else(|| "data/".to_string());
    let dir = Path::new(&dir);
    if !dir.is_dir() {
        return Err(format!("目录 {} 不存在，请先运行 'cargo run -- ingest'", dir.display()).into());
    }

    let provider = SnapshotProvider::new(dir);
    let loaded = match provider.load_latest() {
        Ok(loaded) => loaded,
        Err(SnapshotError::NoSnapshot { .. }) => {
            println!("未找到有效的快照文件");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("最新快照: {}", loaded.label);

    let snapshot = &loaded.snapshot;
    match (snapshot.index().first(), snapshot.index().last()) {
        (Some(first), Some(last)) => {
            println!(
                "时间范围: {} -> {}",
                csv_utils::format_timestamp(first),
                csv_utils::format_timestamp(last)
            );
        }
        _ => println!("快照为空"),
    }
    println!("行数: {}", snapshot.len());
    println!("代码: {}", snapshot.tickers().join(","));

    Ok(())
}
