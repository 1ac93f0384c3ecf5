use chrono::{DateTime, Local, TimeZone};
use log::info;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use crate::errors::Result;

/// 检查目录是否存在，不存在则创建（包括父目录）
/// 返回是否新建了目录
pub fn check_directory<P: AsRef<Path>>(dir: P) -> Result<bool> {
    let dir = dir.as_ref();
    if dir.is_dir() {
        info!("Directory exists at {}", dir.display());
        return Ok(false);
    }

    fs::create_dir_all(dir)?;
    info!("Created directory at {}", dir.display());
    Ok(true)
}

/// 由给定时刻生成快照文件名，格式 YYYYMMDD-HHMMSS.csv
pub fn snapshot_filename<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.format("%Y%m%d-%H%M%S.csv").to_string()
}

/// Snapshot filename for the current local wall-clock instant.
/// Two calls within the same second produce the same name.
pub fn snapshot_filename_from_now() -> String {
    let now = Local::now();
    info!("Current date and time are {}.", now);

    let filename = snapshot_filename(&now);
    info!("Generated CSV filename is {}.", filename);
    filename
}

/// 去掉文件扩展名，得到图表标签（文件名中的时间戳）
/// 从右侧按 "." 最多切两次，取最左边的部分
pub fn remove_filename_extension(filename: &str) -> &str {
    filename.rsplitn(3, '.').last().unwrap_or(filename)
}

// CSV 快照读写工具
pub mod csv_utils {
    use super::*;
    use crate::errors::SnapshotError;
    use crate::models::snapshot::{ColumnKey, Field, Snapshot};
    use chrono::{NaiveDate, NaiveDateTime, Utc};
    use csv::{ReaderBuilder, StringRecord, WriterBuilder};
    use log::debug;
    use std::collections::BTreeMap;
    use std::fs::File;

    pub const FIELD_HEADER: &str = "Price";
    pub const TICKER_HEADER: &str = "Ticker";
    const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
    // pandas 写出的索引名行
    const INDEX_NAMES: [&str; 3] = ["Datetime", "Date", ""];

    pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// 解析索引列时间戳，统一转换为 UTC
    /// 支持带偏移量、RFC 3339、无时区（按 UTC 处理）以及纯日期
    pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
            return Some(ts.with_timezone(&Utc));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Some(ts.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    fn format_value(value: Option<f64>) -> String {
        match value {
            Some(v) if v.is_finite() => v.to_string(),
            _ => String::new(),
        }
    }

    /// 将快照保存为双行表头的 CSV 文件
    pub fn save_snapshot_to_csv<P: AsRef<Path>>(snapshot: &Snapshot, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(
            "Saving {} rows x {} columns to {}",
            snapshot.len(),
            snapshot.columns().len(),
            path.display()
        );

        let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;

        let mut field_row = vec![FIELD_HEADER.to_string()];
        let mut ticker_row = vec![TICKER_HEADER.to_string()];
        for key in snapshot.column_keys() {
            field_row.push(key.field.label().to_string());
            ticker_row.push(key.ticker.clone());
        }
        writer.write_record(&field_row)?;
        writer.write_record(&ticker_row)?;

        for (row, ts) in snapshot.index().iter().enumerate() {
            let mut record = Vec::with_capacity(snapshot.columns().len() + 1);
            record.push(format_timestamp(ts));
            for values in snapshot.columns().values() {
                record.push(format_value(values[row]));
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// 从 CSV 文件读取快照
    pub fn read_snapshot_from_csv<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(false).from_reader(file);

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SnapshotError::corrupt(path, e.to_string()))?;
            records.push(record);
        }

        let snapshot = parse_snapshot_records(&records)
            .map_err(|reason| SnapshotError::corrupt(path, reason))?;

        info!("Read in: {}", path.display());
        debug!("{} rows, tickers {:?}", snapshot.len(), snapshot.tickers());
        Ok(snapshot)
    }

    fn parse_snapshot_records(records: &[StringRecord]) -> std::result::Result<Snapshot, String> {
        if records.len() < 2 {
            return Err(format!("expected two header rows, found {}", records.len()));
        }

        let field_row = &records[0];
        let ticker_row = &records[1];
        let width = field_row.len();
        if width < 2 {
            return Err("header has no (field, ticker) columns".to_string());
        }

        // 第二行必须是代码行，而不是数据行
        let ticker_label = ticker_row[0].trim();
        if !(ticker_label == TICKER_HEADER || ticker_label.is_empty()) {
            return Err(format!(
                "second header row must start with {:?} or be blank, found {:?}",
                TICKER_HEADER, ticker_label
            ));
        }

        let mut keys = Vec::with_capacity(width.saturating_sub(1));
        for col in 1..width {
            let field: Field = field_row[col]
                .parse()
                .map_err(|_| format!("unknown field label {:?} in column {}", &field_row[col], col))?;
            let ticker = ticker_row[col].trim();
            if ticker.is_empty() {
                return Err(format!("missing ticker label in column {}", col));
            }
            if ticker.parse::<f64>().is_ok() {
                return Err(format!("numeric ticker label {:?} in column {}", ticker, col));
            }
            keys.push(ColumnKey::new(field, ticker));
        }

        let mut data_start = 2;
        // pandas 会额外写一行索引名（如 "Datetime,,,"），跳过
        if let Some(row) = records.get(2) {
            let only_name = row.iter().skip(1).all(|cell| cell.trim().is_empty());
            if only_name && INDEX_NAMES.contains(&row[0].trim()) {
                data_start = 3;
            }
        }

        let rows = &records[data_start..];
        let mut index = Vec::with_capacity(rows.len());
        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows.len()); keys.len()];

        for (offset, row) in rows.iter().enumerate() {
            let line = data_start + offset + 1;
            let ts = parse_timestamp(&row[0])
                .ok_or_else(|| format!("unparseable timestamp {:?} on line {}", &row[0], line))?;
            index.push(ts);

            for (col, values) in columns.iter_mut().enumerate() {
                let cell = row[col + 1].trim();
                let value = if cell.is_empty() {
                    None
                } else {
                    let v: f64 = cell
                        .parse()
                        .map_err(|_| format!("non-numeric value {:?} on line {}", cell, line))?;
                    if v.is_nan() { None } else { Some(v) }
                };
                values.push(value);
            }
        }

        let mut table = BTreeMap::new();
        for (key, values) in keys.into_iter().zip(columns) {
            let description = format!("({}, {})", key.field, key.ticker);
            if table.insert(key, values).is_some() {
                return Err(format!("duplicate column {}", description));
            }
        }

        Snapshot::new(index, table).map_err(|e| e.to_string())
    }
}
