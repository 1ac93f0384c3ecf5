use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SnapshotError};

/// 单个代码的数据维度，顺序与数据源返回的列顺序一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    AdjClose,
    Close,
    High,
    Low,
    Open,
    Volume,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::AdjClose,
        Field::Close,
        Field::High,
        Field::Low,
        Field::Open,
        Field::Volume,
    ];

    /// CSV 表头中使用的标签
    pub fn label(&self) -> &'static str {
        match self {
            Field::AdjClose => "Adj Close",
            Field::Close => "Close",
            Field::High => "High",
            Field::Low => "Low",
            Field::Open => "Open",
            Field::Volume => "Volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Field {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .iter()
            .find(|field| field.label() == s.trim())
            .copied()
            .ok_or_else(|| SnapshotError::DataError(format!("Unknown field: {}", s)))
    }
}

/// (Field, Ticker) 列标识
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub field: Field,
    pub ticker: String,
}

impl ColumnKey {
    pub fn new(field: Field, ticker: impl Into<String>) -> Self {
        Self {
            field,
            ticker: ticker.into(),
        }
    }
}

/// One downloaded batch of price/volume data for all tracked tickers.
///
/// Every column is aligned to `index`, which is strictly increasing.
/// Missing cells (a ticker that did not trade in a period) are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    index: Vec<DateTime<Utc>>,
    columns: BTreeMap<ColumnKey, Vec<Option<f64>>>,
}

impl Snapshot {
    pub fn new(
        index: Vec<DateTime<Utc>>,
        columns: BTreeMap<ColumnKey, Vec<Option<f64>>>,
    ) -> Result<Self> {
        if let Some(pos) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SnapshotError::DataError(format!(
                "Row index not strictly increasing at row {} ({} >= {})",
                pos + 1,
                index[pos],
                index[pos + 1]
            )));
        }

        for (key, values) in &columns {
            if values.len() != index.len() {
                return Err(SnapshotError::DataError(format!(
                    "Column ({}, {}) has {} values, expected {}",
                    key.field,
                    key.ticker,
                    values.len(),
                    index.len()
                )));
            }
        }

        Ok(Self { index, columns })
    }

    pub fn empty() -> Self {
        Self {
            index: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &BTreeMap<ColumnKey, Vec<Option<f64>>> {
        &self.columns
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    pub fn column(&self, field: Field, ticker: &str) -> Option<&[Option<f64>]> {
        self.columns
            .get(&ColumnKey::new(field, ticker))
            .map(|values| values.as_slice())
    }

    /// 某个字段下所有代码的列，按代码排序
    pub fn field_columns(&self, field: Field) -> Vec<(&str, &[Option<f64>])> {
        self.columns
            .iter()
            .filter(|(key, _)| key.field == field)
            .map(|(key, values)| (key.ticker.as_str(), values.as_slice()))
            .collect()
    }

    pub fn fields(&self) -> Vec<Field> {
        let mut fields: Vec<Field> = self.columns.keys().map(|key| key.field).collect();
        fields.dedup();
        fields
    }

    pub fn tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.columns.keys().map(|key| key.ticker.as_str()).collect();
        tickers.sort_unstable();
        tickers.dedup();
        tickers
    }

    /// 前 n 行，用于日志预览
    pub fn head(&self, n: usize) -> Snapshot {
        let n = n.min(self.len());
        Snapshot {
            index: self.index[..n].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(key, values)| (key.clone(), values[..n].to_vec()))
                .collect(),
        }
    }

    /// 以 index 为键的外连接合并，用于把逐个代码下载的数据拼成一张表
    pub fn outer_join(self, other: Snapshot) -> Snapshot {
        if self.is_empty() && self.columns.is_empty() {
            return other;
        }

        let mut index: Vec<DateTime<Utc>> = self.index.iter().chain(other.index.iter()).copied().collect();
        index.sort_unstable();
        index.dedup();

        let mut columns = BTreeMap::new();
        for part in [self, other] {
            for (key, values) in part.columns {
                let mut aligned = vec![None; index.len()];
                for (ts, value) in part.index.iter().zip(values) {
                    // index 已排序去重，二分查找一定命中
                    if let Ok(pos) = index.binary_search(ts) {
                        aligned[pos] = value;
                    }
                }
                columns.insert(key, aligned);
            }
        }

        Snapshot { index, columns }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<26}", "Datetime")?;
        for key in self.columns.keys() {
            write!(f, " {:>14}", format!("{}/{}", key.field, key.ticker))?;
        }
        writeln!(f)?;
        for (row, ts) in self.index.iter().enumerate() {
            write!(f, "{:<26}", ts.format("%Y-%m-%d %H:%M:%S%:z"))?;
            for values in self.columns.values() {
                match values[row] {
                    Some(v) => write!(f, " {:>14.2}", v)?,
                    None => write!(f, " {:>14}", "NaN")?,
                }
            }
            writeln!(f)?;
        }
        write!(f, "[{} rows x {} columns]", self.len(), self.columns.len())
    }
}
