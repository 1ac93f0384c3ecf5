//! Positional x-axis tick layout for snapshot charts.
//!
//! Rows are plotted at their position (0, 1, 2, ...) rather than at their
//! timestamp, so overnight and weekend gaps collapse. Major ticks sit on
//! rows whose local time-of-day equals the anchor (market open) and carry a
//! `day-Mon` label; minor ticks sit on every row and carry `HH:MM`.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub position: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickLayout {
    positions: Vec<f64>,
    major: Vec<Tick>,
    minor: Vec<Tick>,
}

impl TickLayout {
    pub fn compute(index: &[DateTime<Utc>], anchor: NaiveTime, tz: Tz) -> Self {
        let mut major = Vec::new();
        let mut minor = Vec::with_capacity(index.len());

        for (position, ts) in index.iter().enumerate() {
            let local = ts.with_timezone(&tz);
            if local.time() == anchor {
                // 日期不补零，例如 2-Jan
                major.push(Tick {
                    position,
                    label: format!("{}-{}", local.day(), local.format("%b")),
                });
            }
            minor.push(Tick {
                position,
                label: local.format("%H:%M").to_string(),
            });
        }

        Self {
            positions: (0..index.len()).map(|i| i as f64).collect(),
            major,
            minor,
        }
    }

    /// x coordinate of every row, independent of timestamp deltas
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn major(&self) -> &[Tick] {
        &self.major
    }

    pub fn minor(&self) -> &[Tick] {
        &self.minor
    }

    pub fn major_positions(&self) -> Vec<f64> {
        self.major.iter().map(|t| t.position as f64).collect()
    }

    pub fn minor_positions(&self) -> Vec<f64> {
        self.minor.iter().map(|t| t.position as f64).collect()
    }

    pub fn major_label(&self, x: f64) -> String {
        Self::label_at(&self.major, x)
    }

    pub fn minor_label(&self, x: f64) -> String {
        Self::label_at(&self.minor, x)
    }

    fn label_at(ticks: &[Tick], x: f64) -> String {
        let x = x.round();
        if !x.is_finite() || x < 0.0 {
            return String::new();
        }
        let position = x as usize;
        ticks
            .iter()
            .find(|t| t.position == position)
            .map(|t| t.label.clone())
            .unwrap_or_default()
    }
}
