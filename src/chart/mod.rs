pub mod ticks;

use chrono::NaiveTime;
use chrono_tz::Tz;
use log::info;
use plotters::coord::ranged1d::{DefaultFormatting, KeyPointHint};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use std::fmt::Display;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::{Result, SnapshotError};
use crate::models::snapshot::{Field, Snapshot};
use ticks::TickLayout;

/// 图表外观参数
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub anchor_time: NaiveTime,
    pub timezone: Tz,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            anchor_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or_default(),
            timezone: Tz::UTC,
            width: 1200,
            height: 800,
        }
    }
}

impl From<&Config> for ChartOptions {
    fn from(config: &Config) -> Self {
        Self {
            anchor_time: config.anchor_time,
            timezone: config.display_timezone,
            ..Self::default()
        }
    }
}

/// 位置坐标轴：刻度只出现在给定的行位置上，不生成细网格
#[derive(Clone)]
struct PositionAxis {
    inner: RangedCoordf64,
    ticks: Vec<f64>,
}

impl PositionAxis {
    fn new(rows: usize, ticks: Vec<f64>) -> Self {
        Self {
            inner: RangedCoordf64::from(-0.5..(rows.max(1) as f64 - 0.5)),
            ticks,
        }
    }
}

impl Ranged for PositionAxis {
    type FormatOption = DefaultFormatting;
    type ValueType = f64;

    fn map(&self, value: &f64, limit: (i32, i32)) -> i32 {
        self.inner.map(value, limit)
    }

    fn key_points<Hint: KeyPointHint>(&self, hint: Hint) -> Vec<f64> {
        if hint.weight().allow_light_points() {
            Vec::new()
        } else {
            self.ticks.clone()
        }
    }

    fn range(&self) -> Range<f64> {
        self.inner.range()
    }
}

fn render_err<E: Display>(e: E) -> SnapshotError {
    SnapshotError::RenderError(e.to_string())
}

/// 价格坐标范围，留 5% 边距
fn price_bounds(columns: &[(&str, &[Option<f64>])]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in columns.iter().flat_map(|(_, values)| values.iter().flatten()) {
        min = min.min(*v);
        max = max.max(*v);
    }

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// 堆叠后的最大成交量
fn stacked_volume_max(columns: &[(&str, &[Option<f64>])], rows: usize) -> f64 {
    let max = (0..rows)
        .map(|row| {
            columns
                .iter()
                .filter_map(|(_, values)| values[row])
                .filter(|v| *v > 0.0)
                .sum::<f64>()
        })
        .fold(0.0, f64::max);

    if max > 0.0 { max * 1.05 } else { 1.0 }
}

/// 把一列收盘价切成连续的非空片段，缺失值处断开折线
fn line_segments(values: &[Option<f64>], positions: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (value, x) in values.iter().zip(positions) {
        match value {
            Some(v) => current.push((*x, *v)),
            None => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Render close prices (top) and stacked volume (bottom) into
/// `<output_dir>/<label>.png`, overwriting any existing file.
pub fn make_png_from_snapshot(
    snapshot: &Snapshot,
    label: &str,
    output_dir: &Path,
    options: &ChartOptions,
) -> Result<PathBuf> {
    let path = output_dir.join(format!("{}.png", label));
    draw_chart(snapshot, label, &path, options)?;
    info!("Plot created at {}", path.display());
    Ok(path)
}

fn draw_chart(snapshot: &Snapshot, label: &str, path: &Path, options: &ChartOptions) -> Result<()> {
    let layout = TickLayout::compute(snapshot.index(), options.anchor_time, options.timezone);
    let rows = snapshot.len();

    let tickers = snapshot.tickers();
    let color_of = |ticker: &str| -> RGBAColor {
        let idx = tickers.iter().position(|t| *t == ticker).unwrap_or(0);
        Palette99::pick(idx).to_rgba()
    };

    let closes = snapshot.field_columns(Field::Close);
    let volumes = snapshot.field_columns(Field::Volume);
    let (price_min, price_max) = price_bounds(&closes);
    let volume_max = stacked_volume_max(&volumes, rows);

    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let title = format!("Hourly close prices and volume for each stock, {}", label);
    let body = root.titled(&title, ("sans-serif", 22)).map_err(render_err)?;
    let (upper, lower) = body.split_vertically(75_i32.percent_height());

    // 上半部分：收盘价折线，主刻度为每日开盘
    let major_fmt = |x: &f64| layout.major_label(*x);
    let mut top = ChartBuilder::on(&upper)
        .margin_top(5)
        .margin_right(20)
        .x_label_area_size(22)
        .y_label_area_size(70)
        .build_cartesian_2d(PositionAxis::new(rows, layout.major_positions()), price_min..price_max)
        .map_err(render_err)?;

    top.configure_mesh()
        .disable_y_mesh()
        .bold_line_style(BLACK.mix(0.3))
        .x_label_formatter(&major_fmt)
        .x_label_style(("sans-serif", 13))
        .y_desc("Hourly Close Price ($)")
        .draw()
        .map_err(render_err)?;

    for (ticker, values) in &closes {
        let color = color_of(*ticker);
        top.draw_series(
            line_segments(values, layout.positions())
                .into_iter()
                .map(move |segment| PathElement::new(segment, color.stroke_width(2))),
        )
        .map_err(render_err)?
        .label(*ticker)
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    top.configure_series_labels()
        .position(SeriesLabelPosition::MiddleRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK.mix(0.5))
        .draw()
        .map_err(render_err)?;

    // 下半部分：按代码堆叠的成交量柱，次刻度为每根K线的时刻
    let minor_fmt = |x: &f64| layout.minor_label(*x);
    let volume_fmt = |v: &f64| format!("{:.0}", v);
    let mut bottom = ChartBuilder::on(&lower)
        .margin_right(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(PositionAxis::new(rows, layout.minor_positions()), 0.0..volume_max)
        .map_err(render_err)?;

    bottom
        .configure_mesh()
        .disable_mesh()
        .x_label_formatter(&minor_fmt)
        .x_label_style(("sans-serif", 9).into_font().transform(FontTransform::Rotate90))
        .y_label_formatter(&volume_fmt)
        .y_labels(4)
        .y_desc("Volume")
        .x_desc(format!("Trading Periods ({})", options.timezone.name()))
        .draw()
        .map_err(render_err)?;

    let mut base = vec![0.0; rows];
    for (ticker, values) in &volumes {
        let color = color_of(*ticker);
        let mut bars = Vec::with_capacity(rows);
        for (row, value) in values.iter().enumerate() {
            let Some(v) = value.filter(|v| *v > 0.0) else {
                continue;
            };
            let x = layout.positions()[row];
            bars.push(Rectangle::new(
                [(x - 0.4, base[row]), (x + 0.4, base[row] + v)],
                color.filled(),
            ));
            base[row] += v;
        }
        bottom.draw_series(bars).map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}
