//! PNG chart renderer
//!
//! Rasterises scatter, line, bar and histogram charts into an RGB buffer and
//! encodes them as PNG (zlib via `flate2`, CRC32 via [`flate2::Crc`]). The
//! result is a `data:image/png;base64,...` URI.
//!
//! Size control: when the URI exceeds the requested byte budget the chart is
//! redrawn at half resolution until it fits or the floor is reached, after
//! which a 1x1 placeholder is returned. Rendering never fails.

use async_trait::async_trait;
use base64::Engine as _;
use daa_core::data::find_field;
use daa_core::stats::{linear_regression, paired_columns, parse_lenient};
use daa_core::{ChartRenderer, ChartType, LineStyle, StageResult, VisualizationSpec};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use std::io::{self, Write};

/// Valid 1x1 PNG returned when nothing better fits
pub const PLACEHOLDER_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHggJ/PchI7wAAAABJRU5ErkJggg==";

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const MAX_DIMENSION: u32 = 4_096;
const MARGIN: i64 = 40;

type Rgb = [u8; 3];

const WHITE: Rgb = [255, 255, 255];
const AXIS: Rgb = [40, 40, 40];
const GRID: Rgb = [225, 225, 225];
const SERIES: Rgb = [31, 119, 180];

/// Map a colour name to RGB; unknown names fall back to red
#[must_use]
pub fn named_color(name: Option<&str>) -> Rgb {
    match name.map(str::to_lowercase).as_deref() {
        Some("blue") => [0, 0, 255],
        Some("green") => [0, 128, 0],
        Some("black") => [0, 0, 0],
        Some("orange") => [255, 165, 0],
        Some("purple") => [128, 0, 128],
        Some("gray" | "grey") => [128, 128, 128],
        Some("yellow") => [255, 215, 0],
        Some("cyan") => [0, 200, 200],
        Some("magenta") => [255, 0, 255],
        Some("brown") => [139, 69, 19],
        Some("pink") => [255, 105, 180],
        _ => [255, 0, 0],
    }
}

/// Renders charts as PNG data URIs
#[derive(Debug, Clone, Copy)]
pub struct PngChartRenderer {
    min_width: u32,
    min_height: u32,
    max_bytes: usize,
}

impl Default for PngChartRenderer {
    fn default() -> Self {
        Self {
            min_width: 64,
            min_height: 48,
            max_bytes: usize::MAX,
        }
    }
}

impl PngChartRenderer {
    /// Create renderer with default downscale floor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With the smallest size tried before giving up on the byte budget
    #[inline]
    #[must_use]
    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_width = width.clamp(1, MAX_DIMENSION);
        self.min_height = height.clamp(1, MAX_DIMENSION);
        self
    }

    /// With an upper bound applied on top of each chart's requested byte budget
    #[inline]
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Render synchronously
    #[must_use]
    pub fn render_data_uri(&self, data: &StageResult, spec: &VisualizationSpec) -> String {
        let series = Series::from_data(data, spec);
        let budget = spec.max_bytes.min(self.max_bytes);
        let mut width = spec.width.clamp(self.min_width, MAX_DIMENSION);
        let mut height = spec.height.clamp(self.min_height, MAX_DIMENSION);

        loop {
            let canvas = draw(&series, spec, width, height);
            match encode_png(&canvas) {
                Ok(png) => {
                    let uri = to_data_uri(&png);
                    if uri.len() <= budget {
                        return uri;
                    }
                    tracing::debug!("{}x{} chart is {} bytes, budget {}", width, height, uri.len(), budget);
                }
                Err(e) => {
                    tracing::warn!("PNG encoding failed: {}", e);
                    return PLACEHOLDER_DATA_URI.to_string();
                }
            }
            if width / 2 < self.min_width || height / 2 < self.min_height {
                tracing::warn!("Chart does not fit in {} bytes, returning placeholder", budget);
                return PLACEHOLDER_DATA_URI.to_string();
            }
            width /= 2;
            height /= 2;
        }
    }
}

#[async_trait]
impl ChartRenderer for PngChartRenderer {
    async fn render(&self, data: &StageResult, spec: &VisualizationSpec) -> String {
        let renderer = *self;
        let data = data.clone();
        let spec = spec.clone();
        match tokio::task::spawn_blocking(move || renderer.render_data_uri(&data, &spec)).await {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!("Chart rendering task failed: {}", e);
                PLACEHOLDER_DATA_URI.to_string()
            }
        }
    }
}

/// Plottable values pulled out of the dataset
#[derive(Debug, Clone, Default, PartialEq)]
struct Series {
    points: Vec<(f64, f64)>,
    values: Vec<f64>,
}

impl Series {
    fn from_data(data: &StageResult, spec: &VisualizationSpec) -> Self {
        let records = data.records();
        let numeric: Vec<String> = data
            .columns()
            .into_iter()
            .filter(|c| {
                let parsed = records.iter().filter(|r| r.get(c).and_then(parse_lenient).is_some()).count();
                parsed > 0 && parsed * 2 >= records.len()
            })
            .collect();

        let x = spec.x_field.clone().or_else(|| numeric.first().cloned());
        let y = spec
            .y_field
            .clone()
            .or_else(|| numeric.iter().find(|c| Some(*c) != x.as_ref()).cloned());

        let points = match (&x, &y) {
            (Some(x), Some(y)) => paired_columns(&records, x, y),
            _ => Vec::new(),
        };
        let value_field = match spec.chart_type {
            ChartType::Histogram => x.as_ref().or(y.as_ref()),
            _ => y.as_ref().or(x.as_ref()),
        };
        let values = value_field
            .map(|f| {
                records
                    .iter()
                    .filter_map(|r| find_field(r, f).and_then(parse_lenient))
                    .collect::<Vec<f64>>()
            })
            .unwrap_or_default();
        Self { points, values }
    }
}

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 3],
        }
    }

    fn set(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb) {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.set(x, y, color);
            }
        }
    }

    fn disc(&mut self, cx: i64, cy: i64, r: i64, color: Rgb) {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.set(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenham line with an on/off stroke pattern
    fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb, style: LineStyle, thickness: i64) {
        let (on, off) = match style {
            LineStyle::Solid => (1, 0),
            LineStyle::Dotted => (2, 4),
            LineStyle::Dashed => (10, 6),
        };
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness / 2;
        let mut step: i64 = 0;
        loop {
            if off == 0 || step % (on + off) < on {
                self.fill_rect(x - half, y - half, x + half, y + half, color);
            }
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }
}

/// Maps data coordinates into the plot area
struct Frame {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

impl Frame {
    fn new(width: u32, height: u32, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        let margin = MARGIN.min(i64::from(width) / 6).min(i64::from(height) / 6);
        Self {
            left: margin,
            top: margin / 2,
            right: i64::from(width) - margin / 2 - 1,
            bottom: i64::from(height) - margin - 1,
            x_range,
            y_range,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_px(&self, x: f64, y: f64) -> (i64, i64) {
        let fx = (x - self.x_range.0) / (self.x_range.1 - self.x_range.0);
        let fy = (y - self.y_range.0) / (self.y_range.1 - self.y_range.0);
        let px = self.left as f64 + fx * (self.right - self.left) as f64;
        let py = self.bottom as f64 - fy * (self.bottom - self.top) as f64;
        (px.round() as i64, py.round() as i64)
    }

    fn draw_axes(&self, canvas: &mut Canvas) {
        for i in 1..5 {
            let gy = self.top + (self.bottom - self.top) * i / 5;
            let gx = self.left + (self.right - self.left) * i / 5;
            canvas.line((self.left, gy), (self.right, gy), GRID, LineStyle::Solid, 1);
            canvas.line((gx, self.top), (gx, self.bottom), GRID, LineStyle::Solid, 1);
        }
        canvas.line((self.left, self.bottom), (self.right, self.bottom), AXIS, LineStyle::Solid, 2);
        canvas.line((self.left, self.top), (self.left, self.bottom), AXIS, LineStyle::Solid, 2);
        for i in 0..=5 {
            let tx = self.left + (self.right - self.left) * i / 5;
            let ty = self.top + (self.bottom - self.top) * i / 5;
            canvas.line((tx, self.bottom), (tx, self.bottom + 4), AXIS, LineStyle::Solid, 1);
            canvas.line((self.left - 4, ty), (self.left, ty), AXIS, LineStyle::Solid, 1);
        }
    }
}

fn draw(series: &Series, spec: &VisualizationSpec, width: u32, height: u32) -> Canvas {
    let mut canvas = Canvas::new(width, height);
    canvas.fill_rect(0, 0, i64::from(width) - 1, i64::from(height) - 1, WHITE);
    let radius = (i64::from(width.min(height)) / 120).clamp(1, 4);

    match spec.chart_type {
        ChartType::Scatter | ChartType::Line => {
            let mut points = series.points.clone();
            let frame = Frame::new(
                width,
                height,
                padded_range(points.iter().map(|p| p.0)),
                padded_range(points.iter().map(|p| p.1)),
            );
            frame.draw_axes(&mut canvas);
            if spec.chart_type == ChartType::Line {
                points.sort_by(|a, b| a.0.total_cmp(&b.0));
                for pair in points.windows(2) {
                    let a = frame.to_px(pair[0].0, pair[0].1);
                    let b = frame.to_px(pair[1].0, pair[1].1);
                    canvas.line(a, b, SERIES, LineStyle::Solid, 2);
                }
            }
            for (x, y) in &points {
                let (px, py) = frame.to_px(*x, *y);
                canvas.disc(px, py, radius, SERIES);
            }
            if spec.regression {
                if let Some((slope, intercept)) = linear_regression(&points) {
                    let (x0, x1) = frame.x_range;
                    canvas.line(
                        frame.to_px(x0, slope * x0 + intercept),
                        frame.to_px(x1, slope * x1 + intercept),
                        named_color(spec.regression_color.as_deref()),
                        spec.line_style,
                        2,
                    );
                }
            }
        }
        ChartType::Bar => {
            #[allow(clippy::cast_precision_loss)]
            let n = series.values.len() as f64;
            let top = series.values.iter().copied().fold(0.0, f64::max);
            let bottom = series.values.iter().copied().fold(0.0, f64::min);
            let frame = Frame::new(width, height, (-0.5, n.max(1.0) - 0.5), padded_range([bottom, top].into_iter()));
            frame.draw_axes(&mut canvas);
            draw_bars(&mut canvas, &frame, series.values.iter().enumerate().map(|(i, v)| {
                #[allow(clippy::cast_precision_loss)]
                let center = i as f64;
                (center - 0.35, center + 0.35, *v)
            }));
        }
        ChartType::Histogram => {
            let bins = histogram(&series.values);
            let max_count = bins.iter().map(|b| b.2).fold(0.0, f64::max);
            let x_range = match (bins.first(), bins.last()) {
                (Some(first), Some(last)) => (first.0, last.1),
                _ => (0.0, 1.0),
            };
            let frame = Frame::new(width, height, x_range, (0.0, max_count.max(1.0) * 1.05));
            frame.draw_axes(&mut canvas);
            draw_bars(&mut canvas, &frame, bins.into_iter());
        }
    }
    canvas
}

fn draw_bars(canvas: &mut Canvas, frame: &Frame, bars: impl Iterator<Item = (f64, f64, f64)>) {
    for (x0, x1, value) in bars {
        let (left, top) = frame.to_px(x0, value);
        let (right, base) = frame.to_px(x1, 0.0_f64.clamp(frame.y_range.0, frame.y_range.1));
        canvas.fill_rect(left, top, right - 1, base, SERIES);
    }
}

/// Equal-width bins as `(start, end, count)`
fn histogram(values: &[f64]) -> Vec<(f64, f64, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bins = ((values.len() as f64).sqrt().ceil() as usize).clamp(5, 20);
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };
    let mut counts = vec![0.0; bins];
    for v in values {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1.0;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            #[allow(clippy::cast_precision_loss)]
            let start = min + width * i as f64;
            (start, start + width, c)
        })
        .collect()
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk too large"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    Ok(())
}

/// 8-bit RGB PNG, no interlace, filter type 0 on every scanline
fn encode_png(canvas: &Canvas) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&canvas.width.to_be_bytes());
    header.extend_from_slice(&canvas.height.to_be_bytes());
    header.extend_from_slice(&[8, 2, 0, 0, 0]);

    let stride = canvas.width as usize * 3;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    for row in canvas.pixels.chunks(stride) {
        encoder.write_all(&[0])?;
        encoder.write_all(row)?;
    }
    let compressed = encoder.finish()?;

    let mut png = Vec::with_capacity(compressed.len() + 64);
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &header)?;
    write_chunk(&mut png, b"IDAT", &compressed)?;
    write_chunk(&mut png, b"IEND", &[])?;
    Ok(png)
}

fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(png))
}
