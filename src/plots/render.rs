//! Map and line-plot rendering

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use tracing::debug;

use super::canvas::{Canvas, Color, Rect, BLACK, GRID, LAND, WHITE};
use super::colormap::Colormap;
use super::contour::{isoline, level_label, nice_levels, nice_step};
use super::font::{scale_for_points, text_height, text_width};
use super::projection::LambertConformal;
use crate::config::PlotSettings;
use crate::errors::{ReplotsError, Result};
use crate::statistics::nanpercentile;

const PAD: f64 = 20.0;
const SERIES_LINE: Color = [31, 119, 180, 255];

/// A 2-D field on a curvilinear lon/lat grid.
#[derive(Debug, Clone)]
pub struct MapField<'a> {
    pub title: String,
    pub units: Option<String>,
    pub lon: ArrayView2<'a, f64>,
    pub lat: ArrayView2<'a, f64>,
    pub values: ArrayView2<'a, f64>,
    /// Colour limits and map are chosen for a model-minus-reference field.
    pub difference: bool,
    pub colormap: Colormap,
}

/// A labelled series of values, one per time step.
#[derive(Debug, Clone)]
pub struct SeriesField {
    pub title: String,
    pub units: Option<String>,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

/// Robust (2–98 %) colour limits; symmetric about zero for differences.
pub fn color_limits(values: &[f64], difference: bool) -> Option<(f64, f64)> {
    let lo = nanpercentile(values, 2.0)?;
    let hi = nanpercentile(values, 98.0)?;
    let (lo, hi) = if difference {
        let m = lo.abs().max(hi.abs());
        (-m, m)
    } else {
        (lo, hi)
    };
    if hi > lo {
        Some((lo, hi))
    } else {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        Some((lo - pad, hi + pad))
    }
}

fn lon_label(lon: f64) -> String {
    let lon = (lon + 540.0).rem_euclid(360.0) - 180.0;
    if lon < 0.0 {
        format!("{}°W", -lon)
    } else if lon > 0.0 && lon < 180.0 {
        format!("{lon}°E")
    } else {
        format!("{}°", lon.abs())
    }
}

fn lat_label(lat: f64) -> String {
    if lat < 0.0 {
        format!("{}°S", -lat)
    } else if lat > 0.0 {
        format!("{lat}°N")
    } else {
        "0°".to_string()
    }
}

fn finite_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Bilinear sample of `grid` at fractional index `(fi, fj)`.
fn sample(grid: &Array2<f64>, fi: f64, fj: f64) -> f64 {
    let (rows, cols) = grid.dim();
    let i0 = (fi.floor().max(0.0) as usize).min(rows.saturating_sub(2));
    let j0 = (fj.floor().max(0.0) as usize).min(cols.saturating_sub(2));
    let i1 = (i0 + 1).min(rows - 1);
    let j1 = (j0 + 1).min(cols - 1);
    let (di, dj) = (fi - i0 as f64, fj - j0 as f64);
    let top = grid[[i0, j0]] * (1.0 - dj) + grid[[i0, j1]] * dj;
    let bottom = grid[[i1, j0]] * (1.0 - dj) + grid[[i1, j1]] * dj;
    top * (1.0 - di) + bottom * di
}

/// Where `points` first crosses the line `coord == at` along axis 0 (x) or 1 (y).
fn edge_crossing(points: &[(f64, f64)], vertical_edge: bool, at: f64) -> Option<(f64, f64)> {
    points.windows(2).find_map(|w| {
        let (a, b) = (w[0], w[1]);
        let (ca, cb) = if vertical_edge { (a.0, b.0) } else { (a.1, b.1) };
        if (ca - at) * (cb - at) > 0.0 || ca == cb {
            return None;
        }
        let f = (at - ca) / (cb - ca);
        Some((a.0 + (b.0 - a.0) * f, a.1 + (b.1 - a.1) * f))
    })
}

struct MapFrame {
    rect: Rect,
    xmin: f64,
    ymin: f64,
    scale: f64,
}

impl MapFrame {
    fn to_px(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.rect.x0 + (x - self.xmin) * self.scale,
            self.rect.y1 - (y - self.ymin) * self.scale,
        )
    }
}

fn draw_label_box(canvas: &mut Canvas, x: f64, y: f64, text: &str, scale: usize) {
    let w = text_width(text, scale) as f64;
    let h = text_height(scale) as f64;
    let (x0, y0) = (x - w / 2.0, y - h / 2.0);
    canvas.fill_rect(
        Rect {
            x0: x0 - 2.0,
            y0: y0 - 2.0,
            x1: x0 + w + 2.0,
            y1: y0 + h + 2.0,
        },
        WHITE,
    );
    canvas.text(x0, y0, text, scale, BLACK);
}

fn draw_colorbar(
    canvas: &mut Canvas,
    frame: Rect,
    colormap: &Colormap,
    limits: (f64, f64),
    units: Option<&str>,
    scale: usize,
) {
    let bar = Rect {
        x0: frame.x1 + 2.0 * PAD,
        y0: frame.y0 + frame.height() * 0.1,
        x1: frame.x1 + 2.0 * PAD + 24.0,
        y1: frame.y1 - frame.height() * 0.1,
    };
    let rows = bar.height().max(1.0);
    for row in bar.y0 as i64..bar.y1 as i64 {
        let t = 1.0 - (row as f64 - bar.y0) / rows;
        let color = colormap.at(t);
        canvas.line(bar.x0, row as f64, bar.x1 - 1.0, row as f64, color);
    }
    canvas.stroke_rect(bar, BLACK);

    let (vmin, vmax) = limits;
    let step = (vmax - vmin) / 4.0;
    for k in 0..=4 {
        let value = vmin + step * k as f64;
        let y = bar.y1 - bar.height() * k as f64 / 4.0;
        canvas.line(bar.x1, y, bar.x1 + 5.0, y, BLACK);
        let label = level_label(value, nice_step(step.abs().max(f64::MIN_POSITIVE)));
        canvas.text(bar.x1 + 8.0, y - text_height(scale) as f64 / 2.0, &label, scale, BLACK);
    }
    if let Some(units) = units {
        let w = text_width(units, scale) as f64;
        canvas.text(
            bar.x0 + 12.0 - w / 2.0,
            bar.y0 - text_height(scale) as f64 - 8.0,
            units,
            scale,
            BLACK,
        );
    }
}

/// Render `field` on a Lambert Conformal map and write a PNG to `path`.
///
/// Filled cells, contour lines with labels, lon/lat gridlines with labels on
/// the edges enabled in `settings`, a title and a colour bar.
pub fn render_map(field: &MapField<'_>, settings: &PlotSettings, path: &Path) -> Result<()> {
    let shape = field.values.dim();
    if field.lon.dim() != shape || field.lat.dim() != shape {
        return Err(ReplotsError::Render(format!(
            "'{}': coordinate shape {:?}/{:?} does not match field shape {:?}",
            field.title,
            field.lon.dim(),
            field.lat.dim(),
            shape
        )));
    }

    let proj = LambertConformal::ocean_default();
    let mut px = Array2::from_elem(shape, f64::NAN);
    let mut py = Array2::from_elem(shape, f64::NAN);
    let (mut xmin, mut xmax, mut ymin, mut ymax) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for ((idx, &lon), &lat) in field.lon.indexed_iter().zip(field.lat.iter()) {
        if let Some((x, y)) = proj.forward(lon, lat) {
            px[idx] = x;
            py[idx] = y;
            xmin = xmin.min(x);
            xmax = xmax.max(x);
            ymin = ymin.min(y);
            ymax = ymax.max(y);
        }
    }
    if !(xmax > xmin && ymax > ymin) {
        return Err(ReplotsError::Render(format!(
            "'{}': no valid longitude/latitude extent",
            field.title
        )));
    }

    let values: Vec<f64> = field.values.iter().copied().collect();
    let limits = color_limits(&values, field.difference).ok_or_else(|| {
        ReplotsError::Render(format!("'{}': field has no valid values", field.title))
    })?;

    let (width, height) = (settings.width as usize, settings.height as usize);
    let title_scale = scale_for_points(settings.fig_titlesize);
    let tick_scale = scale_for_points(settings.fig_ticksize);
    let label_w = text_width("180°W", tick_scale) as f64;
    let label_h = text_height(tick_scale) as f64;

    let avail = Rect {
        x0: PAD + label_w + 10.0,
        y0: PAD + text_height(title_scale) as f64 + PAD + label_h + 10.0,
        x1: width as f64 - (4.0 * PAD + 24.0 + text_width("-0000.00", tick_scale) as f64),
        y1: height as f64 - (PAD + label_h + 10.0),
    };
    if avail.width() <= 10.0 || avail.height() <= 10.0 {
        return Err(ReplotsError::Render(format!(
            "figure {width}x{height} is too small"
        )));
    }
    let scale = (avail.width() / (xmax - xmin)).min(avail.height() / (ymax - ymin));
    let (fw, fh) = ((xmax - xmin) * scale, (ymax - ymin) * scale);
    let rect = Rect {
        x0: avail.x0 + (avail.width() - fw) / 2.0,
        y0: avail.y0 + (avail.height() - fh) / 2.0,
        x1: avail.x0 + (avail.width() + fw) / 2.0,
        y1: avail.y0 + (avail.height() + fh) / 2.0,
    };
    let frame = MapFrame {
        rect,
        xmin,
        ymin,
        scale,
    };
    let pixel = |i: usize, j: usize| frame.to_px(px[[i, j]], py[[i, j]]);

    let mut canvas = Canvas::new(width, height, WHITE);
    canvas.fill_rect(rect, LAND);
    canvas.set_clip(Some(rect));

    // filled cells between neighbouring grid points
    let (rows, cols) = shape;
    for i in 0..rows.saturating_sub(1) {
        for j in 0..cols.saturating_sub(1) {
            let corners = [(i, j), (i, j + 1), (i + 1, j + 1), (i + 1, j)];
            let finite: Vec<f64> = corners
                .iter()
                .map(|&c| field.values[c])
                .filter(|v| v.is_finite())
                .collect();
            if finite.len() < 3 {
                continue;
            }
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            let quad: Vec<(f64, f64)> = corners.iter().map(|&(a, b)| pixel(a, b)).collect();
            canvas.fill_polygon(&quad, field.colormap.map(mean, limits.0, limits.1));
        }
    }

    // contours
    let levels = nice_levels(limits.0, limits.1, settings.contour_levels);
    let step = if levels.len() > 1 { levels[1] - levels[0] } else { 1.0 };
    let mut labels = Vec::new();
    for &level in &levels {
        let segments = isoline(field.values, level);
        for [a, b] in &segments {
            let pa = frame.to_px(sample(&px, a.0, a.1), sample(&py, a.0, a.1));
            let pb = frame.to_px(sample(&px, b.0, b.1), sample(&py, b.0, b.1));
            canvas.line(pa.0, pa.1, pb.0, pb.1, BLACK);
        }
        if let Some([a, b]) = segments.get(segments.len() / 2) {
            let (fi, fj) = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
            labels.push((frame.to_px(sample(&px, fi, fj), sample(&py, fi, fj)), level_label(level, step)));
        }
    }
    for ((x, y), text) in &labels {
        draw_label_box(&mut canvas, *x, *y, text, 1);
    }

    // gridlines
    let (lon_min, lon_max) = finite_range(field.lon.iter());
    let (lat_min, lat_max) = finite_range(field.lat.iter());
    let step_deg = settings.grid_step.max(0.1);
    let samples = 64;
    let meridian = |lon: f64| -> Vec<(f64, f64)> {
        (0..=samples)
            .filter_map(|k| {
                let lat = (lat_min - step_deg) + (lat_max - lat_min + 2.0 * step_deg) * k as f64 / samples as f64;
                proj.forward(lon, lat.clamp(-89.0, 89.0)).map(|(x, y)| frame.to_px(x, y))
            })
            .collect()
    };
    let parallel = |lat: f64| -> Vec<(f64, f64)> {
        (0..=samples)
            .filter_map(|k| {
                let lon = (lon_min - step_deg) + (lon_max - lon_min + 2.0 * step_deg) * k as f64 / samples as f64;
                proj.forward(lon, lat).map(|(x, y)| frame.to_px(x, y))
            })
            .collect()
    };

    let lons: Vec<f64> = ((lon_min / step_deg).floor() as i64..=(lon_max / step_deg).ceil() as i64)
        .map(|k| k as f64 * step_deg)
        .collect();
    let lats: Vec<f64> = ((lat_min / step_deg).floor() as i64..=(lat_max / step_deg).ceil() as i64)
        .map(|k| k as f64 * step_deg)
        .filter(|lat| lat.abs() < 90.0)
        .collect();

    let meridians: Vec<(f64, Vec<(f64, f64)>)> = lons.iter().map(|&lon| (lon, meridian(lon))).collect();
    let parallels: Vec<(f64, Vec<(f64, f64)>)> = lats.iter().map(|&lat| (lat, parallel(lat))).collect();
    for (_, line) in meridians.iter().chain(&parallels) {
        canvas.polyline(line, GRID);
    }
    canvas.set_clip(None);

    for (lon, line) in &meridians {
        let text = lon_label(*lon);
        let half = text_width(&text, tick_scale) as f64 / 2.0;
        if settings.bottom_labels {
            if let Some((x, _)) = edge_crossing(line, false, rect.y1 - 0.5) {
                canvas.text(x - half, rect.y1 + 6.0, &text, tick_scale, BLACK);
            }
        }
        if settings.top_labels {
            if let Some((x, _)) = edge_crossing(line, false, rect.y0) {
                canvas.text(x - half, rect.y0 - 6.0 - label_h, &text, tick_scale, BLACK);
            }
        }
    }
    for (lat, line) in &parallels {
        let text = lat_label(*lat);
        let w = text_width(&text, tick_scale) as f64;
        if settings.left_labels {
            if let Some((_, y)) = edge_crossing(line, true, rect.x0) {
                canvas.text(rect.x0 - 6.0 - w, y - label_h / 2.0, &text, tick_scale, BLACK);
            }
        }
        if settings.right_labels {
            if let Some((_, y)) = edge_crossing(line, true, rect.x1 - 0.5) {
                canvas.text(rect.x1 + 6.0, y - label_h / 2.0, &text, tick_scale, BLACK);
            }
        }
    }

    canvas.stroke_rect(rect, BLACK);

    let title_w = text_width(&field.title, title_scale) as f64;
    canvas.text(
        (width as f64 - title_w) / 2.0,
        PAD,
        &field.title,
        title_scale,
        BLACK,
    );
    draw_colorbar(
        &mut canvas,
        rect,
        &field.colormap,
        limits,
        field.units.as_deref(),
        tick_scale,
    );

    canvas.save_png(path)?;
    debug!(path = %path.display(), "map written");
    Ok(())
}

/// Render a line plot of `series` and write a PNG to `path`.
pub fn render_series(series: &SeriesField, settings: &PlotSettings, path: &Path) -> Result<()> {
    let (lo, hi) = finite_range(series.values.iter());
    if lo > hi {
        return Err(ReplotsError::Render(format!(
            "'{}': series has no valid values",
            series.title
        )));
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.1 };
    let (ymin, ymax) = (lo - pad, hi + pad);

    let (width, height) = (settings.width as usize, settings.height as usize);
    let title_scale = scale_for_points(settings.fig_titlesize);
    let tick_scale = scale_for_points(settings.fig_ticksize);
    let label_h = text_height(tick_scale) as f64;

    let rect = Rect {
        x0: PAD * 2.0 + text_width("-0000.00", tick_scale) as f64,
        y0: PAD * 2.0 + text_height(title_scale) as f64,
        x1: width as f64 - PAD * 2.0,
        y1: height as f64 - (PAD * 2.0 + label_h),
    };
    if rect.width() <= 10.0 || rect.height() <= 10.0 {
        return Err(ReplotsError::Render(format!(
            "figure {width}x{height} is too small"
        )));
    }
    let n = series.values.len();
    let x_at = |i: usize| {
        if n > 1 {
            rect.x0 + rect.width() * i as f64 / (n - 1) as f64
        } else {
            rect.x0 + rect.width() / 2.0
        }
    };
    let y_at = |v: f64| rect.y1 - (v - ymin) / (ymax - ymin) * rect.height();

    let mut canvas = Canvas::new(width, height, WHITE);

    let levels = nice_levels(ymin, ymax, 5);
    let step = if levels.len() > 1 { levels[1] - levels[0] } else { 1.0 };
    for &level in &levels {
        let y = y_at(level);
        canvas.line(rect.x0, y, rect.x1 - 1.0, y, LAND);
        let text = level_label(level, step);
        let w = text_width(&text, tick_scale) as f64;
        canvas.text(rect.x0 - 8.0 - w, y - label_h / 2.0, &text, tick_scale, BLACK);
    }

    let ticks = n.min(6).max(1);
    for k in 0..ticks {
        let i = if ticks > 1 { k * (n - 1) / (ticks - 1) } else { 0 };
        if let Some(text) = series.labels.get(i) {
            let x = x_at(i);
            canvas.line(x, rect.y1, x, rect.y1 + 5.0, BLACK);
            let w = text_width(text, tick_scale) as f64;
            canvas.text(x - w / 2.0, rect.y1 + 8.0, text, tick_scale, BLACK);
        }
    }

    // NaN steps break the line
    let mut run: Vec<(f64, f64)> = Vec::new();
    for (i, &v) in series.values.iter().enumerate() {
        if v.is_finite() {
            run.push((x_at(i), y_at(v)));
        } else {
            canvas.polyline(&run, SERIES_LINE);
            run.clear();
        }
    }
    canvas.polyline(&run, SERIES_LINE);
    if n == 1 {
        let (x, y) = (x_at(0), y_at(series.values[0]));
        canvas.fill_rect(Rect { x0: x - 2.0, y0: y - 2.0, x1: x + 3.0, y1: y + 3.0 }, SERIES_LINE);
    }

    canvas.stroke_rect(rect, BLACK);
    let title = match &series.units {
        Some(units) => format!("{} ({units})", series.title),
        None => series.title.clone(),
    };
    let title_w = text_width(&title, title_scale) as f64;
    canvas.text((width as f64 - title_w) / 2.0, PAD, &title, title_scale, BLACK);

    canvas.save_png(path)?;
    debug!(path = %path.display(), "series written");
    Ok(())
}
