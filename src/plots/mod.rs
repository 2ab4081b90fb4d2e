//! Diagnostic plot generation
//!
//! # Organization
//!
//! - [`canvas`], [`font`]: raster drawing and PNG output
//! - [`colormap`], [`projection`], [`contour`]: map building blocks
//! - [`render`]: map and line-plot layouts
//!
//! This module turns dataset variables into 2-D fields (surface slice,
//! time mean interpolated to fixed depths, or domain-mean series) and runs
//! one render job per field on the execution client.

pub mod canvas;
pub mod colormap;
pub mod contour;
pub mod font;
pub mod projection;
pub mod render;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::{stack, Array2, Array3, ArrayD, ArrayView1, ArrayView3, Axis, Ix1, Ix2, Ix3, Zip};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PlotSettings;
use crate::dataset::{DatasetHandle, DatasetSchema, VariableSchema};
use crate::errors::{ReplotsError, Result};
use crate::statistics::{nanmean_axis, nanmean_series};
use colormap::Colormap;
use render::{render_map, render_series, MapField, SeriesField};

/// Plot sets known to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlotKind {
    /// First time step of surface fields.
    Fld2d,
    /// Time-mean fields interpolated to fixed depths.
    CntrDepth,
    /// Domain-mean time series.
    Tseries,
}

impl PlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotKind::Fld2d => "PM_FLD2D",
            PlotKind::CntrDepth => "PM_CNTRDEPTH",
            PlotKind::Tseries => "PM_TSERIES",
        }
    }

    /// Fields this plot set draws.
    pub fn fields<'a>(&self, settings: &'a PlotSettings) -> &'a [String] {
        match self {
            PlotKind::Fld2d => &settings.surface_fields,
            PlotKind::CntrDepth => &settings.depth_fields,
            PlotKind::Tseries => &settings.timeseries_fields,
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlotKind {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "PM_FLD2D" => Ok(PlotKind::Fld2d),
            "PM_CNTRDEPTH" => Ok(PlotKind::CntrDepth),
            "PM_TSERIES" => Ok(PlotKind::Tseries),
            other => Err(ReplotsError::UnknownPlotType(other.to_string())),
        }
    }
}

/// Data the model is differenced against.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    pub dataset: &'a DatasetHandle,
    pub label: &'a str,
}

/// Everything a render job needs besides its field.
#[derive(Debug, Clone, Copy)]
pub struct PlotRequest<'a> {
    pub diagnostic: &'a str,
    pub dataset: &'a DatasetHandle,
    pub reference: Option<Reference<'a>>,
    pub settings: &'a PlotSettings,
    pub plot_dir: &'a Path,
}

/// One independent unit of plotting work.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotJob {
    pub kind: PlotKind,
    pub field: String,
}

/// Jobs for `kinds`, skipping fields missing from the dataset or reference.
pub fn plan_jobs(
    kinds: &[PlotKind],
    settings: &PlotSettings,
    schema: &DatasetSchema,
    reference: Option<&DatasetSchema>,
) -> Vec<PlotJob> {
    let mut jobs = Vec::new();
    for &kind in kinds {
        for field in kind.fields(settings) {
            if schema.variable(field).is_err() {
                warn!(field = %field, plot = %kind, "field not in dataset, skipping");
                continue;
            }
            if reference.is_some_and(|r| r.variable(field).is_err()) {
                warn!(field = %field, plot = %kind, "field not in reference data, skipping");
                continue;
            }
            jobs.push(PlotJob {
                kind,
                field: field.clone(),
            });
        }
    }
    jobs
}

/// Render every job concurrently on the dataset's client.
pub fn render_all(request: &PlotRequest<'_>, jobs: &[PlotJob]) -> Result<Vec<PathBuf>> {
    let client = request.dataset.require_client()?;
    let outputs = client.run_batch(jobs, |job| render_job(request, job))?;
    Ok(outputs.into_iter().flatten().collect())
}

/// Render a single job, returning the PNGs it wrote.
pub fn render_job(request: &PlotRequest<'_>, job: &PlotJob) -> Result<Vec<PathBuf>> {
    match job.kind {
        PlotKind::Fld2d => render_surface(request, &job.field).map(|p| vec![p]),
        PlotKind::CntrDepth => render_depths(request, &job.field),
        PlotKind::Tseries => render_timeseries(request, &job.field).map(|p| vec![p]),
    }
}

fn title(request: &PlotRequest<'_>, var: &VariableSchema, depth: Option<f64>) -> String {
    let mut title = var.text_attribute("long_name").unwrap_or(&var.name).to_string();
    if let Some(depth) = depth {
        title.push_str(&format!(" at {depth} m"));
    }
    if let Some(reference) = &request.reference {
        title.push_str(&format!(" (model - {})", reference.label));
    }
    title
}

fn units(var: &VariableSchema) -> Option<String> {
    var.text_attribute("units").map(String::from)
}

fn difference(diagnostic: &str, field: &str, model: Array2<f64>, reference: Array2<f64>) -> Result<Array2<f64>> {
    if model.dim() != reference.dim() {
        return Err(ReplotsError::Prerequisites {
            diagnostic: diagnostic.to_string(),
            reason: format!(
                "'{field}' has shape {:?} in the model but {:?} in the reference",
                model.dim(),
                reference.dim()
            ),
        });
    }
    Ok(model - reference)
}

fn render_surface(request: &PlotRequest<'_>, field: &str) -> Result<PathBuf> {
    let var = request.dataset.schema()?.variable(field)?;
    let mut values = surface_slice(request.dataset.read_time_step(field, 0)?, field)?;
    if let Some(reference) = &request.reference {
        let other = surface_slice(reference.dataset.read_time_step(field, 0)?, field)?;
        values = difference(request.diagnostic, field, values, other)?;
    }
    let (lon, lat) = horizontal_grid(request.dataset, var, request.settings, values.dim())?;

    let path = request.plot_dir.join(format!("{field}.png"));
    let map = MapField {
        title: title(request, var, None),
        units: units(var),
        lon: lon.view(),
        lat: lat.view(),
        values: values.view(),
        difference: request.reference.is_some(),
        colormap: Colormap::for_field(field, request.reference.is_some()),
    };
    render_map(&map, request.settings, &path)?;
    info!(field, path = %path.display(), "surface plot written");
    Ok(path)
}

fn render_depths(request: &PlotRequest<'_>, field: &str) -> Result<Vec<PathBuf>> {
    let var = request.dataset.schema()?.variable(field)?;
    let (values, depths) = depth_field(request.dataset, var, request.settings)?;
    let reference = match &request.reference {
        Some(r) => {
            let ref_var = r.dataset.schema()?.variable(field)?;
            Some(depth_field(r.dataset, ref_var, request.settings)?)
        }
        None => None,
    };
    let (_, rows, cols) = values.dim();
    let (lon, lat) = horizontal_grid(request.dataset, var, request.settings, (rows, cols))?;

    let written = request
        .settings
        .depths
        .par_iter()
        .map(|&depth| -> Result<Option<PathBuf>> {
            let mut slice = interpolate_depth(values.view(), depths.view(), depth);
            if let Some((ref_values, ref_depths)) = &reference {
                let other = interpolate_depth(ref_values.view(), ref_depths.view(), depth);
                slice = difference(request.diagnostic, field, slice, other)?;
            }
            if !slice.iter().any(|v| v.is_finite()) {
                debug!(field, depth, "no water at this depth, skipping");
                return Ok(None);
            }
            let path = request.plot_dir.join(format!("{field}_{depth}m.png"));
            let map = MapField {
                title: title(request, var, Some(depth)),
                units: units(var),
                lon: lon.view(),
                lat: lat.view(),
                values: slice.view(),
                difference: reference.is_some(),
                colormap: Colormap::for_field(field, reference.is_some()),
            };
            render_map(&map, request.settings, &path)?;
            Ok(Some(path))
        })
        .collect::<Result<Vec<_>>>()?;
    let written: Vec<PathBuf> = written.into_iter().flatten().collect();
    info!(field, count = written.len(), "depth plots written");
    Ok(written)
}

fn render_timeseries(request: &PlotRequest<'_>, field: &str) -> Result<PathBuf> {
    let schema = request.dataset.schema()?;
    let var = schema.variable(field)?;
    let axis = var.time_axis.ok_or_else(|| ReplotsError::DimensionNotFound {
        var: field.to_string(),
        dim: schema.time_dim.clone(),
    })?;
    let data = request.dataset.read_variable(field)?;
    let values = nanmean_series(data.view(), axis)?;
    let labels = match request.dataset.read_time(&schema.time_dim) {
        Ok(dates) => dates
            .iter()
            .map(|d| format!("{:04}-{:02}", d.year, d.month))
            .collect(),
        Err(e) => {
            warn!(field, error = %e, "time axis not decodable, labelling by index");
            (0..values.len()).map(|i| i.to_string()).collect()
        }
    };

    let path = request.plot_dir.join(format!("{field}.png"));
    let series = SeriesField {
        title: format!("{} (domain mean)", title(request, var, None)),
        units: units(var),
        labels,
        values,
    };
    render_series(&series, request.settings, &path)?;
    info!(field, path = %path.display(), "time series written");
    Ok(path)
}

/// 2-D horizontal slice; the last level is taken from 3-D fields.
fn surface_slice(data: ArrayD<f64>, field: &str) -> Result<Array2<f64>> {
    match data.ndim() {
        2 => Ok(data.into_dimensionality::<Ix2>()?),
        3 if data.len_of(Axis(0)) > 0 => {
            let top = data.len_of(Axis(0)) - 1;
            Ok(data.index_axis(Axis(0), top).to_owned().into_dimensionality::<Ix2>()?)
        }
        n => Err(ReplotsError::Render(format!(
            "'{field}' has {n} dimensions per time step, expected 2 or 3"
        ))),
    }
}

fn time_mean(dataset: &DatasetHandle, name: &str) -> Result<ArrayD<f64>> {
    let var = dataset.schema()?.variable(name)?;
    let data = dataset.read_variable(name)?;
    match var.time_axis {
        Some(axis) => nanmean_axis(data.view(), axis),
        None => Ok(data),
    }
}

/// Lon/lat names from the `coordinates` attribute, else the configured ones.
fn coordinate_names(schema: &DatasetSchema, var: &VariableSchema, settings: &PlotSettings) -> (String, String) {
    let listed: Vec<&str> = var
        .text_attribute("coordinates")
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    let pick = |prefix: &str, fallback: &String| {
        listed
            .iter()
            .find(|name| name.starts_with(prefix) && schema.variable(name).is_ok())
            .map_or_else(|| fallback.clone(), |name| name.to_string())
    };
    (pick("lon", &settings.lon_var), pick("lat", &settings.lat_var))
}

/// Average neighbours onto a grid staggered by one point in either direction.
fn fit_to(grid: Array2<f64>, shape: (usize, usize)) -> Option<Array2<f64>> {
    let (rows, cols) = grid.dim();
    if (rows, cols) == shape {
        Some(grid)
    } else if rows == shape.0 && cols.checked_sub(1) == Some(shape.1) {
        Some(Array2::from_shape_fn(shape, |(i, j)| 0.5 * (grid[[i, j]] + grid[[i, j + 1]])))
    } else if cols == shape.1 && rows.checked_sub(1) == Some(shape.0) {
        Some(Array2::from_shape_fn(shape, |(i, j)| 0.5 * (grid[[i, j]] + grid[[i + 1, j]])))
    } else {
        None
    }
}

fn horizontal_grid(
    dataset: &DatasetHandle,
    var: &VariableSchema,
    settings: &PlotSettings,
    shape: (usize, usize),
) -> Result<(Array2<f64>, Array2<f64>)> {
    let (lon_name, lat_name) = coordinate_names(dataset.schema()?, var, settings);
    let lon = dataset.read_variable(&lon_name)?;
    let lat = dataset.read_variable(&lat_name)?;
    let (lon, lat) = match (lon.ndim(), lat.ndim()) {
        (1, 1) => {
            let lon = lon.into_dimensionality::<Ix1>()?;
            let lat = lat.into_dimensionality::<Ix1>()?;
            let dim = (lat.len(), lon.len());
            (
                Array2::from_shape_fn(dim, |(_, j)| lon[j]),
                Array2::from_shape_fn(dim, |(i, _)| lat[i]),
            )
        }
        (2, 2) => (lon.into_dimensionality::<Ix2>()?, lat.into_dimensionality::<Ix2>()?),
        (a, b) => {
            return Err(ReplotsError::Render(format!(
                "'{lon_name}'/'{lat_name}' have {a}/{b} dimensions, expected 1 or 2"
            )))
        }
    };
    let mismatch = |name: &str, dim: (usize, usize)| {
        ReplotsError::Render(format!(
            "'{name}' shape {dim:?} does not fit '{}' shape {shape:?}",
            var.name
        ))
    };
    let lon_dim = lon.dim();
    let lat_dim = lat.dim();
    let lon = fit_to(lon, shape).ok_or_else(|| mismatch(&lon_name, lon_dim))?;
    let lat = fit_to(lat, shape).ok_or_else(|| mismatch(&lat_name, lat_dim))?;
    Ok((lon, lat))
}

/// Time-mean 3-D field with the positive depth of every point.
fn depth_field(
    dataset: &DatasetHandle,
    var: &VariableSchema,
    settings: &PlotSettings,
) -> Result<(Array3<f64>, Array3<f64>)> {
    let values = time_mean(dataset, &var.name)?;
    if values.ndim() != 3 {
        return Err(ReplotsError::Render(format!(
            "'{}' has {} dimensions after the time mean, expected 3",
            var.name,
            values.ndim()
        )));
    }
    let values = values.into_dimensionality::<Ix3>()?;
    let depths = level_depths(dataset, var, settings, values.dim())?;
    Ok((values, depths))
}

fn level_depths(
    dataset: &DatasetHandle,
    var: &VariableSchema,
    settings: &PlotSettings,
    shape: (usize, usize, usize),
) -> Result<Array3<f64>> {
    let schema = dataset.schema()?;
    if schema.variable(&settings.depth_var).is_ok() {
        let z = time_mean(dataset, &settings.depth_var)?;
        let fitted = match z.ndim() {
            1 if z.len() == shape.0 => {
                let z = z.into_dimensionality::<Ix1>()?;
                Some(Array3::from_shape_fn(shape, |(k, _, _)| z[k]))
            }
            3 => fit_levels(z.into_dimensionality::<Ix3>()?, shape)?,
            _ => None,
        };
        if let Some(z) = fitted {
            return Ok(z.mapv(f64::abs));
        }
        warn!(
            var = %var.name,
            depth_var = %settings.depth_var,
            "vertical coordinate does not fit, computing s-coordinate depths"
        );
    }
    s_coordinate_depths(dataset, var, shape)
}

fn fit_levels(z: Array3<f64>, shape: (usize, usize, usize)) -> Result<Option<Array3<f64>>> {
    if z.dim() == shape {
        return Ok(Some(z));
    }
    if z.len_of(Axis(0)) != shape.0 {
        return Ok(None);
    }
    let levels: Option<Vec<Array2<f64>>> = z
        .axis_iter(Axis(0))
        .map(|level| fit_to(level.to_owned(), (shape.1, shape.2)))
        .collect();
    let Some(levels) = levels else {
        return Ok(None);
    };
    let views: Vec<_> = levels.iter().map(|l| l.view()).collect();
    Ok(Some(stack(Axis(0), &views)?))
}

/// Depths of a terrain-following grid from `h`, `hc` and the stretching curve.
///
/// Uses the `Vtransform = 2` form with the free surface at rest:
/// `z = h * (hc * s + h * C) / (hc + h)`.
fn s_coordinate_depths(
    dataset: &DatasetHandle,
    var: &VariableSchema,
    shape: (usize, usize, usize),
) -> Result<Array3<f64>> {
    let (s_name, c_name) = if var.dims.iter().any(|d| d == "s_w") {
        ("s_w", "Cs_w")
    } else {
        ("s_rho", "Cs_r")
    };
    let s: Vec<f64> = dataset.read_variable(s_name)?.iter().copied().collect();
    let c: Vec<f64> = dataset.read_variable(c_name)?.iter().copied().collect();
    let hc = dataset
        .read_variable("hc")?
        .iter()
        .copied()
        .next()
        .ok_or_else(|| ReplotsError::VariableNotFound { var: "hc".to_string() })?;
    let h = dataset.read_variable("h")?.into_dimensionality::<Ix2>()?;
    let h_dim = h.dim();
    let h = fit_to(h, (shape.1, shape.2)).ok_or_else(|| {
        ReplotsError::Render(format!("'h' shape {h_dim:?} does not fit '{}'", var.name))
    })?;
    if s.len() != shape.0 || c.len() != shape.0 {
        return Err(ReplotsError::Render(format!(
            "'{}' has {} levels but {s_name}/{c_name} have {}/{}",
            var.name,
            shape.0,
            s.len(),
            c.len()
        )));
    }
    Ok(Array3::from_shape_fn(shape, |(k, i, j)| {
        let depth = h[[i, j]];
        -(depth * (hc * s[k] + depth * c[k]) / (hc + depth))
    }))
}

/// Value of one water column at `target` depth.
///
/// Shallower than the top level takes the top value; deeper than the
/// deepest valid level is missing.
fn column_at(values: ArrayView1<'_, f64>, depths: ArrayView1<'_, f64>, target: f64) -> f64 {
    let mut column: Vec<(f64, f64)> = depths
        .iter()
        .zip(values.iter())
        .filter(|(d, v)| d.is_finite() && v.is_finite())
        .map(|(&d, &v)| (d, v))
        .collect();
    if column.is_empty() {
        return f64::NAN;
    }
    column.sort_by(|a, b| a.0.total_cmp(&b.0));
    if target <= column[0].0 {
        return column[0].1;
    }
    column
        .windows(2)
        .find(|w| target <= w[1].0)
        .map_or(f64::NAN, |w| {
            let (d0, v0) = w[0];
            let (d1, v1) = w[1];
            if d1 > d0 {
                v0 + (v1 - v0) * (target - d0) / (d1 - d0)
            } else {
                v1
            }
        })
}

/// Horizontal slice of `values` at `target` metres below the surface.
pub fn interpolate_depth(values: ArrayView3<'_, f64>, depths: ArrayView3<'_, f64>, target: f64) -> Array2<f64> {
    let (_, rows, cols) = values.dim();
    let mut out = Array2::from_elem((rows, cols), f64::NAN);
    Zip::from(&mut out)
        .and(values.lanes(Axis(0)))
        .and(depths.lanes(Axis(0)))
        .par_for_each(|o, v, d| *o = column_at(v, d, target));
    out
}
