//! Multi-file dataset handle
//!
//! A [`DatasetHandle`] binds a list of history files as one logical dataset
//! concatenated along the time dimension. Opening validates every file and
//! records the schema; values are read on demand, one time chunk at a time.

use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{concatenate, ArrayD, Axis, IxDyn};
use netcdf::AttributeValue;
use tracing::{debug, info, warn};

use crate::calendar::{CalendarDate, TimeUnits};
use crate::errors::{ReplotsError, Result};
use crate::parallel::{ClientMode, ExecutionClient};

/// Default time dimension of ocean history files.
pub const DEFAULT_TIME_DIM: &str = "ocean_time";
/// Default number of time steps read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 30;

/// One variable of the logical dataset.
#[derive(Debug, Clone)]
pub struct VariableSchema {
    pub name: String,
    pub dims: Vec<String>,
    /// Shape of the concatenated variable.
    pub shape: Vec<usize>,
    /// Position of the time dimension, if the variable has one.
    pub time_axis: Option<usize>,
    pub attributes: Vec<(String, AttributeValue)>,
}

impl VariableSchema {
    /// First string value of attribute `name`.
    pub fn text_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(k, v)| match v {
            AttributeValue::Str(s) if k == name => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn has_time(&self) -> bool {
        self.time_axis.is_some()
    }

    /// Number of values in the concatenated variable.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Schema of an opened dataset.
#[derive(Debug, Clone)]
pub struct DatasetSchema {
    pub time_dim: String,
    /// Dimensions of the logical dataset; the time length is the total over files.
    pub dimensions: Vec<(String, usize)>,
    pub variables: Vec<VariableSchema>,
    pub global_attributes: Vec<(String, AttributeValue)>,
    /// Time steps held by each file, in file order.
    pub time_lengths: Vec<usize>,
}

impl DatasetSchema {
    pub fn variable(&self, name: &str) -> Result<&VariableSchema> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| ReplotsError::VariableNotFound {
                var: name.to_string(),
            })
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|(d, _)| d == name)
            .map(|&(_, len)| len)
    }

    /// Total number of time steps.
    pub fn time_len(&self) -> usize {
        self.time_lengths.iter().sum()
    }

    /// Variables that vary in time, excluding the time coordinate itself.
    pub fn time_varying(&self) -> impl Iterator<Item = &VariableSchema> {
        self.variables
            .iter()
            .filter(move |v| v.has_time() && v.name != self.time_dim)
    }
}

/// Handle to zero or one opened dataset and zero or one execution client.
#[derive(Debug)]
pub struct DatasetHandle {
    time_dim: String,
    chunk_size: usize,
    files: Vec<PathBuf>,
    schema: Option<DatasetSchema>,
    client: Option<ExecutionClient>,
}

impl Default for DatasetHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn collect_attributes<'a>(
    attrs: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> Vec<(String, AttributeValue)> {
    attrs
        .filter_map(|attr| match attr.value() {
            Ok(value) => Some((attr.name().to_string(), value)),
            Err(e) => {
                warn!(attribute = attr.name(), error = %e, "skipping unreadable attribute");
                None
            }
        })
        .collect()
}

/// Numeric value of an attribute, used for fill values and packing.
pub(crate) fn numeric_attribute(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Float(v) => Some(f64::from(*v)),
        AttributeValue::Int(v) => Some(f64::from(*v)),
        AttributeValue::Short(v) => Some(f64::from(*v)),
        AttributeValue::Schar(v) => Some(f64::from(*v)),
        AttributeValue::Uchar(v) => Some(f64::from(*v)),
        AttributeValue::Ushort(v) => Some(f64::from(*v)),
        AttributeValue::Uint(v) => Some(f64::from(*v)),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|&x| f64::from(x)),
        _ => None,
    }
}

fn read_range(var: &netcdf::Variable, ranges: &[Range<usize>]) -> Result<Vec<f64>> {
    let values = match ranges.len() {
        0 => var.get_values::<f64, _>(..)?,
        1 => var.get_values::<f64, _>(ranges[0].clone())?,
        2 => var.get_values::<f64, _>((ranges[0].clone(), ranges[1].clone()))?,
        3 => var.get_values::<f64, _>((ranges[0].clone(), ranges[1].clone(), ranges[2].clone()))?,
        4 => var.get_values::<f64, _>((
            ranges[0].clone(),
            ranges[1].clone(),
            ranges[2].clone(),
            ranges[3].clone(),
        ))?,
        _ => var.get_values::<f64, _>(..)?,
    };
    Ok(values)
}

/// Replace fill values with NaN and unpack `scale_factor`/`add_offset`.
fn mask_and_unpack(values: &mut [f64], attributes: &[(String, AttributeValue)]) {
    let lookup = |name: &str| {
        attributes
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| numeric_attribute(v))
    };
    let fills: Vec<f64> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| lookup(*name))
        .collect();
    let scale = lookup("scale_factor").unwrap_or(1.0);
    let offset = lookup("add_offset").unwrap_or(0.0);

    for v in values.iter_mut() {
        if fills.iter().any(|&f| *v == f) {
            *v = f64::NAN;
        } else {
            *v = *v * scale + offset;
        }
    }
}

impl DatasetHandle {
    pub fn new() -> Self {
        Self {
            time_dim: DEFAULT_TIME_DIM.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            files: Vec::new(),
            schema: None,
            client: None,
        }
    }

    pub fn with_time_dim(mut self, time_dim: impl Into<String>) -> Self {
        self.time_dim = time_dim.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn time_dim(&self) -> &str {
        &self.time_dim
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Start the execution client. A running client is replaced.
    pub fn start_client(&mut self, mode: ClientMode) -> Result<()> {
        self.start_client_with(mode, None)
    }

    /// Start the execution client with an explicit local worker count.
    pub fn start_client_with(&mut self, mode: ClientMode, threads: Option<usize>) -> Result<()> {
        let client = ExecutionClient::start(mode, threads)?;
        self.client = Some(client);
        Ok(())
    }

    /// Release the client. No-op when none is running.
    pub fn stop_client(&mut self) {
        if let Some(client) = self.client.take() {
            info!(mode = %client.mode(), "execution client stopped");
        }
    }

    pub fn client(&self) -> Option<&ExecutionClient> {
        self.client.as_ref()
    }

    /// Client of the handle, or an error if none was started.
    pub fn require_client(&self) -> Result<&ExecutionClient> {
        self.client.as_ref().ok_or_else(|| {
            ReplotsError::ClientInitialization("no execution client has been started".to_string())
        })
    }

    pub fn is_open(&self) -> bool {
        self.schema.is_some()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn schema(&self) -> Result<&DatasetSchema> {
        self.schema.as_ref().ok_or(ReplotsError::DatasetNotOpen)
    }

    /// Bind `files` as one dataset. The previous binding is replaced only on success.
    pub fn open(&mut self, files: &[PathBuf]) -> Result<()> {
        let first = files.first().ok_or_else(|| ReplotsError::DatasetOpen {
            path: PathBuf::new(),
            reason: "no files given".to_string(),
        })?;

        let mut time_lengths = Vec::with_capacity(files.len());
        for path in files {
            time_lengths.push(self.time_length(path)?);
        }

        let schema = self.read_schema(first, time_lengths)?;
        info!(
            files = files.len(),
            variables = schema.variables.len(),
            time_steps = schema.time_len(),
            "dataset opened"
        );

        self.files = files.to_vec();
        self.schema = Some(schema);
        Ok(())
    }

    fn open_file(path: &Path) -> Result<netcdf::File> {
        netcdf::open(path).map_err(|e| ReplotsError::DatasetOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn time_length(&self, path: &Path) -> Result<usize> {
        let file = Self::open_file(path)?;
        let len = file
            .dimension(&self.time_dim)
            .map(|d| d.len())
            .ok_or_else(|| ReplotsError::DatasetOpen {
                path: path.to_path_buf(),
                reason: format!("no '{}' dimension", self.time_dim),
            })?;
        debug!(file = %path.display(), time_steps = len, "validated history file");
        Ok(len)
    }

    fn read_schema(&self, path: &Path, time_lengths: Vec<usize>) -> Result<DatasetSchema> {
        let file = Self::open_file(path)?;
        let total: usize = time_lengths.iter().sum();

        let dimensions = file
            .dimensions()
            .map(|d| {
                let len = if d.name() == self.time_dim { total } else { d.len() };
                (d.name().to_string(), len)
            })
            .collect();

        let variables = file
            .variables()
            .map(|var| {
                let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
                let time_axis = dims.iter().position(|d| *d == self.time_dim);
                let shape = var
                    .dimensions()
                    .iter()
                    .enumerate()
                    .map(|(i, d)| if Some(i) == time_axis { total } else { d.len() })
                    .collect();
                VariableSchema {
                    name: var.name(),
                    dims,
                    shape,
                    time_axis,
                    attributes: collect_attributes(var.attributes()),
                }
            })
            .collect();

        Ok(DatasetSchema {
            time_dim: self.time_dim.clone(),
            dimensions,
            variables,
            global_attributes: collect_attributes(file.attributes()),
            time_lengths,
        })
    }

    fn check_memory(&self, var: &VariableSchema, elements: usize) -> Result<()> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let bytes = elements as u64 * std::mem::size_of::<f64>() as u64;
        if bytes > client.memory_limit() {
            return Err(ReplotsError::StatisticsError(format!(
                "variable '{}' needs {bytes} bytes, over the client memory limit of {} bytes",
                var.name,
                client.memory_limit()
            )));
        }
        Ok(())
    }

    /// Read one file's part of a variable, `chunk_size` time steps at a time.
    fn read_file_part(&self, path: &Path, var: &VariableSchema, steps: usize) -> Result<ArrayD<f64>> {
        let file = Self::open_file(path)?;
        let nc_var = file
            .variable(&var.name)
            .ok_or_else(|| ReplotsError::VariableNotFound {
                var: var.name.clone(),
            })?;
        let mut shape: Vec<usize> = nc_var.dimensions().iter().map(|d| d.len()).collect();

        let Some(axis) = var.time_axis.filter(|_| shape.len() <= 4) else {
            let mut values = read_range(&nc_var, &[])?;
            mask_and_unpack(&mut values, &var.attributes);
            return Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?);
        };
        shape[axis] = steps;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < steps {
            let stop = (start + self.chunk_size).min(steps);
            let ranges: Vec<Range<usize>> = shape
                .iter()
                .enumerate()
                .map(|(i, &len)| if i == axis { start..stop } else { 0..len })
                .collect();
            let mut values = read_range(&nc_var, &ranges)?;
            mask_and_unpack(&mut values, &var.attributes);
            let chunk_shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
            chunks.push(ArrayD::from_shape_vec(IxDyn(&chunk_shape), values)?);
            start = stop;
        }

        if chunks.is_empty() {
            return Ok(ArrayD::zeros(IxDyn(&shape)));
        }
        let views: Vec<_> = chunks.iter().map(|c| c.view()).collect();
        Ok(concatenate(Axis(axis), &views)?)
    }

    /// Read a whole variable, concatenated across files along time.
    ///
    /// Fill values become NaN. Variables without the time dimension are read
    /// from the first file.
    pub fn read_variable(&self, name: &str) -> Result<ArrayD<f64>> {
        let schema = self.schema()?;
        let var = schema.variable(name)?;
        self.check_memory(var, var.len())?;

        let Some(axis) = var.time_axis else {
            return self.read_file_part(&self.files[0], var, 0);
        };

        let mut parts = Vec::with_capacity(self.files.len());
        for (path, &steps) in self.files.iter().zip(&schema.time_lengths) {
            if steps > 0 {
                parts.push(self.read_file_part(path, var, steps)?);
            }
        }
        if parts.is_empty() {
            let mut shape = var.shape.clone();
            shape[axis] = 0;
            return Ok(ArrayD::zeros(IxDyn(&shape)));
        }
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        let data = concatenate(Axis(axis), &views)?;
        debug!(var = name, shape = ?data.shape(), "variable read");
        Ok(data)
    }

    /// Read a single time step of a variable; the time axis is removed.
    pub fn read_time_step(&self, name: &str, index: usize) -> Result<ArrayD<f64>> {
        let schema = self.schema()?;
        let var = schema.variable(name)?;
        let Some(axis) = var.time_axis else {
            return self.read_variable(name);
        };

        let mut offset = index;
        for (path, &steps) in self.files.iter().zip(&schema.time_lengths) {
            if offset < steps {
                let file = Self::open_file(path)?;
                let nc_var = file.variable(name).ok_or_else(|| ReplotsError::VariableNotFound {
                    var: name.to_string(),
                })?;
                let shape: Vec<usize> = nc_var.dimensions().iter().map(|d| d.len()).collect();
                if shape.len() > 4 {
                    let whole = self.read_file_part(path, var, steps)?;
                    return Ok(whole.index_axis(Axis(axis), offset).to_owned());
                }
                let ranges: Vec<Range<usize>> = shape
                    .iter()
                    .enumerate()
                    .map(|(i, &len)| if i == axis { offset..offset + 1 } else { 0..len })
                    .collect();
                let mut values = read_range(&nc_var, &ranges)?;
                mask_and_unpack(&mut values, &var.attributes);
                let out_shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
                let step = ArrayD::from_shape_vec(IxDyn(&out_shape), values)?;
                return Ok(step.index_axis(Axis(axis), 0).to_owned());
            }
            offset -= steps;
        }

        Err(ReplotsError::StatisticsError(format!(
            "time index {index} out of range for '{name}' ({} steps)",
            schema.time_len()
        )))
    }

    /// Raw offsets of the time coordinate `name`.
    pub fn read_time_values(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.read_variable(name)?.iter().copied().collect())
    }

    /// Decode the time coordinate `name` through its `units`/`calendar` attributes.
    pub fn read_time(&self, name: &str) -> Result<Vec<CalendarDate>> {
        let var = self.schema()?.variable(name)?;
        let units = var.text_attribute("units").ok_or_else(|| {
            ReplotsError::InvalidTime(format!("time variable '{name}' has no 'units' attribute"))
        })?;
        let calendar = var.text_attribute("calendar").unwrap_or("standard");
        let units = TimeUnits::parse(units, calendar)?;
        units.decode_all(&self.read_time_values(name)?)
    }
}
