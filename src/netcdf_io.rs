//! NetCDF output for climatology files
//!
//! Writes computed means to a new NetCDF file, carrying dimensions,
//! attributes and global metadata over from the source dataset.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use ndarray::ArrayD;
use netcdf::{AttributeValue, Options};
use tracing::{debug, warn};

use crate::errors::{ReplotsError, Result};

/// Attributes never copied to a climatology variable.
///
/// Values are written unpacked as f64, so packing attributes no longer apply.
const DROPPED_ATTRIBUTES: &[&str] = &["_FillValue", "missing_value", "grid", "scale_factor", "add_offset"];

/// Fill value of f64 output variables.
pub const OUTPUT_FILL: f64 = 1.0e37;

/// On-disk format of written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetcdfFormat {
    /// `netcdf`: classic format
    Classic,
    /// `netcdfLarge`: 64-bit offset format
    Large,
    /// `netcdf4`: NetCDF-4/HDF5
    #[default]
    Netcdf4,
    /// `netcdf4c`: NetCDF-4 with deflate compression
    Netcdf4Compressed,
}

impl FromStr for NetcdfFormat {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "netcdf" => Ok(Self::Classic),
            "netcdfLarge" => Ok(Self::Large),
            "netcdf4" => Ok(Self::Netcdf4),
            "netcdf4c" => Ok(Self::Netcdf4Compressed),
            other => Err(ReplotsError::Config(format!(
                "unknown netcdf_format '{other}' (expected netcdf, netcdfLarge, netcdf4 or netcdf4c)"
            ))),
        }
    }
}

impl NetcdfFormat {
    /// Parse a configured format name, falling back to `netcdf4`.
    pub fn from_config(name: &str) -> Self {
        name.parse().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to netcdf4");
            Self::Netcdf4
        })
    }

    fn options(self) -> Options {
        match self {
            Self::Classic => Options::empty(),
            Self::Large => Options::_64BIT_OFFSET,
            Self::Netcdf4 | Self::Netcdf4Compressed => Options::NETCDF4,
        }
    }
}

/// A variable to write.
#[derive(Debug, Clone)]
pub struct OutputVariable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
    pub attributes: Vec<(String, AttributeValue)>,
}

/// Integer coordinate of a grouping dimension.
#[derive(Debug, Clone)]
pub struct GroupCoordinate {
    pub name: String,
    pub values: Vec<i64>,
    pub attributes: Vec<(String, AttributeValue)>,
}

/// Writer for one climatology file.
pub struct ClimatologyWriter<'a> {
    output_path: &'a Path,
    format: NetcdfFormat,
    global_attributes: &'a [(String, AttributeValue)],
}

impl<'a> ClimatologyWriter<'a> {
    pub fn new(
        output_path: &'a Path,
        format: NetcdfFormat,
        global_attributes: &'a [(String, AttributeValue)],
    ) -> Self {
        Self {
            output_path,
            format,
            global_attributes,
        }
    }

    /// Write `variables` and an optional group coordinate, replacing any existing file.
    ///
    /// Every definition is made before any data is written.
    pub fn write(
        &self,
        group: Option<&GroupCoordinate>,
        variables: &[OutputVariable],
        history: &str,
    ) -> Result<()> {
        if self.output_path.exists() {
            fs::remove_file(self.output_path)?;
        }

        let mut file = netcdf::create_with(self.output_path, self.format.options())?;

        // Dimensions, in first-use order
        let mut defined: Vec<(String, usize)> = Vec::new();
        if let Some(g) = group {
            file.add_dimension(&g.name, g.values.len())?;
            defined.push((g.name.clone(), g.values.len()));
        }
        for var in variables {
            if var.dims.len() != var.data.ndim() {
                return Err(ReplotsError::StatisticsError(format!(
                    "variable '{}' has {} dimension names for a {}-d array",
                    var.name,
                    var.dims.len(),
                    var.data.ndim()
                )));
            }
            for (dim, &len) in var.dims.iter().zip(var.data.shape()) {
                match defined.iter().find(|(d, _)| d == dim) {
                    Some(&(_, existing)) if existing != len => {
                        return Err(ReplotsError::StatisticsError(format!(
                            "dimension '{dim}' of '{}' has length {len}, expected {existing}",
                            var.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        file.add_dimension(dim, len)?;
                        defined.push((dim.clone(), len));
                    }
                }
            }
        }

        if let Some(g) = group {
            let mut coord = file.add_variable::<i32>(&g.name, &[g.name.as_str()])?;
            for (name, value) in &g.attributes {
                coord.put_attribute(name, value.clone())?;
            }
        }

        for var in variables {
            let dim_refs: Vec<&str> = var.dims.iter().map(String::as_str).collect();
            let mut new_var = file.add_variable::<f64>(&var.name, &dim_refs)?;
            if self.format == NetcdfFormat::Netcdf4Compressed && !dim_refs.is_empty() {
                new_var.set_compression(4, true)?;
            }
            new_var.put_attribute("_FillValue", OUTPUT_FILL)?;

            for (name, value) in &var.attributes {
                if DROPPED_ATTRIBUTES.contains(&name.as_str()) {
                    continue;
                }
                if let Err(e) = new_var.put_attribute(name, value.clone()) {
                    warn!(var = %var.name, attribute = %name, error = %e, "attribute not copied");
                }
            }
        }

        for (name, value) in self.global_attributes {
            if name == "history" {
                continue;
            }
            file.add_attribute(name, value.clone())?;
        }
        file.add_attribute(
            "history",
            format!("Created by RePlots on {}: {history}", Utc::now().to_rfc3339()),
        )?;

        if let Some(g) = group {
            let values: Vec<i32> = g
                .values
                .iter()
                .map(|&v| {
                    i32::try_from(v).map_err(|_| {
                        ReplotsError::StatisticsError(format!("group key {v} does not fit in i32"))
                    })
                })
                .collect::<Result<_>>()?;
            let mut coord = file
                .variable_mut(&g.name)
                .ok_or_else(|| ReplotsError::VariableNotFound { var: g.name.clone() })?;
            coord.put_values(&values, ..)?;
        }

        for var in variables {
            let filled = var.data.mapv(|v| if v.is_finite() { v } else { OUTPUT_FILL });
            let mut new_var = file
                .variable_mut(&var.name)
                .ok_or_else(|| ReplotsError::VariableNotFound { var: var.name.clone() })?;
            new_var.put(filled.view(), ..)?;
            debug!(var = %var.name, shape = ?var.data.shape(), "variable written");
        }

        Ok(())
    }
}

/// Read a whole variable from `path` as f64, with fill values masked to NaN.
pub fn read_file_variable(path: &Path, name: &str) -> Result<ArrayD<f64>> {
    let file = netcdf::open(path)?;
    let var = file
        .variable(name)
        .ok_or_else(|| ReplotsError::VariableNotFound {
            var: name.to_string(),
        })?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let fill = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|a| var.attribute_value(a).and_then(|v| v.ok()))
        .filter_map(|v| crate::dataset::numeric_attribute(&v))
        .collect::<Vec<f64>>();

    let values: Vec<f64> = var
        .get_values::<f64, _>(..)?
        .into_iter()
        .map(|v| if fill.contains(&v) { f64::NAN } else { v })
        .collect();
    Ok(ArrayD::from_shape_vec(shape, values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_follow_configuration_keys() {
        assert_eq!("netcdf".parse::<NetcdfFormat>().unwrap(), NetcdfFormat::Classic);
        assert_eq!("netcdfLarge".parse::<NetcdfFormat>().unwrap(), NetcdfFormat::Large);
        assert_eq!("netcdf4c".parse::<NetcdfFormat>().unwrap(), NetcdfFormat::Netcdf4Compressed);
        assert_eq!(NetcdfFormat::from_config("hdf9"), NetcdfFormat::Netcdf4);
    }
}
