//! Climatology averaging pipeline
//!
//! An average is either the unconditional mean over the time dimension
//! (`time`) or a mean per calendar group (`month`, `season`, `year`, ...).
//! Each average is written to `{out_dir}/{case_prefix}.{avgtype}.nc`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use netcdf::AttributeValue;
use tracing::{debug, info};

use crate::calendar::{CalendarField, SEASONS};
use crate::config::CaseConfig;
use crate::dataset::{DatasetHandle, DatasetSchema, VariableSchema};
use crate::errors::{ReplotsError, Result};
use crate::file_selector;
use crate::netcdf_io::{ClimatologyWriter, GroupCoordinate, NetcdfFormat, OutputVariable};
use crate::parallel::ClientMode;
use crate::statistics::{nanmean_axis, nanmean_groups, TimeGroups};

/// Kind of average to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvgType {
    /// Mean over the whole period; the time axis is removed.
    Time,
    /// Mean per calendar group; the time axis becomes the group axis.
    Grouped(CalendarField),
}

impl FromStr for AvgType {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time" => Ok(Self::Time),
            other => other.parse().map(Self::Grouped),
        }
    }
}

impl fmt::Display for AvgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => f.write_str("time"),
            Self::Grouped(field) => f.write_str(field.as_str()),
        }
    }
}

/// Output path of one climatology file.
pub fn climatology_path(out_dir: &Path, case_prefix: &str, avgtype: &str) -> PathBuf {
    out_dir.join(format!("{case_prefix}.{avgtype}.nc"))
}

fn group_coordinate(groups: &TimeGroups) -> GroupCoordinate {
    let field = groups.field;
    let mut attributes = vec![(
        "long_name".to_string(),
        AttributeValue::Str(field.as_str().to_string()),
    )];
    if field == CalendarField::Season {
        let meanings: Vec<&str> = groups
            .keys
            .iter()
            .filter_map(|&k| usize::try_from(k).ok().and_then(|i| SEASONS.get(i).copied()))
            .collect();
        let flags: Vec<i32> = groups.keys.iter().map(|&k| k as i32).collect();
        attributes.push(("flag_values".to_string(), AttributeValue::Ints(flags)));
        attributes.push((
            "flag_meanings".to_string(),
            AttributeValue::Str(meanings.join(" ")),
        ));
    }
    GroupCoordinate {
        name: field.as_str().to_string(),
        values: groups.keys.clone(),
        attributes,
    }
}

/// Names of the variables to average. An empty request means every
/// time-varying variable.
fn resolve_targets<'s>(schema: &'s DatasetSchema, variables: &[String]) -> Result<Vec<&'s VariableSchema>> {
    if variables.is_empty() {
        return Ok(schema.time_varying().collect());
    }
    variables.iter().map(|name| schema.variable(name)).collect()
}

/// Static variables carried into the output unchanged: everything when all
/// variables are averaged, otherwise the coordinates the targets refer to.
fn carried_variables<'s>(
    schema: &'s DatasetSchema,
    targets: &[&VariableSchema],
    all: bool,
) -> Vec<&'s VariableSchema> {
    let referenced: Vec<&str> = targets
        .iter()
        .filter_map(|v| v.text_attribute("coordinates"))
        .flat_map(str::split_whitespace)
        .collect();

    schema
        .variables
        .iter()
        .filter(|v| !v.has_time())
        .filter(|v| !targets.iter().any(|t| t.name == v.name))
        .filter(|v| {
            all || referenced.contains(&v.name.as_str())
                || (v.dims.len() == 1
                    && v.dims[0] == v.name
                    && targets.iter().any(|t| t.dims.contains(&v.name)))
        })
        .collect()
}

/// Compute one average and write it to `{out_dir}/{case_prefix}.{avgtype}.nc`.
pub fn average(
    dataset: &DatasetHandle,
    out_dir: &Path,
    case_prefix: &str,
    variables: &[String],
    time_dim: &str,
    avgtype: &str,
) -> Result<PathBuf> {
    average_with_format(
        dataset,
        out_dir,
        case_prefix,
        variables,
        time_dim,
        avgtype,
        NetcdfFormat::default(),
    )
}

/// [`average`] with an explicit output format.
pub fn average_with_format(
    dataset: &DatasetHandle,
    out_dir: &Path,
    case_prefix: &str,
    variables: &[String],
    time_dim: &str,
    avgtype: &str,
    format: NetcdfFormat,
) -> Result<PathBuf> {
    let kind: AvgType = avgtype.parse()?;
    let schema = dataset.schema()?;
    let targets = resolve_targets(schema, variables)?;
    info!(avgtype, variables = targets.len(), "computing climatology");

    let groups = match kind {
        AvgType::Time => None,
        AvgType::Grouped(field) => {
            let dates = dataset.read_time(time_dim)?;
            let groups = TimeGroups::new(field, &dates);
            debug!(avgtype, keys = ?groups.keys, "time steps grouped");
            Some(groups)
        }
    };

    let mut outputs = Vec::new();
    for var in &targets {
        let data = dataset.read_variable(&var.name)?;
        let Some(axis) = var.dims.iter().position(|d| d == time_dim) else {
            outputs.push(OutputVariable {
                name: var.name.clone(),
                dims: var.dims.clone(),
                data,
                attributes: var.attributes.clone(),
            });
            continue;
        };

        let reduce = || match &groups {
            None => nanmean_axis(data.view(), axis),
            Some(g) => nanmean_groups(data.view(), axis, &g.indices),
        };
        let mean = match dataset.client() {
            Some(client) => client.install(reduce)?,
            None => reduce()?,
        };

        let mut dims = var.dims.clone();
        match kind {
            AvgType::Time => {
                dims.remove(axis);
            }
            AvgType::Grouped(field) => dims[axis] = field.as_str().to_string(),
        }
        outputs.push(OutputVariable {
            name: var.name.clone(),
            dims,
            data: mean,
            attributes: var.attributes.clone(),
        });
    }

    for var in carried_variables(schema, &targets, variables.is_empty()) {
        outputs.push(OutputVariable {
            name: var.name.clone(),
            dims: var.dims.clone(),
            data: dataset.read_variable(&var.name)?,
            attributes: var.attributes.clone(),
        });
    }

    fs::create_dir_all(out_dir)?;
    let path = climatology_path(out_dir, case_prefix, avgtype);
    let coordinate = groups.as_ref().map(group_coordinate);
    ClimatologyWriter::new(&path, format, &schema.global_attributes).write(
        coordinate.as_ref(),
        &outputs,
        &format!("{avgtype} average over {time_dim}"),
    )?;

    info!(path = %path.display(), "climatology written");
    Ok(path)
}

/// Compute every requested average as one batch on the dataset's client.
///
/// Each average type is an independent work unit; failures are collected
/// into [`ReplotsError::BatchFailed`].
pub fn create_clim_files(
    dataset: &DatasetHandle,
    out_dir: &Path,
    case_prefix: &str,
    avg_types: &[String],
    variables: &[String],
    time_dim: &str,
    format: NetcdfFormat,
) -> Result<Vec<PathBuf>> {
    let client = dataset.require_client()?;
    for avgtype in avg_types {
        avgtype.parse::<AvgType>()?;
    }
    client.run_batch(avg_types, |avgtype| {
        average_with_format(
            dataset,
            out_dir,
            case_prefix,
            variables,
            time_dim,
            avgtype,
            format,
        )
    })
}

/// Select the case's history files, open them and write every configured
/// climatology to `TAVGDIR`.
///
/// With `control` set the control case (`CNTRLCASE`, `CNTRLCASEDIR`, ...)
/// is averaged instead. The client is stopped before returning.
pub fn run_case(
    config: &CaseConfig,
    control: bool,
    mode: ClientMode,
    threads: Option<usize>,
) -> Result<Vec<PathBuf>> {
    let selection = config.history_selection(control)?;
    let out_dir = config.tavgdir()?;
    let files = file_selector::select(
        &selection.roots,
        &selection.case,
        &config.comp,
        &config.suffix,
        &selection.subdir,
        &selection.start_date,
        &selection.end_date,
        &config.date_pattern,
    )?;

    let mut dataset = DatasetHandle::new().with_time_dim(config.time_dim.clone());
    dataset.open(&files)?;
    dataset.start_client_with(mode, threads)?;

    let case_prefix = format!("{}.{}.{}", selection.case, config.comp, config.suffix);
    let result = create_clim_files(
        &dataset,
        out_dir,
        &case_prefix,
        &config.avg_types,
        &selection.variables,
        &config.time_dim,
        NetcdfFormat::from_config(&config.netcdf_format),
    );
    dataset.stop_client();
    result
}
