//! Parallel reductions over one axis
//!
//! Reductions accumulate in f64 and skip non-finite values, so fill values
//! already masked to NaN never enter a mean. Run them inside
//! [`ExecutionClient::install`](crate::parallel::ExecutionClient::install) to
//! use the client's workers instead of the global pool.

use ndarray::{stack, ArrayD, ArrayViewD, Axis, Zip};
use tracing::trace;

use crate::errors::{ReplotsError, Result};

fn check_axis(shape: &[usize], axis: usize) -> Result<()> {
    if axis >= shape.len() {
        return Err(ReplotsError::StatisticsError(format!(
            "axis {axis} out of range for a {}-d array",
            shape.len()
        )));
    }
    Ok(())
}

/// Mean of the finite values along `axis`; the axis is removed.
///
/// A cell with no finite value along the axis is NaN.
pub fn nanmean_axis(data: ArrayViewD<'_, f64>, axis: usize) -> Result<ArrayD<f64>> {
    check_axis(data.shape(), axis)?;
    trace!(shape = ?data.shape(), axis, threads = rayon::current_num_threads(), "nanmean");

    let result = Zip::from(data.lanes(Axis(axis))).par_map_collect(|lane| {
        let mut sum = 0.0_f64;
        let mut count = 0_u32;
        for &value in lane {
            if value.is_finite() {
                sum += value;
                count += 1;
            }
        }
        if count > 0 {
            sum / f64::from(count)
        } else {
            f64::NAN
        }
    });

    Ok(result)
}

/// Per-group means along `axis`.
///
/// `groups` lists the indices along `axis` that make up each group, in output
/// order. The output keeps `axis`, now of length `groups.len()`.
pub fn nanmean_groups(
    data: ArrayViewD<'_, f64>,
    axis: usize,
    groups: &[Vec<usize>],
) -> Result<ArrayD<f64>> {
    check_axis(data.shape(), axis)?;
    if groups.is_empty() {
        return Err(ReplotsError::StatisticsError(
            "no groups to average".to_string(),
        ));
    }

    let means = groups
        .iter()
        .map(|indices| nanmean_axis(data.select(Axis(axis), indices).view(), axis))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = means.iter().map(|m| m.view()).collect();

    Ok(stack(Axis(axis), &views)?)
}

/// Mean of every finite value of `data`, or NaN if there is none.
pub fn nanmean_all(data: ArrayViewD<'_, f64>) -> f64 {
    let (sum, count) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0_usize), |(s, n), &v| (s + v, n + 1));
    if count > 0 {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Per-step means over every axis but `axis`, e.g. a domain-mean time series.
pub fn nanmean_series(data: ArrayViewD<'_, f64>, axis: usize) -> Result<Vec<f64>> {
    check_axis(data.shape(), axis)?;
    Ok(data
        .axis_iter(Axis(axis))
        .map(nanmean_all)
        .collect())
}

/// Linear-interpolated percentile (0..=100) of the finite values.
pub fn nanpercentile(values: &[f64], pct: f64) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (finite.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(finite[lo] + (finite[hi] - finite[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn nanmean_skips_missing_values() {
        let data = array![[1.0, f64::NAN], [3.0, f64::NAN]].into_dyn();
        let mean = nanmean_axis(data.view(), 0).unwrap();
        assert_eq!(mean[[0]], 2.0);
        assert!(mean[[1]].is_nan());
    }

    #[test]
    fn groups_replace_the_axis() {
        let data = ArrayD::from_shape_vec(IxDyn(&[4, 2]), vec![1.0, 10.0, 3.0, 30.0, 5.0, 50.0, 7.0, 70.0])
            .unwrap();
        let out = nanmean_groups(data.view(), 0, &[vec![0, 2], vec![1, 3]]).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out[[0, 0]], 3.0);
        assert_eq!(out[[1, 1]], 50.0);
    }

    #[test]
    fn series_means_each_step() {
        let data = array![[1.0, 3.0], [f64::NAN, 4.0]].into_dyn();
        assert_eq!(nanmean_series(data.view(), 0).unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [0.0, 10.0, f64::NAN, 20.0, 30.0, 40.0];
        assert_eq!(nanpercentile(&values, 50.0), Some(20.0));
        assert_eq!(nanpercentile(&values, 2.0).map(|v| (v * 10.0).round()), Some(8.0));
        assert_eq!(nanpercentile(&[f64::NAN], 50.0), None);
    }

    #[test]
    fn bad_axis_is_an_error() {
        let data = array![1.0, 2.0].into_dyn();
        assert!(nanmean_axis(data.view(), 1).is_err());
    }
}
