//! Synthetic history files shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3, Array4};
use netcdf::create;

pub const ETA: usize = 3;
pub const XI: usize = 4;
pub const LEVELS: usize = 2;
pub const FILL: f64 = -9999.0;

/// Day of year (0-based) at the start of each month on a 365-day calendar.
const MONTH_START: [f64; 12] = [
    0.0, 31.0, 59.0, 90.0, 120.0, 151.0, 181.0, 212.0, 243.0, 273.0, 304.0, 334.0,
];

/// Mid-month offsets in days since 2010-01-01 (noleap) for `count` months from `first`.
pub fn monthly_days(first: usize, count: usize) -> Vec<f64> {
    (first..first + count)
        .map(|m| (m / 12) as f64 * 365.0 + MONTH_START[m % 12] + 14.0)
        .collect()
}

/// Write a history file with `zeta(ocean_time, eta_rho, xi_rho)` and
/// `temp(ocean_time, s_rho, eta_rho, xi_rho)`.
///
/// `value(step)` gives the ocean value of step `step` (index into `days`);
/// temp adds 10 per level. Cell `[0, 0]` is land (fill value).
pub fn write_history(path: &Path, days: &[f64], value: impl Fn(usize) -> f64) -> PathBuf {
    let n = days.len();
    let mut file = create(path).expect("Failed to create history file");
    file.add_attribute("title", "test history").expect("Failed to add title");

    file.add_dimension("ocean_time", n).expect("Failed to add ocean_time");
    file.add_dimension("eta_rho", ETA).expect("Failed to add eta_rho");
    file.add_dimension("xi_rho", XI).expect("Failed to add xi_rho");
    file.add_dimension("s_rho", LEVELS).expect("Failed to add s_rho");

    {
        let mut time = file
            .add_variable::<f64>("ocean_time", &["ocean_time"])
            .expect("Failed to add time variable");
        time.put_attribute("units", "days since 2010-01-01 00:00:00").unwrap();
        time.put_attribute("calendar", "noleap").unwrap();
        time.put(Array1::from(days.to_vec()).view(), ..).expect("Failed to write time");
    }

    {
        let lon = Array2::from_shape_fn((ETA, XI), |(_, j)| -95.0 + 2.0 * j as f64);
        let lat = Array2::from_shape_fn((ETA, XI), |(i, _)| 22.0 + 2.0 * i as f64);
        let mut lon_var = file.add_variable::<f64>("lon_rho", &["eta_rho", "xi_rho"]).unwrap();
        lon_var.put_attribute("units", "degree_east").unwrap();
        lon_var.put(lon.view(), ..).unwrap();
        let mut lat_var = file.add_variable::<f64>("lat_rho", &["eta_rho", "xi_rho"]).unwrap();
        lat_var.put_attribute("units", "degree_north").unwrap();
        lat_var.put(lat.view(), ..).unwrap();
        let mut z = file.add_variable::<f64>("z_rho", &["s_rho"]).unwrap();
        z.put_values(&[-200.0, -10.0], ..).unwrap();
    }

    let land = |i: usize, j: usize| i == 0 && j == 0;
    {
        let zeta = Array3::from_shape_fn((n, ETA, XI), |(t, i, j)| if land(i, j) { FILL } else { value(t) });
        let mut var = file
            .add_variable::<f64>("zeta", &["ocean_time", "eta_rho", "xi_rho"])
            .expect("Failed to add zeta");
        var.put_attribute("long_name", "free-surface").unwrap();
        var.put_attribute("units", "meter").unwrap();
        var.put_attribute("coordinates", "lon_rho lat_rho ocean_time").unwrap();
        var.put_attribute("grid", "grid").unwrap();
        var.put_attribute("_FillValue", FILL).unwrap();
        var.put(zeta.view(), ..).expect("Failed to write zeta");
    }
    {
        let temp = Array4::from_shape_fn((n, LEVELS, ETA, XI), |(t, k, i, j)| {
            if land(i, j) {
                FILL
            } else {
                value(t) + 10.0 * k as f64
            }
        });
        let mut var = file
            .add_variable::<f64>("temp", &["ocean_time", "s_rho", "eta_rho", "xi_rho"])
            .expect("Failed to add temp");
        var.put_attribute("long_name", "potential temperature").unwrap();
        var.put_attribute("units", "Celsius").unwrap();
        var.put_attribute("coordinates", "lon_rho lat_rho s_rho ocean_time").unwrap();
        var.put_attribute("_FillValue", FILL).unwrap();
        var.put(temp.view(), ..).expect("Failed to write temp");
    }

    path.to_path_buf()
}

/// Empty placeholder file, enough for name-based selection.
pub fn touch(path: &Path) -> PathBuf {
    std::fs::write(path, b"").expect("Failed to touch file");
    path.to_path_buf()
}
