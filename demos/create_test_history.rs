//! Creates a small synthetic ocean-model archive for trying out RePlots.
//!
//! Writes one history file per month on a curvilinear Gulf of Mexico-like
//! grid with terrain-following levels, plus a case file pointing at it:
//!
//! ```text
//! cargo run --example create_test_history -- demo_archive 24
//! cargo run -- --config demo_archive/replots.toml climatology
//! cargo run -- --config demo_archive/replots.toml diagnostics --skip-tool-check
//! ```

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Months, NaiveDate};
use ndarray::{arr0, Array, Array2, Array3, Array4};

const CASE: &str = "gom_demo";
const PREFIX: &str = "gom_demo.ocn.hi";
const ETA: usize = 20;
const XI: usize = 24;
const LEVELS: usize = 5;
const FILL: f64 = 1.0e37;
const HC: f64 = 20.0;

fn lon_at(j: f64) -> f64 {
    -98.0 + j * 18.0 / (XI - 1) as f64
}

fn lat_at(i: f64, j: f64) -> f64 {
    // slightly sheared so the grid is curvilinear
    18.0 + i * 13.0 / (ETA - 1) as f64 + 0.02 * j
}

fn bathymetry(i: usize, j: usize) -> f64 {
    let r = ((i as f64 - 8.0).powi(2) + (j as f64 - 12.0).powi(2)).sqrt();
    (3500.0 - 250.0 * r).max(30.0)
}

fn is_land(i: usize, j: usize) -> bool {
    i >= 16 && j + i >= 34
}

/// S-coordinate values and stretching curve, bottom (-1) to surface (0).
fn s_levels(count: usize, w_points: bool) -> (Vec<f64>, Vec<f64>) {
    (0..count)
        .map(|k| {
            let s = if w_points {
                -1.0 + k as f64 / (count - 1) as f64
            } else {
                -1.0 + (k as f64 + 0.5) / count as f64
            };
            (s, -(-s).powf(1.5))
        })
        .unzip()
}

fn add_grid_var(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    data: &Array2<f64>,
    units: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut var = file.add_variable::<f64>(name, dims)?;
    var.put_attribute("units", units)?;
    var.put(data.view(), ..)?;
    Ok(())
}

fn add_field<D: ndarray::Dimension>(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    data: &Array<f64, D>,
    long_name: &str,
    units: &str,
    coordinates: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut var = file.add_variable::<f64>(name, dims)?;
    var.put_attribute("long_name", long_name)?;
    var.put_attribute("units", units)?;
    var.put_attribute("coordinates", coordinates)?;
    var.put_attribute("grid", "grid")?;
    var.put_attribute("_FillValue", FILL)?;
    var.put(data.view(), ..)?;
    Ok(())
}

fn masked(value: f64, i: usize, j: usize) -> f64 {
    if is_land(i, j) {
        FILL
    } else {
        value
    }
}

fn write_month(path: &Path, date: NaiveDate, step: usize) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = netcdf::create(path)?;
    file.add_attribute("title", "RePlots synthetic history file")?;
    file.add_attribute("type", "ROMS/TOMS history file")?;

    for (name, len) in [
        ("ocean_time", 1),
        ("eta_rho", ETA),
        ("xi_rho", XI),
        ("eta_u", ETA),
        ("xi_u", XI - 1),
        ("eta_v", ETA - 1),
        ("xi_v", XI),
        ("s_rho", LEVELS),
        ("s_w", LEVELS + 1),
    ] {
        file.add_dimension(name, len)?;
    }

    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).ok_or("invalid epoch")?;
    let seconds = (date - epoch).num_seconds() as f64;
    {
        let mut time = file.add_variable::<f64>("ocean_time", &["ocean_time"])?;
        time.put_attribute("long_name", "time since initialization")?;
        time.put_attribute("units", "seconds since 1900-01-01 00:00:00")?;
        time.put_attribute("calendar", "standard")?;
        time.put_values(&[seconds], ..)?;
    }

    let lon_rho = Array2::from_shape_fn((ETA, XI), |(_, j)| lon_at(j as f64));
    let lat_rho = Array2::from_shape_fn((ETA, XI), |(i, j)| lat_at(i as f64, j as f64));
    let lon_u = Array2::from_shape_fn((ETA, XI - 1), |(_, j)| lon_at(j as f64 + 0.5));
    let lat_u = Array2::from_shape_fn((ETA, XI - 1), |(i, j)| lat_at(i as f64, j as f64 + 0.5));
    let lon_v = Array2::from_shape_fn((ETA - 1, XI), |(_, j)| lon_at(j as f64));
    let lat_v = Array2::from_shape_fn((ETA - 1, XI), |(i, j)| lat_at(i as f64 + 0.5, j as f64));
    add_grid_var(&mut file, "lon_rho", &["eta_rho", "xi_rho"], &lon_rho, "degree_east")?;
    add_grid_var(&mut file, "lat_rho", &["eta_rho", "xi_rho"], &lat_rho, "degree_north")?;
    add_grid_var(&mut file, "lon_u", &["eta_u", "xi_u"], &lon_u, "degree_east")?;
    add_grid_var(&mut file, "lat_u", &["eta_u", "xi_u"], &lat_u, "degree_north")?;
    add_grid_var(&mut file, "lon_v", &["eta_v", "xi_v"], &lon_v, "degree_east")?;
    add_grid_var(&mut file, "lat_v", &["eta_v", "xi_v"], &lat_v, "degree_north")?;
    let h = Array2::from_shape_fn((ETA, XI), |(i, j)| bathymetry(i, j));
    add_grid_var(&mut file, "h", &["eta_rho", "xi_rho"], &h, "meter")?;

    {
        let mut hc = file.add_variable::<f64>("hc", &[])?;
        hc.put_attribute("long_name", "S-coordinate parameter, critical depth")?;
        hc.put(arr0(HC).view(), &[] as &[usize])?;
    }
    for (s_name, c_name, dim, w_points) in [
        ("s_rho", "Cs_r", "s_rho", false),
        ("s_w", "Cs_w", "s_w", true),
    ] {
        let count = if w_points { LEVELS + 1 } else { LEVELS };
        let (s, c) = s_levels(count, w_points);
        let mut s_var = file.add_variable::<f64>(s_name, &[dim])?;
        s_var.put_values(&s, ..)?;
        let mut c_var = file.add_variable::<f64>(c_name, &[dim])?;
        c_var.put_values(&c, ..)?;
    }

    let season = (2.0 * PI * step as f64 / 12.0).cos();
    let zeta = Array3::from_shape_fn((1, ETA, XI), |(_, i, j)| {
        masked(0.3 * (j as f64 / 4.0).sin() + 0.1 * season, i, j)
    });
    let sustr = Array3::from_shape_fn((1, ETA, XI - 1), |(_, i, j)| {
        masked(0.05 * (i as f64 / 5.0).cos() * (1.0 + 0.5 * season), i, j)
    });
    let svstr = Array3::from_shape_fn((1, ETA - 1, XI), |(_, i, j)| {
        masked(0.03 * (j as f64 / 6.0).sin(), i, j)
    });
    let (s_rho, _) = s_levels(LEVELS, false);
    let temp = Array4::from_shape_fn((1, LEVELS, ETA, XI), |(_, k, i, j)| {
        let depth = -s_rho[k] * bathymetry(i, j);
        masked(4.0 + 24.0 * (-depth / 600.0).exp() + 2.0 * season - 0.2 * i as f64, i, j)
    });
    let salt = Array4::from_shape_fn((1, LEVELS, ETA, XI), |(_, k, i, j)| {
        masked(36.4 - 0.6 * (s_rho[k] + 1.0) + 0.02 * j as f64, i, j)
    });
    let u = Array4::from_shape_fn((1, LEVELS, ETA, XI - 1), |(_, k, i, j)| {
        masked(0.2 * (i as f64 / 3.0).sin() * (s_rho[k] + 1.0), i, j)
    });
    let v = Array4::from_shape_fn((1, LEVELS, ETA - 1, XI), |(_, k, i, j)| {
        masked(0.15 * (j as f64 / 3.0).cos() * (s_rho[k] + 1.0), i, j)
    });

    add_field(&mut file, "zeta", &["ocean_time", "eta_rho", "xi_rho"], &zeta, "free-surface", "meter", "lon_rho lat_rho ocean_time")?;
    add_field(&mut file, "sustr", &["ocean_time", "eta_u", "xi_u"], &sustr, "surface u-momentum stress", "newton meter-2", "lon_u lat_u ocean_time")?;
    add_field(&mut file, "svstr", &["ocean_time", "eta_v", "xi_v"], &svstr, "surface v-momentum stress", "newton meter-2", "lon_v lat_v ocean_time")?;
    add_field(&mut file, "temp", &["ocean_time", "s_rho", "eta_rho", "xi_rho"], &temp, "potential temperature", "Celsius", "lon_rho lat_rho s_rho ocean_time")?;
    add_field(&mut file, "salt", &["ocean_time", "s_rho", "eta_rho", "xi_rho"], &salt, "salinity", "psu", "lon_rho lat_rho s_rho ocean_time")?;
    add_field(&mut file, "u", &["ocean_time", "s_rho", "eta_u", "xi_u"], &u, "u-momentum component", "meter second-1", "lon_u lat_u s_rho ocean_time")?;
    add_field(&mut file, "v", &["ocean_time", "s_rho", "eta_v", "xi_v"], &v, "v-momentum component", "meter second-1", "lon_v lat_v s_rho ocean_time")?;
    Ok(())
}

fn write_case_file(root: &Path, months: usize, end: NaiveDate) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let root = fs::canonicalize(root)?;
    let path = root.join("replots.toml");
    let text = format!(
        r#"CASE = "{CASE}"
DOUT_PATHS = ["{archive}"]
MODELCASE_SUBDIR = "hist"
YEAR0 = "2010-01-01"
YEAR1 = "{end}"
MODEL_VARLIST = ["zeta", "sustr", "svstr", "temp", "salt", "u", "v"]
TAVGDIR = "{tavg}"
WORKDIR = "{work}"
MODEL = true
MODEL_TIMESERIES = {series}

[plots]
width = 900
height = 800
depths = [0.0, 50.0, 100.0, 500.0, 1000.0]
"#,
        archive = root.display(),
        end = end.format("%Y-%m-%d"),
        tavg = root.join("tavg").display(),
        work = root.join("diag").display(),
        series = months > 1,
    );
    fs::write(&path, text)?;
    Ok(path)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let root = PathBuf::from(args.next().unwrap_or_else(|| "demo_archive".to_string()));
    let months: usize = args.next().map(|m| m.parse()).transpose()?.unwrap_or(24);

    let hist = root.join("hist");
    fs::create_dir_all(&hist)?;
    println!("🔨 Creating {months} monthly history files in {}", hist.display());

    let start = NaiveDate::from_ymd_opt(2010, 1, 1).ok_or("invalid start date")?;
    let mut last = start;
    for step in 0..months {
        let date = start
            .checked_add_months(Months::new(step as u32))
            .ok_or("date overflow")?;
        let path = hist.join(format!("{PREFIX}.{}.nc", date.format("%Y-%m-%d")));
        write_month(&path, date, step)?;
        last = date;
    }

    let case_file = write_case_file(&root, months, last)?;
    println!("✅ Successfully created synthetic archive with:");
    println!("   📏 Grid: eta_rho({ETA}) xi_rho({XI}) s_rho({LEVELS}), u/v staggered");
    println!("   📈 Variables: zeta, sustr, svstr, temp, salt, u, v");
    println!("   🗂️  Case file: {}", case_file.display());
    println!("\n🧪 Try:");
    println!("   cargo run -- --config {} climatology", case_file.display());
    println!("   cargo run -- --config {} diagnostics --skip-tool-check", case_file.display());
    Ok(())
}
