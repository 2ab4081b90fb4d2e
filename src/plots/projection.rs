//! Lambert Conformal Conic projection on a sphere
//!
//! Coordinates are in earth radii; only the shape of the map matters for
//! plotting, so no ellipsoid or false easting is applied.

/// Lambert Conformal Conic projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertConformal {
    central_lon: f64,
    n: f64,
    f: f64,
    rho0: f64,
}

fn t(lat_rad: f64) -> f64 {
    (std::f64::consts::FRAC_PI_4 + lat_rad / 2.0).tan()
}

impl LambertConformal {
    /// Projection centred at `central_lon`/`central_lat` with two standard parallels (degrees).
    pub fn new(central_lon: f64, central_lat: f64, parallels: (f64, f64)) -> Self {
        let (p1, p2) = (parallels.0.to_radians(), parallels.1.to_radians());
        let n = if (p1 - p2).abs() < 1e-10 {
            p1.sin()
        } else {
            (p1.cos() / p2.cos()).ln() / (t(p2) / t(p1)).ln()
        };
        let f = p1.cos() * t(p1).powf(n) / n;
        let rho0 = f / t(central_lat.to_radians()).powf(n);
        Self {
            central_lon,
            n,
            f,
            rho0,
        }
    }

    /// Map projection used for regional ocean diagnostics.
    pub fn ocean_default() -> Self {
        Self::new(-90.0, 39.0, (33.0, 45.0))
    }

    /// Project a lon/lat point (degrees). `y` grows northwards.
    pub fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() >= 90.0 {
            return None;
        }
        let dlon = (lon - self.central_lon + 540.0).rem_euclid(360.0) - 180.0;
        let rho = self.f / t(lat.to_radians()).powf(self.n);
        let theta = self.n * dlon.to_radians();
        Some((rho * theta.sin(), self.rho0 - rho * theta.cos()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_projects_to_origin() {
        let proj = LambertConformal::ocean_default();
        let (x, y) = proj.forward(-90.0, 39.0).unwrap();
        assert!(x.abs() < 1e-12);
        assert!(y.abs() < 1e-12);
    }

    #[test]
    fn east_is_positive_x_and_north_is_positive_y() {
        let proj = LambertConformal::ocean_default();
        let (xe, _) = proj.forward(-80.0, 25.0).unwrap();
        let (xw, _) = proj.forward(-100.0, 25.0).unwrap();
        let (_, yn) = proj.forward(-90.0, 30.0).unwrap();
        let (_, ys) = proj.forward(-90.0, 20.0).unwrap();
        assert!(xe > 0.0 && xw < 0.0);
        assert!(yn > ys);
    }

    #[test]
    fn wraps_longitudes_given_in_0_360() {
        let proj = LambertConformal::ocean_default();
        let a = proj.forward(-95.0, 25.0).unwrap();
        let b = proj.forward(265.0, 25.0).unwrap();
        assert!((a.0 - b.0).abs() < 1e-12 && (a.1 - b.1).abs() < 1e-12);
    }
}
