//! Gradient colour maps

use super::canvas::Color;

/// Piecewise-linear colour gradient over `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: &'static str,
    stops: &'static [(f64, [u8; 3])],
}

const THERMAL: &[(f64, [u8; 3])] = &[
    (0.00, [4, 35, 51]),
    (0.20, [23, 51, 122]),
    (0.40, [85, 78, 177]),
    (0.55, [151, 87, 157]),
    (0.70, [212, 97, 107]),
    (0.85, [248, 147, 52]),
    (1.00, [232, 250, 91]),
];

const HALINE: &[(f64, [u8; 3])] = &[
    (0.00, [41, 24, 107]),
    (0.25, [15, 91, 144]),
    (0.50, [39, 141, 137]),
    (0.75, [114, 186, 96]),
    (1.00, [253, 239, 154]),
];

const DENSE: &[(f64, [u8; 3])] = &[
    (0.00, [230, 241, 241]),
    (0.35, [127, 176, 216]),
    (0.70, [108, 90, 194]),
    (1.00, [54, 14, 36]),
];

const BALANCE: &[(f64, [u8; 3])] = &[
    (0.00, [24, 28, 67]),
    (0.25, [58, 112, 195]),
    (0.50, [241, 236, 235]),
    (0.75, [196, 84, 60]),
    (1.00, [60, 9, 18]),
];

impl Colormap {
    pub const THERMAL: Colormap = Colormap {
        name: "thermal",
        stops: THERMAL,
    };
    pub const HALINE: Colormap = Colormap {
        name: "haline",
        stops: HALINE,
    };
    pub const DENSE: Colormap = Colormap {
        name: "dense",
        stops: DENSE,
    };
    /// Diverging map for anomalies and differences.
    pub const BALANCE: Colormap = Colormap {
        name: "balance",
        stops: BALANCE,
    };

    /// Colour map for a field, chosen from its name; differences always diverge.
    pub fn for_field(name: &str, difference: bool) -> Self {
        if difference {
            return Self::BALANCE;
        }
        match name {
            "temp" | "sst" => Self::THERMAL,
            "salt" | "sss" => Self::HALINE,
            "rho" => Self::DENSE,
            "u" | "v" | "w" | "ubar" | "vbar" | "sustr" | "svstr" | "zeta" => Self::BALANCE,
            _ => Self::THERMAL,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Colour at `t`, clamped to `[0, 1]`.
    pub fn at(&self, t: f64) -> Color {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let upper = self
            .stops
            .iter()
            .position(|&(pos, _)| pos >= t)
            .unwrap_or(self.stops.len() - 1)
            .max(1);
        let (p0, c0) = self.stops[upper - 1];
        let (p1, c1) = self.stops[upper];
        let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
        let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * f).round() as u8;
        [mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2]), 255]
    }

    /// Colour of `value` on the range `[vmin, vmax]`.
    pub fn map(&self, value: f64, vmin: f64, vmax: f64) -> Color {
        if vmax > vmin {
            self.at((value - vmin) / (vmax - vmin))
        } else {
            self.at(0.5)
        }
    }
}
