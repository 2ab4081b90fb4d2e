//! Statistical reductions used by climatologies and plots
//!
//! # Organization
//!
//! - [`parallel`]: NaN-skipping reductions along an axis, parallel over output cells
//! - [`grouping`]: calendar grouping of time steps

pub mod grouping;
pub mod parallel;

pub use grouping::TimeGroups;
pub use parallel::{nanmean_all, nanmean_axis, nanmean_groups, nanmean_series, nanpercentile};
