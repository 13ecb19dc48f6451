/// Widening applied to the outermost breakpoints of every equal-width binning.
pub const BIN_EDGE_EPSILON: f64 = 1.0e-5;

/// Reflections with intensity/sigma at or below this floor never reach scaling.
pub const DEFAULT_SANITY_FLOOR: f64 = -2.0;

/// Half-open `(lower, upper]` resolution screen applied by the filter stage.
pub const DEFAULT_RESOLUTION_SCREEN: (f64, f64) = (-1.0, 0.0);

/// Inner radial band edges as fractions of the detector half-height.
pub const RADIAL_BAND_FRACTIONS: [f64; 2] = [1.0 / 3.0, 2.0 / 3.0];
pub const RADIAL_BAND_COUNT: usize = RADIAL_BAND_FRACTIONS.len() + 1;

pub const DEFAULT_ANGULAR_SECTORS: usize = 8;

pub const DEFAULT_OUTLIER_TOLERANCE: f64 = 6.0;
pub const DEFAULT_OUTLIER_MAX_ITERATIONS: usize = 4;

pub const DEFAULT_MINIMIZER_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_MINIMIZER_TOLERANCE: f64 = 1.0e-8;
pub const DEFAULT_MINIMIZER_DAMPING: f64 = 1.0e-3;

/// Upper bound on the order of a generated point group (m-3m).
pub const MAX_POINT_GROUP_ORDER: usize = 48;
