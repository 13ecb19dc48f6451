//! Named-column reflection tables: the persistence boundary of a scaling run.
//!
//! A table is a JSON object mapping column names to equal-length arrays.
//! Miller indices are `[h, k, l]` triples, positions `[x, y, z]` triples, and
//! everything else plain numbers.

use crate::domain::{
    IntegrationMethod, MillerIndex, PipelineStage, Reflection, ScalingError, ScalingResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MILLER_INDEX: &str = "miller_index";
pub const INTENSITY: &str = "intensity";
pub const VARIANCE: &str = "variance";
pub const POSITION: &str = "xyzobs.px.value";
pub const POSITION_AXES: [&str; 3] = ["x_value", "y_value", "z_value"];
pub const RESOLUTION: &str = "d";
pub const LORENTZ_POLARISATION: &str = "lp";
pub const DETECTOR_EFFICIENCY: &str = "dqe";
pub const INVERSE_SCALE_FACTOR: &str = "inverse_scale_factor";
pub const IH_VALUES: &str = "Ih_values";

/// Working columns a scaling run may leave behind; never handed back.
pub const SCRATCH_COLUMNS: [&str; 5] = [
    "asu_miller_index",
    "h_index",
    "l_bin_index",
    "a_bin_index",
    "xy_bin_index",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Miller(Vec<[i32; 3]>),
    Vec3(Vec<[f64; 3]>),
    Float(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Miller(values) => values.len(),
            Self::Vec3(values) => values.len(),
            Self::Float(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn floats(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float(values) => Some(values.clone()),
            other if other.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    /// Integer triples are accepted as positions too.
    fn triples(&self) -> Option<Vec<[f64; 3]>> {
        match self {
            Self::Vec3(values) => Some(values.clone()),
            Self::Miller(values) => Some(
                values
                    .iter()
                    .map(|v| [f64::from(v[0]), f64::from(v[1]), f64::from(v[2])])
                    .collect(),
            ),
            Self::Float(values) if values.is_empty() => Some(Vec::new()),
            Self::Float(_) => None,
        }
    }

    fn millers(&self) -> Option<Vec<MillerIndex>> {
        match self {
            Self::Miller(values) => Some(values.iter().copied().map(MillerIndex::from).collect()),
            other if other.is_empty() => Some(Vec::new()),
            _ => None,
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Self::Miller(values) => Self::Miller(rows.iter().map(|&row| values[row]).collect()),
            Self::Vec3(values) => Self::Vec3(rows.iter().map(|&row| values[row]).collect()),
            Self::Float(values) => Self::Float(rows.iter().map(|&row| values[row]).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReflectionTable {
    columns: BTreeMap<String, Column>,
}

fn load_error(placeholder: &'static str, message: impl Into<String>) -> ScalingError {
    ScalingError::data_integrity(PipelineStage::Load, placeholder, message)
}

impl ReflectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Option<Column> {
        self.columns.insert(name.into(), column)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Row count, or an error when columns disagree on it.
    pub fn n_rows(&self) -> ScalingResult<usize> {
        let mut lengths = self.columns.iter().map(|(name, column)| (name, column.len()));
        let Some((first_name, expected)) = lengths.next() else {
            return Ok(0);
        };
        for (name, len) in lengths {
            if len != expected {
                return Err(load_error(
                    "DATA.RAGGED_TABLE",
                    format!("column '{name}' has {len} rows but '{first_name}' has {expected}"),
                ));
            }
        }
        Ok(expected)
    }

    pub fn read_json(path: impl AsRef<Path>) -> ScalingResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|error| {
            ScalingError::io_system(
                PipelineStage::Load,
                "IO.TABLE_READ",
                format!("failed to read reflection table '{}': {error}", path.display()),
            )
        })?;
        let table: Self = serde_json::from_str(&source).map_err(|error| {
            ScalingError::configuration(
                PipelineStage::Load,
                "INPUT.TABLE_PARSE",
                format!("failed to parse reflection table '{}': {error}", path.display()),
            )
        })?;
        table.n_rows()?;
        Ok(table)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> ScalingResult<()> {
        let path = path.as_ref();
        let rendered = serde_json::to_string_pretty(self).map_err(|error| {
            ScalingError::internal(
                PipelineStage::Save,
                "TABLE.SERIALIZE",
                format!("failed to serialize reflection table: {error}"),
            )
        })?;
        fs::write(path, rendered).map_err(|error| {
            ScalingError::io_system(
                PipelineStage::Save,
                "IO.TABLE_WRITE",
                format!("failed to write reflection table '{}': {error}", path.display()),
            )
        })
    }

    fn required(&self, name: &str) -> ScalingResult<&Column> {
        self.column(name).ok_or_else(|| {
            load_error(
                "DATA.MISSING_COLUMN",
                format!("reflection table has no '{name}' column"),
            )
        })
    }

    fn float_column(&self, name: &str) -> ScalingResult<Vec<f64>> {
        self.required(name)?.floats().ok_or_else(|| {
            load_error(
                "DATA.COLUMN_TYPE",
                format!("column '{name}' must hold numbers"),
            )
        })
    }

    fn optional_float_column(&self, name: &str, rows: usize) -> ScalingResult<Vec<f64>> {
        if self.contains(name) {
            self.float_column(name)
        } else {
            Ok(vec![1.0; rows])
        }
    }

    /// Intensities and variances for `method`, corrected by `lp / dqe`.
    /// Tables without per-method columns must carry `intensity` and
    /// `variance` directly.
    fn intensities(&self, method: IntegrationMethod, rows: usize) -> ScalingResult<(Vec<f64>, Vec<f64>)> {
        let prefix = method.resolved().column_prefix();
        let value_name = format!("{prefix}.value");
        let variance_name = format!("{prefix}.variance");
        if !self.contains(&value_name) {
            return Ok((self.float_column(INTENSITY)?, self.float_column(VARIANCE)?));
        }

        let values = self.float_column(&value_name)?;
        let variances = self.float_column(&variance_name)?;
        let lp = self.optional_float_column(LORENTZ_POLARISATION, rows)?;
        let dqe = self.optional_float_column(DETECTOR_EFFICIENCY, rows)?;
        let correction: Vec<f64> = lp.iter().zip(&dqe).map(|(lp, dqe)| lp / dqe).collect();
        Ok((
            values.iter().zip(&correction).map(|(value, c)| value * c).collect(),
            variances
                .iter()
                .zip(&correction)
                .map(|(variance, c)| variance * c * c)
                .collect(),
        ))
    }

    fn positions(&self, rows: usize) -> ScalingResult<Vec<[f64; 3]>> {
        if let Some(column) = self.column(POSITION) {
            return column.triples().ok_or_else(|| {
                load_error(
                    "DATA.COLUMN_TYPE",
                    format!("column '{POSITION}' must hold [x, y, z] triples"),
                )
            });
        }
        let [x, y, z] = POSITION_AXES;
        let (x, y, z) = (self.float_column(x)?, self.float_column(y)?, self.float_column(z)?);
        Ok((0..rows).map(|row| [x[row], y[row], z[row]]).collect())
    }

    /// Builds one [`Reflection`] per row, remembering the row it came from.
    pub fn to_reflections(&self, method: IntegrationMethod) -> ScalingResult<Vec<Reflection>> {
        let rows = self.n_rows()?;
        let millers = self.required(MILLER_INDEX)?.millers().ok_or_else(|| {
            load_error(
                "DATA.COLUMN_TYPE",
                format!("column '{MILLER_INDEX}' must hold integer [h, k, l] triples"),
            )
        })?;
        let (intensities, variances) = self.intensities(method, rows)?;
        let positions = self.positions(rows)?;
        let resolution = self.float_column(RESOLUTION)?;

        Ok((0..rows)
            .map(|row| {
                Reflection::new(
                    millers[row],
                    intensities[row],
                    variances[row],
                    positions[row],
                    resolution[row],
                )
                .with_source_row(row)
            })
            .collect())
    }

    /// The rows `reflections` came from, in their order, with every original
    /// column plus `inverse_scale_factor` and `Ih_values`. Scratch columns
    /// are dropped.
    pub fn with_scaling_results(&self, reflections: &[Reflection]) -> ScalingResult<Self> {
        let rows = self.n_rows()?;
        let selection: Vec<usize> = reflections.iter().map(|r| r.source_row).collect();
        if let Some(&row) = selection.iter().find(|&&row| row >= rows) {
            return Err(ScalingError::internal(
                PipelineStage::Save,
                "TABLE.ROW_OUT_OF_RANGE",
                format!("reflection refers to row {row} of a {rows}-row table"),
            ));
        }

        let mut columns: BTreeMap<String, Column> = self
            .columns
            .iter()
            .filter(|(name, _)| !SCRATCH_COLUMNS.contains(&name.as_str()))
            .map(|(name, column)| (name.clone(), column.select(&selection)))
            .collect();
        columns.insert(
            INVERSE_SCALE_FACTOR.to_string(),
            Column::Float(reflections.iter().map(|r| r.inverse_scale_factor).collect()),
        );
        columns.insert(
            IH_VALUES.to_string(),
            Column::Float(reflections.iter().map(|r| r.ih).collect()),
        );
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, MILLER_INDEX, ReflectionTable};
    use crate::domain::{IntegrationMethod, MillerIndex, ScalingErrorCategory};

    fn base_table() -> ReflectionTable {
        ReflectionTable::new()
            .with_column(MILLER_INDEX, Column::Miller(vec![[1, 0, 0], [0, 0, 2]]))
            .with_column("d", Column::Float(vec![2.0, 3.0]))
            .with_column(
                "xyzobs.px.value",
                Column::Vec3(vec![[1.5, 2.5, 0.5], [3.5, 4.5, 9.5]]),
            )
    }

    #[test]
    fn profile_intensities_are_lp_and_dqe_corrected() {
        let table = base_table()
            .with_column("intensity.prf.value", Column::Float(vec![10.0, 20.0]))
            .with_column("intensity.prf.variance", Column::Float(vec![4.0, 9.0]))
            .with_column("intensity.sum.value", Column::Float(vec![11.0, 21.0]))
            .with_column("intensity.sum.variance", Column::Float(vec![5.0, 10.0]))
            .with_column("lp", Column::Float(vec![2.0, 1.0]))
            .with_column("dqe", Column::Float(vec![0.5, 1.0]));

        let reflections = table
            .to_reflections(IntegrationMethod::Combine)
            .expect("profile columns should load");
        assert_eq!(reflections[0].intensity, 40.0);
        assert_eq!(reflections[0].variance, 64.0);
        assert_eq!(reflections[1].intensity, 20.0);
        assert_eq!(reflections[1].miller_index, MillerIndex::new(0, 0, 2));
        assert_eq!(reflections[1].z, 9.5);
        assert_eq!(reflections[1].source_row, 1);

        let summed = table
            .to_reflections(IntegrationMethod::Sum)
            .expect("summation columns should load");
        assert_eq!(summed[1].intensity, 21.0);
    }

    #[test]
    fn plain_intensity_columns_and_split_positions_are_accepted() {
        let table = ReflectionTable::new()
            .with_column(MILLER_INDEX, Column::Miller(vec![[1, 1, 1]]))
            .with_column("intensity", Column::Float(vec![7.0]))
            .with_column("variance", Column::Float(vec![2.0]))
            .with_column("x_value", Column::Float(vec![1.0]))
            .with_column("y_value", Column::Float(vec![2.0]))
            .with_column("z_value", Column::Float(vec![3.0]))
            .with_column("d", Column::Float(vec![1.8]));

        let reflections = table
            .to_reflections(IntegrationMethod::Prf)
            .expect("plain columns should load");
        assert_eq!(reflections[0].intensity, 7.0);
        assert_eq!([reflections[0].x, reflections[0].y, reflections[0].z], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_and_ragged_columns_are_data_errors() {
        let error = base_table()
            .to_reflections(IntegrationMethod::Prf)
            .expect_err("table without intensities should fail");
        assert_eq!(error.category(), ScalingErrorCategory::DataIntegrityError);
        assert_eq!(error.placeholder(), "DATA.MISSING_COLUMN");

        let ragged = base_table().with_column("intensity", Column::Float(vec![1.0]));
        assert_eq!(
            ragged.n_rows().expect_err("ragged table should fail").placeholder(),
            "DATA.RAGGED_TABLE"
        );
    }

    #[test]
    fn json_columns_deserialize_by_shape() {
        let table: ReflectionTable = serde_json::from_str(
            r#"{"miller_index": [[1, 2, 3]], "xyzobs.px.value": [[1, 2, 3]], "d": [2]}"#,
        )
        .expect("table json should parse");
        assert_eq!(table.column("d"), Some(&Column::Float(vec![2.0])));
        // Integer positions parse as triples of integers and are widened on use.
        assert!(matches!(table.column("xyzobs.px.value"), Some(Column::Miller(_))));
        assert_eq!(table.n_rows().expect("consistent table"), 1);
    }

    #[test]
    fn scaling_results_follow_reflection_order_and_drop_scratch_columns() {
        let table = base_table()
            .with_column("intensity", Column::Float(vec![10.0, 20.0]))
            .with_column("variance", Column::Float(vec![1.0, 1.0]))
            .with_column("h_index", Column::Float(vec![0.0, 1.0]));
        let mut reflections = table
            .to_reflections(IntegrationMethod::Prf)
            .expect("plain columns should load");
        reflections.reverse();
        reflections[0].inverse_scale_factor = 2.0;
        reflections[0].ih = 10.0;

        let output = table
            .with_scaling_results(&reflections[..1])
            .expect("rows are in range");
        assert_eq!(output.n_rows().expect("consistent output"), 1);
        assert_eq!(output.column("intensity"), Some(&Column::Float(vec![20.0])));
        assert_eq!(output.column("inverse_scale_factor"), Some(&Column::Float(vec![2.0])));
        assert_eq!(output.column("Ih_values"), Some(&Column::Float(vec![10.0])));
        assert!(!output.contains("h_index"));
    }
}
