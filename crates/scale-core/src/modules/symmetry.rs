//! Symmetry mapping onto the canonical (asu) miller index.
//!
//! The engine only depends on [`SymmetryMapper`]; [`LaueGroup`] is the bundled
//! implementation built from integer rotation operators plus inversion.

use crate::common::config::SymmetrySpec;
use crate::common::constants::MAX_POINT_GROUP_ORDER;
use crate::domain::MillerIndex;

pub type Operator = [[i32; 3]; 3];

const IDENTITY: Operator = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];
const INVERSION: Operator = [[-1, 0, 0], [0, -1, 0], [0, 0, -1]];
const FOUR_FOLD_Z: Operator = [[0, -1, 0], [1, 0, 0], [0, 0, 1]];
const THREE_FOLD_DIAGONAL: Operator = [[0, 0, 1], [1, 0, 0], [0, 1, 0]];
const TWO_FOLD_X: Operator = [[1, 0, 0], [0, -1, 0], [0, 0, -1]];
const TWO_FOLD_Y: Operator = [[-1, 0, 0], [0, 1, 0], [0, 0, -1]];
const TWO_FOLD_Z: Operator = [[-1, 0, 0], [0, -1, 0], [0, 0, 1]];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymmetryError {
    #[error("unknown Laue class '{0}' (expected one of -1, 2/m, mmm, 4/mmm, m-3m)")]
    UnknownLaueClass(String),
    #[error("operator {index} has determinant {determinant}, expected +1 or -1")]
    NonUnimodularOperator { index: usize, determinant: i32 },
    #[error("operators generate more than {limit} elements")]
    GroupTooLarge { limit: usize },
    #[error("index {index} maps outside the integer range")]
    IndexOverflow { index: MillerIndex },
}

pub trait SymmetryMapper {
    fn canonicalize(&self, index: MillerIndex) -> Result<MillerIndex, SymmetryError>;
}

/// Centrosymmetric point group acting on miller indices as `R * h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaueGroup {
    operators: Vec<Operator>,
}

impl LaueGroup {
    pub fn from_generators(generators: &[Operator]) -> Result<Self, SymmetryError> {
        for (index, generator) in generators.iter().enumerate() {
            let determinant = determinant(generator);
            if determinant.abs() != 1 {
                return Err(SymmetryError::NonUnimodularOperator { index, determinant });
            }
        }

        let mut operators = vec![IDENTITY];
        let mut frontier = vec![IDENTITY];
        let seeds: Vec<Operator> = generators
            .iter()
            .copied()
            .chain(std::iter::once(INVERSION))
            .collect();

        while let Some(current) = frontier.pop() {
            for seed in &seeds {
                let product = compose(seed, &current);
                if operators.contains(&product) {
                    continue;
                }
                if operators.len() == MAX_POINT_GROUP_ORDER {
                    return Err(SymmetryError::GroupTooLarge {
                        limit: MAX_POINT_GROUP_ORDER,
                    });
                }
                operators.push(product);
                frontier.push(product);
            }
        }

        Ok(Self { operators })
    }

    pub fn named(name: &str) -> Result<Self, SymmetryError> {
        let generators: &[Operator] = match name.trim() {
            "-1" | "P-1" => &[],
            "2/m" => &[TWO_FOLD_Y],
            "mmm" => &[TWO_FOLD_Z, TWO_FOLD_Y],
            "4/mmm" => &[FOUR_FOLD_Z, TWO_FOLD_X],
            "m-3m" => &[FOUR_FOLD_Z, THREE_FOLD_DIAGONAL],
            other => return Err(SymmetryError::UnknownLaueClass(other.to_string())),
        };
        Self::from_generators(generators)
    }

    pub fn from_spec(spec: &SymmetrySpec) -> Result<Self, SymmetryError> {
        match spec {
            SymmetrySpec::Named(name) => Self::named(name),
            SymmetrySpec::Operators(operators) => Self::from_generators(operators),
        }
    }

    pub fn order(&self) -> usize {
        self.operators.len()
    }
}

impl SymmetryMapper for LaueGroup {
    /// Lexicographically largest image of `index` under the group.
    fn canonicalize(&self, index: MillerIndex) -> Result<MillerIndex, SymmetryError> {
        let mut best: Option<MillerIndex> = None;
        for operator in &self.operators {
            let image = apply(operator, index).ok_or(SymmetryError::IndexOverflow { index })?;
            if best.is_none_or(|current| image > current) {
                best = Some(image);
            }
        }
        Ok(best.unwrap_or(index))
    }
}

fn compose(lhs: &Operator, rhs: &Operator) -> Operator {
    let mut out = [[0; 3]; 3];
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, value) in out_row.iter_mut().enumerate() {
            *value = (0..3).map(|m| lhs[row][m] * rhs[m][col]).sum();
        }
    }
    out
}

fn apply(operator: &Operator, index: MillerIndex) -> Option<MillerIndex> {
    let source = index.as_array();
    let mut image = [0i32; 3];
    for (row, value) in image.iter_mut().enumerate() {
        let mut sum = 0i32;
        for (col, component) in source.iter().enumerate() {
            sum = sum.checked_add(operator[row][col].checked_mul(*component)?)?;
        }
        *value = sum;
    }
    Some(MillerIndex::from(image))
}

fn determinant(m: &Operator) -> i32 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

#[cfg(test)]
mod tests {
    use super::{LaueGroup, SymmetryError, SymmetryMapper};
    use crate::common::config::SymmetrySpec;
    use crate::domain::MillerIndex;

    #[test]
    fn named_groups_have_expected_orders() {
        for (name, order) in [("-1", 2), ("2/m", 4), ("mmm", 8), ("4/mmm", 16), ("m-3m", 48)] {
            let group = LaueGroup::named(name).expect("named group should build");
            assert_eq!(group.order(), order, "order of {name}");
        }
    }

    #[test]
    fn equivalent_indices_share_one_canonical_form() {
        let group = LaueGroup::named("mmm").expect("mmm should build");
        let canonical = group
            .canonicalize(MillerIndex::new(1, 2, 3))
            .expect("canonicalize should succeed");
        for equivalent in [
            MillerIndex::new(-1, 2, 3),
            MillerIndex::new(1, -2, -3),
            MillerIndex::new(-1, -2, -3),
        ] {
            assert_eq!(
                group
                    .canonicalize(equivalent)
                    .expect("canonicalize should succeed"),
                canonical
            );
        }
        assert_eq!(canonical, MillerIndex::new(1, 2, 3));

        let cubic = LaueGroup::named("m-3m").expect("m-3m should build");
        assert_eq!(
            cubic
                .canonicalize(MillerIndex::new(-3, 1, 2))
                .expect("canonicalize should succeed"),
            MillerIndex::new(3, 2, 1)
        );
    }

    #[test]
    fn triclinic_group_pairs_friedel_mates_only() {
        let group = LaueGroup::from_spec(&SymmetrySpec::default()).expect("-1 should build");
        let plus = group
            .canonicalize(MillerIndex::new(-1, 2, 0))
            .expect("canonicalize should succeed");
        let minus = group
            .canonicalize(MillerIndex::new(1, -2, 0))
            .expect("canonicalize should succeed");
        assert_eq!(plus, minus);
        assert_ne!(
            plus,
            group
                .canonicalize(MillerIndex::new(1, 2, 0))
                .expect("canonicalize should succeed")
        );
    }

    #[test]
    fn malformed_operators_are_rejected() {
        assert_eq!(
            LaueGroup::named("p6/mmm").expect_err("unknown class should fail"),
            SymmetryError::UnknownLaueClass("p6/mmm".to_string())
        );
        assert!(matches!(
            LaueGroup::from_generators(&[[[2, 0, 0], [0, 1, 0], [0, 0, 1]]]),
            Err(SymmetryError::NonUnimodularOperator {
                index: 0,
                determinant: 2
            })
        ));
        assert_eq!(
            LaueGroup::from_generators(&[[[1, 1, 0], [0, 1, 0], [0, 0, 1]]])
                .expect_err("shear should not close"),
            SymmetryError::GroupTooLarge { limit: 48 }
        );
    }
}
