//! State-vector layout and linear-solver selection.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::error::SolverError;

/// How the Jacobian is handed to the linear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolverMode {
    #[default]
    Dense,
    Sparse,
}

impl fmt::Display for LinearSolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverMode::Dense => f.write_str("dense"),
            LinearSolverMode::Sparse => f.write_str("sparse"),
        }
    }
}

impl FromStr for LinearSolverMode {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(LinearSolverMode::Dense),
            "sparse" | "klu" => Ok(LinearSolverMode::Sparse),
            _ => Err(SolverError::param(s)),
        }
    }
}

/// Partition of the flat state vector for one integration.
///
/// Differential states come first, algebraic states follow. `paired_offset`
/// locates this mode's algebraic block inside the vector of a paired
/// algebraic-only mode, when one exists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolverMode {
    pub diff_size: usize,
    pub alg_size: usize,
    pub paired_offset: Option<usize>,
}

impl SolverMode {
    pub fn new(diff_size: usize, alg_size: usize) -> Self {
        Self {
            diff_size,
            alg_size,
            ..Self::default()
        }
    }

    pub fn with_paired_offset(mut self, offset: usize) -> Self {
        self.paired_offset = Some(offset);
        self
    }

    pub fn state_count(&self) -> usize {
        self.diff_size + self.alg_size
    }

    pub fn is_differential(&self, index: usize) -> bool {
        index < self.diff_size
    }

    pub fn differential_range(&self) -> Range<usize> {
        0..self.diff_size
    }

    pub fn algebraic_range(&self) -> Range<usize> {
        self.diff_size..self.state_count()
    }

    /// One flag per state, true for differential entries.
    pub fn differential_flags(&self) -> Vec<bool> {
        (0..self.state_count())
            .map(|i| self.is_differential(i))
            .collect()
    }

    /// Where this mode's algebraic block sits in the paired vector.
    pub fn paired_range(&self) -> Option<Range<usize>> {
        let start = self.paired_offset?;
        Some(start..start + self.alg_size)
    }

    /// This mode's algebraic block inside a paired algebraic-only vector.
    pub fn paired_algebraic<'a>(&self, paired: &'a [f64]) -> Option<&'a [f64]> {
        paired.get(self.paired_range()?)
    }
}
