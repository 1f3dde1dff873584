//! Structures needed for working with LDGM erasure codes
//!
//! This module provides:
//! - Core code parameters including:
//!   - Number of data blocks (`k`)
//!   - Number of parity blocks (`m`)
//!   - Left degree of data nodes (`left_degree`)
//!   - Matrix seed and codec variant
//! - Degree distributions of the nodes of the Tanner graph given by a
//!   parity-check matrix
//!
//! Packets are numbered `0..k` for data and `k..n` for parity. In the
//! parity-check matrix the first `m` columns hold the parity packets (parity
//! `i` is column `i`, the own bit of check row `i`) and columns `m..n` hold
//! the data packets.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    matrix::SparseBitMatrix,
};

/// Number of data blocks used when none is specified.
pub const DEFAULT_DATA_BLOCKS: usize = 40;
/// Number of parity blocks used when none is specified.
pub const DEFAULT_PARITY_BLOCKS: usize = 20;
/// Left degree used when none is specified.
pub const DEFAULT_LEFT_DEGREE: usize = 7;
/// Matrix seed shared by deployed encoders and decoders.
pub const DEFAULT_SEED: u32 = 21;

/// Wiring of the parity columns of the parity-check matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecVariant {
    /// Identity: each parity bit appears in its own check only.
    Ldgm,
    /// Identity plus sub-diagonal: parity `i` also appears in check `i+1`.
    Staircase,
    /// Staircase plus a random lower-triangular fill.
    Triangle,
}

/// Structure for an LDGM code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeParams {
    /// Number of data blocks (`k`)
    pub data_blocks: usize,
    /// Number of parity blocks (`m`), also the number of check equations
    pub parity_blocks: usize,
    /// Number of check equations each data block takes part in
    pub left_degree: usize,
    /// Seed of the matrix construction
    pub seed: u32,
    /// Parity column wiring
    pub variant: CodecVariant,
}

impl CodeParams {
    /// Creates a new `CodeParams` instance with parameter validation
    ///
    /// # Arguments
    /// * `data_blocks` - Number of data blocks `k`
    /// * `parity_blocks` - Number of parity blocks `m`
    /// * `left_degree` - Checks per data block
    /// * `seed` - Matrix construction seed
    /// * `variant` - Parity column wiring
    ///
    /// # Errors
    /// Returns `Error::Config` if parameters are invalid
    pub fn new(
        data_blocks: usize,
        parity_blocks: usize,
        left_degree: usize,
        seed: u32,
        variant: CodecVariant,
    ) -> Result<Self> {
        let params = CodeParams {
            data_blocks,
            parity_blocks,
            left_degree,
            seed,
            variant,
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks the invariants `new` enforces; also used on deserialized values.
    pub fn validate(&self) -> Result<()> {
        if self.data_blocks == 0 {
            return Err(Error::config("Number of data blocks must be positive"));
        }
        if self.parity_blocks == 0 {
            return Err(Error::config("Number of parity blocks must be positive"));
        }
        if self.left_degree == 0 {
            return Err(Error::config("Left degree must be positive"));
        }
        if self.left_degree > self.parity_blocks {
            return Err(Error::config(format!(
                "Left degree ({}) cannot exceed the number of checks ({})",
                self.left_degree, self.parity_blocks
            )));
        }
        if u32::try_from(self.total_blocks()).is_err() {
            return Err(Error::config(format!(
                "Total number of blocks ({}) does not fit a block header",
                self.total_blocks()
            )));
        }
        Ok(())
    }

    /// Total number of blocks `n = k + m`
    pub fn total_blocks(&self) -> usize {
        self.data_blocks + self.parity_blocks
    }

    /// Whether the Triangle code runs with fewer parity than data blocks,
    /// in which case the decoder never keeps parity packets around.
    pub fn triangle_with_small_fec_ratio(&self) -> bool {
        self.variant == CodecVariant::Triangle && self.total_blocks() < 2 * self.data_blocks
    }
}

impl Default for CodeParams {
    fn default() -> Self {
        CodeParams {
            data_blocks: DEFAULT_DATA_BLOCKS,
            parity_blocks: DEFAULT_PARITY_BLOCKS,
            left_degree: DEFAULT_LEFT_DEGREE,
            seed: DEFAULT_SEED,
            variant: CodecVariant::Staircase,
        }
    }
}

/// Represents the degree distributions of the nodes of the Tanner graph of a
/// parity-check matrix.
///
/// # Notation
///
/// - `n_Δ`: number of nodes of degree `Δ`
#[derive(Debug, PartialEq, Eq)]
pub struct CodeDegrees {
    /// Degree distribution of check nodes (rows)
    pub checks: BlockDegrees,
    /// Degree distribution of data packet nodes
    pub data: BlockDegrees,
    /// Degree distribution of parity packet nodes
    pub parity: BlockDegrees,
}

/// Degree distribution of a set of nodes
///
/// Use a simple map `{ Δ: n_Δ }`
pub type BlockDegrees = HashMap<usize, usize>;

impl CodeDegrees {
    /// Computes degree distributions from the live entries of a matrix.
    ///
    /// # Arguments
    /// * `matrix` - The parity-check matrix
    /// * `parity_blocks` - Number of leading parity columns
    ///
    /// # Returns
    /// A `CodeDegrees` instance for the checks, the data columns and the
    /// parity columns.
    pub fn compute_from_matrix(matrix: &SparseBitMatrix, parity_blocks: usize) -> CodeDegrees {
        CodeDegrees {
            checks: histogram((0..matrix.rows()).map(|r| matrix.row_degree(r))),
            data: histogram((parity_blocks..matrix.cols()).map(|c| matrix.col_degree(c))),
            parity: histogram((0..parity_blocks).map(|c| matrix.col_degree(c))),
        }
    }

    /// Total number of edges seen from the check side.
    pub fn edges(&self) -> usize {
        self.checks.iter().map(|(&degree, &count)| degree * count).sum()
    }
}

fn histogram(degrees: impl Iterator<Item = usize>) -> BlockDegrees {
    degrees.fold(HashMap::new(), |mut map, degree| {
        *map.entry(degree).or_insert(0) += 1;
        map
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_left_degree_above_checks() {
        let err = CodeParams::new(10, 4, 5, 1, CodecVariant::Staircase).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_empty_code() {
        assert!(CodeParams::new(0, 4, 3, 1, CodecVariant::Ldgm).is_err());
        assert!(CodeParams::new(4, 0, 3, 1, CodecVariant::Ldgm).is_err());
        assert!(CodeParams::new(4, 4, 0, 1, CodecVariant::Ldgm).is_err());
    }

    #[test]
    fn small_fec_ratio_only_applies_to_triangle() {
        let triangle = CodeParams::new(40, 20, 7, 1, CodecVariant::Triangle).unwrap();
        assert!(triangle.triangle_with_small_fec_ratio());
        let wide = CodeParams::new(20, 20, 7, 1, CodecVariant::Triangle).unwrap();
        assert!(!wide.triangle_with_small_fec_ratio());
        let staircase = CodeParams::new(40, 20, 7, 1, CodecVariant::Staircase).unwrap();
        assert!(!staircase.triangle_with_small_fec_ratio());
    }

    #[test]
    fn degrees_of_a_small_matrix() {
        let mut m = SparseBitMatrix::new(2, 4);
        for &(r, c) in &[(0, 0), (1, 1), (1, 0), (0, 2), (1, 2), (0, 3)] {
            m.insert(r, c);
        }
        let degrees = CodeDegrees::compute_from_matrix(&m, 2);
        assert_eq!(degrees.checks, HashMap::from([(3, 2)]));
        assert_eq!(degrees.data, HashMap::from([(2, 1), (1, 1)]));
        assert_eq!(degrees.parity, HashMap::from([(1, 1), (2, 1)]));
        assert_eq!(degrees.edges(), 6);
    }
}
