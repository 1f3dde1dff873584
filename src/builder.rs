//! Construction of the parity-check matrix.
//!
//! The matrix has one row per parity packet and one column per packet. The
//! first `M` columns belong to the parity packets and are wired
//! deterministically according to the [`CodecVariant`]; the remaining data
//! columns receive `left_degree` pseudo-random edges each.
//!
//! Data edges are placed with the "evenboth" method: a pool of
//! `left_degree·(N−M)` slots is filled round-robin with row indices, and each
//! edge consumes a random slot whose row is not yet used by the column. Row
//! degrees thus stay balanced while the placement remains random. Rows left
//! with fewer than two entries are then patched.
//!
//! Every random draw comes from one [`Lrand48`] stream seeded with the
//! matrix seed, in a fixed order: the same parameters always give the same
//! matrix, on the encoder and on the decoder.
use log::{debug, warn};

use crate::{
    code::{CodeParams, CodecVariant},
    errors::{Error, Result},
    matrix::SparseBitMatrix,
    rand48::Lrand48,
};

/// Counters reported by the construction, mostly useful for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Data edges that could not be drawn from the balanced pool
    pub uneven: usize,
    /// Edges added so that every row has at least two entries
    pub added_for_row_weight: usize,
    /// Edges added because the left degree is even
    pub added_for_even_degree: usize,
}

/// Builds the parity-check matrix of a code.
pub fn create_pchk_matrix(params: &CodeParams) -> Result<SparseBitMatrix> {
    create_pchk_matrix_with_report(
        params.parity_blocks,
        params.total_blocks(),
        params.left_degree,
        params.seed,
        params.variant,
    )
    .map(|(matrix, _)| matrix)
}

/// Builds a `rows × cols` parity-check matrix and reports what the
/// construction had to patch.
///
/// # Arguments
/// * `rows` - Number of check equations `M`, also the number of parity
///   columns
/// * `cols` - Total number of columns `N`
/// * `left_degree` - Edges per data column
/// * `seed` - Seed of the `lrand48` stream
/// * `variant` - Wiring of the parity columns
///
/// # Errors
/// Returns `Error::Config` if `left_degree` is zero or larger than `rows`, or
/// if there is no data column.
pub fn create_pchk_matrix_with_report(
    rows: usize,
    cols: usize,
    left_degree: usize,
    seed: u32,
    variant: CodecVariant,
) -> Result<(SparseBitMatrix, BuildReport)> {
    if left_degree > rows {
        return Err(Error::config(format!(
            "Number of checks per bit ({}) is greater than total checks ({})",
            left_degree, rows
        )));
    }
    if left_degree == 0 {
        return Err(Error::config("Number of checks per bit must be positive"));
    }
    if cols <= rows {
        return Err(Error::config(format!(
            "Matrix needs data columns: {} columns for {} checks",
            cols, rows
        )));
    }

    let skip_cols = rows;
    let data_cols = cols - skip_cols;
    let mut rng = Lrand48::new(seed);
    let mut matrix = SparseBitMatrix::new(rows, cols);
    let mut report = BuildReport::default();

    // Evenboth placement of the data edges.
    let pool_len = left_degree * data_cols;
    let mut pool: Vec<usize> = (0..pool_len).map(|slot| slot % rows).collect();
    let mut taken = 0;
    for col in skip_cols..cols {
        for _ in 0..left_degree {
            let usable = (taken..pool_len).any(|slot| matrix.find(pool[slot], col).is_none());
            if usable {
                let slot = loop {
                    let slot = taken + rng.below(pool_len - taken);
                    if matrix.find(pool[slot], col).is_none() {
                        break slot;
                    }
                };
                matrix.insert(pool[slot], col);
                pool[slot] = pool[taken];
                taken += 1;
            } else {
                report.uneven += 1;
                let row = loop {
                    let row = rng.below(rows);
                    if matrix.find(row, col).is_none() {
                        break row;
                    }
                };
                matrix.insert(row, col);
            }
        }
    }
    if report.uneven > 0 {
        warn!("Had to place {} checks in rows unevenly", report.uneven);
    }

    // Give every row at least two entries.
    for row in 0..rows {
        if matrix.row_degree(row) == 0 {
            let col = rng.below(data_cols) + skip_cols;
            matrix.insert(row, col);
            report.added_for_row_weight += 1;
        }
        if matrix.row_degree(row) == 1 && data_cols > 1 {
            let present = matrix
                .first_in_row(row)
                .map(|e| matrix.col_of(e))
                .unwrap_or(usize::MAX);
            let col = loop {
                let col = rng.below(data_cols) + skip_cols;
                if col != present {
                    break col;
                }
            };
            matrix.insert(row, col);
            report.added_for_row_weight += 1;
        }
    }
    if report.added_for_row_weight > 0 {
        debug!(
            "Added {} extra bit-checks to make row counts at least two",
            report.added_for_row_weight
        );
    }

    // Even column weights make even-weight codewords likely; break the
    // symmetry with a couple of extra edges.
    if left_degree % 2 == 0 && left_degree < rows && data_cols > 1 && report.added_for_row_weight < 2 {
        while report.added_for_row_weight + report.added_for_even_degree < 2 {
            let (row, col) = loop {
                let row = rng.below(rows);
                let col = rng.below(data_cols) + skip_cols;
                if matrix.find(row, col).is_none() {
                    break (row, col);
                }
            };
            matrix.insert(row, col);
            report.added_for_even_degree += 1;
        }
        debug!(
            "Added {} extra bit-checks to try to avoid problems from even column counts",
            report.added_for_even_degree
        );
    }

    wire_parity_columns(&mut matrix, &mut rng, variant);

    debug!(
        "Parity-check matrix {}x{} ({:?}, left degree {}, seed {}): {} entries",
        rows,
        cols,
        variant,
        left_degree,
        seed,
        matrix.entry_count()
    );
    Ok((matrix, report))
}

/// Deterministic wiring of the parity columns `0..rows`.
fn wire_parity_columns(matrix: &mut SparseBitMatrix, rng: &mut Lrand48, variant: CodecVariant) {
    for row in 0..matrix.rows() {
        matrix.insert(row, row);
        if row == 0 || variant == CodecVariant::Ldgm {
            continue;
        }
        matrix.insert(row, row - 1);
        if variant == CodecVariant::Triangle {
            // The bound of the walk shrinks with `t`.
            let mut t = row;
            let mut j = 0;
            while j < t {
                t = rng.below(t);
                matrix.insert_if_absent(row, t);
                j += 1;
            }
        }
    }
}
