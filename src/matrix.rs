//! Sparse mod-2 matrix with doubly-linked row and column lists.
//!
//! Every 1-entry lives in an arena and is threaded on two lists: the list of
//! its row (ordered by column) and the list of its column (ordered by row).
//! An entry can therefore be removed in O(1) from both lists given its
//! handle, which is what the decoder does each time an equation absorbs a
//! known packet.
//!
//! The matrix never grows after construction; decoding only deletes. Arena
//! slots of deleted entries are not reused.
use std::fmt;

use itertools::Itertools;

const NIL: usize = usize::MAX;

/// Handle on a 1-entry of a [`SparseBitMatrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

#[derive(Clone, Debug)]
struct Entry {
    row: usize,
    col: usize,
    left: usize,
    right: usize,
    up: usize,
    down: usize,
    live: bool,
}

/// Head and tail of one row or column list, plus its live length.
#[derive(Clone, Copy, Debug)]
struct Chain {
    first: usize,
    last: usize,
    len: usize,
}

impl Chain {
    const EMPTY: Chain = Chain {
        first: NIL,
        last: NIL,
        len: 0,
    };
}

/// Sparse boolean matrix over GF(2).
#[derive(Clone, Debug)]
pub struct SparseBitMatrix {
    rows: Vec<Chain>,
    cols: Vec<Chain>,
    entries: Vec<Entry>,
    live: usize,
}

impl SparseBitMatrix {
    /// Creates an all-zero `rows × cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: vec![Chain::EMPTY; rows],
            cols: vec![Chain::EMPTY; cols],
            entries: Vec::new(),
            live: 0,
        }
    }

    /// Number of rows (check equations).
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (packets).
    pub fn cols(&self) -> usize {
        self.cols.len()
    }

    /// Number of live 1-entries.
    pub fn entry_count(&self) -> usize {
        self.live
    }

    /// Live entries in `row`.
    pub fn row_degree(&self, row: usize) -> usize {
        self.rows[row].len
    }

    /// Live entries in `col`.
    pub fn col_degree(&self, col: usize) -> usize {
        self.cols[col].len
    }

    /// Row of an entry.
    pub fn row_of(&self, entry: EntryId) -> usize {
        self.entries[entry.0].row
    }

    /// Column of an entry.
    pub fn col_of(&self, entry: EntryId) -> usize {
        self.entries[entry.0].col
    }

    /// Sets `(row, col)` to 1 and returns the new entry.
    ///
    /// # Panics
    ///
    /// Panics if the entry is already present or out of range.
    pub fn insert(&mut self, row: usize, col: usize) -> EntryId {
        assert!(
            row < self.rows() && col < self.cols(),
            "entry ({}, {}) outside a {}x{} matrix",
            row,
            col,
            self.rows(),
            self.cols()
        );
        assert!(
            self.find(row, col).is_none(),
            "entry ({}, {}) inserted twice",
            row,
            col
        );

        let id = self.entries.len();
        self.entries.push(Entry {
            row,
            col,
            left: NIL,
            right: NIL,
            up: NIL,
            down: NIL,
            live: true,
        });

        // Row list is ordered by column: walk back from the tail, since
        // construction mostly appends.
        let mut after = self.rows[row].last;
        while after != NIL && self.entries[after].col > col {
            after = self.entries[after].left;
        }
        let before = if after == NIL {
            self.rows[row].first
        } else {
            self.entries[after].right
        };
        self.entries[id].left = after;
        self.entries[id].right = before;
        match after {
            NIL => self.rows[row].first = id,
            a => self.entries[a].right = id,
        }
        match before {
            NIL => self.rows[row].last = id,
            b => self.entries[b].left = id,
        }
        self.rows[row].len += 1;

        // Column list is ordered by row.
        let mut above = self.cols[col].last;
        while above != NIL && self.entries[above].row > row {
            above = self.entries[above].up;
        }
        let below = if above == NIL {
            self.cols[col].first
        } else {
            self.entries[above].down
        };
        self.entries[id].up = above;
        self.entries[id].down = below;
        match above {
            NIL => self.cols[col].first = id,
            a => self.entries[a].down = id,
        }
        match below {
            NIL => self.cols[col].last = id,
            b => self.entries[b].up = id,
        }
        self.cols[col].len += 1;

        self.live += 1;
        EntryId(id)
    }

    /// Sets `(row, col)` to 1 unless it already is. Returns whether an entry
    /// was added.
    pub fn insert_if_absent(&mut self, row: usize, col: usize) -> bool {
        if self.find(row, col).is_some() {
            return false;
        }
        self.insert(row, col);
        true
    }

    /// Looks up the entry at `(row, col)`.
    pub fn find(&self, row: usize, col: usize) -> Option<EntryId> {
        // Scan whichever list is shorter.
        if self.rows[row].len <= self.cols[col].len {
            self.row_entries(row).find(|&e| self.col_of(e) == col)
        } else {
            self.col_entries(col).find(|&e| self.row_of(e) == row)
        }
    }

    /// Unlinks an entry from its row and its column.
    ///
    /// # Panics
    ///
    /// Panics if the entry was already deleted.
    pub fn delete(&mut self, entry: EntryId) {
        let id = entry.0;
        assert!(self.entries[id].live, "entry deleted twice");
        let Entry {
            row,
            col,
            left,
            right,
            up,
            down,
            ..
        } = self.entries[id];

        match left {
            NIL => self.rows[row].first = right,
            l => self.entries[l].right = right,
        }
        match right {
            NIL => self.rows[row].last = left,
            r => self.entries[r].left = left,
        }
        match up {
            NIL => self.cols[col].first = down,
            u => self.entries[u].down = down,
        }
        match down {
            NIL => self.cols[col].last = up,
            d => self.entries[d].up = up,
        }

        self.entries[id].live = false;
        self.rows[row].len -= 1;
        self.cols[col].len -= 1;
        self.live -= 1;
    }

    /// First entry of a row, in column order.
    pub fn first_in_row(&self, row: usize) -> Option<EntryId> {
        link(self.rows[row].first)
    }

    /// Last entry of a row.
    pub fn last_in_row(&self, row: usize) -> Option<EntryId> {
        link(self.rows[row].last)
    }

    /// Entry following `entry` in its row.
    pub fn next_in_row(&self, entry: EntryId) -> Option<EntryId> {
        link(self.entries[entry.0].right)
    }

    /// First entry of a column, in row order.
    pub fn first_in_col(&self, col: usize) -> Option<EntryId> {
        link(self.cols[col].first)
    }

    /// Entry following `entry` in its column.
    pub fn next_in_col(&self, entry: EntryId) -> Option<EntryId> {
        link(self.entries[entry.0].down)
    }

    /// Live entries of a row, in column order.
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = EntryId> + '_ {
        std::iter::successors(self.first_in_row(row), move |&e| self.next_in_row(e))
    }

    /// Live entries of a column, in row order.
    pub fn col_entries(&self, col: usize) -> impl Iterator<Item = EntryId> + '_ {
        std::iter::successors(self.first_in_col(col), move |&e| self.next_in_col(e))
    }
}

fn link(index: usize) -> Option<EntryId> {
    (index != NIL).then_some(EntryId(index))
}

impl fmt::Display for SparseBitMatrix {
    /// One line per row: `row: col col col`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows() {
            writeln!(
                f,
                "{:4}: {}",
                row,
                self.row_entries(row).map(|e| self.col_of(e)).join(" ")
            )?;
        }
        Ok(())
    }
}
