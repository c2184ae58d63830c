//! Cell address and range types
//!
//! Spreadsheet-style addresses (`A1`, `$B$2`) appear inside expression paths
//! and range literals. The `$` prefix pins a row or column so copy/paste
//! offsets leave it alone.

use crate::error::{ExprError, ExprResult};
use std::fmt;
use std::str::FromStr;

/// Maximum number of rows in a sheet
pub const MAX_ROWS: u32 = 16_384;

/// Maximum number of columns in a sheet (A-ZZ)
pub const MAX_COLS: u16 = 702;

/// A cell address (e.g., "A1", "$B$2")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., ZZ=701)
    pub col: u16,
    /// Whether the row reference is pinned ($)
    pub row_absolute: bool,
    /// Whether the column reference is pinned ($)
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a new cell address with relative references
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
        }
    }

    /// Create a new cell address with specified absolute/relative flags
    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Parse a cell address from A1-style notation
    pub fn parse(s: &str) -> ExprResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ExprError::Parse("empty cell address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        let col_absolute = if bytes.get(pos) == Some(&b'$') {
            pos += 1;
            true
        } else {
            false
        };

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(ExprError::Parse(format!("no column letters in '{}'", s)));
        }
        let col = Self::letters_to_column(&s[col_start..pos])?;

        let row_absolute = if bytes.get(pos) == Some(&b'$') {
            pos += 1;
            true
        } else {
            false
        };

        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ExprError::Parse(format!("invalid row number in '{}'", s)));
        }
        let row: u32 = row_str
            .parse()
            .map_err(|_| ExprError::Parse(format!("invalid row number in '{}'", s)))?;
        if row == 0 || row > MAX_ROWS {
            return Err(ExprError::Parse(format!("row out of range in '{}'", s)));
        }

        Ok(Self {
            row: row - 1,
            col,
            row_absolute,
            col_absolute,
        })
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, ((n % 26) as u8 + b'A') as char);
            n /= 26;
        }
        result
    }

    /// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
    pub fn letters_to_column(letters: &str) -> ExprResult<u16> {
        if letters.is_empty() {
            return Err(ExprError::Parse("empty column letters".into()));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(ExprError::Parse(format!("invalid column letter '{}'", c)));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }
        let col = col - 1;
        if col >= MAX_COLS as u32 {
            return Err(ExprError::Parse(format!(
                "column out of range: '{}'",
                letters
            )));
        }
        Ok(col as u16)
    }

    /// True if the address lies within the sheet bounds
    pub fn is_valid(&self) -> bool {
        self.row < MAX_ROWS && self.col < MAX_COLS
    }

    /// Shift the address, leaving pinned rows/columns untouched.
    ///
    /// Returns `None` when the offset would move a relative coordinate out
    /// of bounds.
    pub fn offset(&self, row_offset: i32, col_offset: i32) -> Option<Self> {
        let mut out = *self;
        if !self.row_absolute {
            out.row = u32::try_from(self.row as i64 + row_offset as i64).ok()?;
        }
        if !self.col_absolute {
            out.col = u16::try_from(self.col as i64 + col_offset as i64).ok()?;
        }
        out.is_valid().then_some(out)
    }

    /// Format as A1-style string
    pub fn to_a1_string(&self) -> String {
        let mut result = String::new();
        if self.col_absolute {
            result.push('$');
        }
        result.push_str(&Self::column_to_letters(self.col));
        if self.row_absolute {
            result.push('$');
        }
        result.push_str(&(self.row + 1).to_string());
        result
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = ExprError;

    fn from_str(s: &str) -> ExprResult<Self> {
        Self::parse(s)
    }
}

/// A rectangular range of cells (e.g., "A1:B10")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Start address (top-left)
    pub start: CellAddress,
    /// End address (bottom-right)
    pub end: CellAddress,
}

impl CellRange {
    /// Create a new cell range, normalized so start is top-left
    pub fn new(start: CellAddress, end: CellAddress) -> Self {
        let (start_row, end_row) = if start.row <= end.row {
            (start.row, end.row)
        } else {
            (end.row, start.row)
        };
        let (start_col, end_col) = if start.col <= end.col {
            (start.col, end.col)
        } else {
            (end.col, start.col)
        };
        Self {
            start: CellAddress::with_absolute(
                start_row,
                start_col,
                start.row_absolute,
                start.col_absolute,
            ),
            end: CellAddress::with_absolute(end_row, end_col, end.row_absolute, end.col_absolute),
        }
    }

    /// Parse a range from A1:B10 notation
    pub fn parse(s: &str) -> ExprResult<Self> {
        let s = s.trim();
        match s.find(':') {
            Some(colon) => Ok(Self::new(
                CellAddress::parse(&s[..colon])?,
                CellAddress::parse(&s[colon + 1..])?,
            )),
            None => {
                let addr = CellAddress::parse(s)?;
                Ok(Self {
                    start: addr,
                    end: addr,
                })
            }
        }
    }

    /// Get the number of rows in the range
    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Get the number of columns in the range
    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    /// Get the total number of cells in the range
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// Iterate over all cell addresses in the range (row by row)
    pub fn cells(&self) -> CellRangeIterator {
        CellRangeIterator {
            range: *self,
            current_row: self.start.row,
            current_col: self.start.col,
            done: false,
        }
    }

    /// Format as A1:B10 string
    pub fn to_a1_string(&self) -> String {
        format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = ExprError;

    fn from_str(s: &str) -> ExprResult<Self> {
        Self::parse(s)
    }
}

/// Iterator over cells in a range
pub struct CellRangeIterator {
    range: CellRange,
    current_row: u32,
    current_col: u16,
    done: bool,
}

impl Iterator for CellRangeIterator {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let addr = CellAddress::new(self.current_row, self.current_col);
        if self.current_col < self.range.end.col {
            self.current_col += 1;
        } else if self.current_row < self.range.end.row {
            self.current_col = self.range.start.col;
            self.current_row += 1;
        } else {
            self.done = true;
        }
        Some(addr)
    }
}
