use std::fmt;
use std::ops::{Deref, DerefMut};

use thiserror::Error;

/// Identity of a single cell: sheet index, zero-based row, zero-based column
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub sheet: usize,
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub const fn new(sheet: usize, row: u32, column: u32) -> Self {
        Self { sheet, row, column }
    }

    /// Parse an `A1`-style address (optionally with `$` markers) on `sheet`
    pub fn parse_a1(sheet: usize, text: &str) -> Option<Self> {
        let text = text.trim();
        let bytes = text.as_bytes();
        let mut pos = 0;
        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let letters_start = pos;
        while bytes.get(pos).is_some_and(|b| b.is_ascii_alphabetic()) {
            pos += 1;
        }
        let letters = &text[letters_start..pos];
        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }
        let digits = &text[pos..];
        if letters.is_empty() || letters.len() > 3 || digits.is_empty() {
            return None;
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let column = letters
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1))
            - 1;
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self::new(sheet, row - 1, column))
    }

    /// The `A1`-style address without a sheet qualifier
    pub fn a1(&self) -> String {
        format!("{}{}", column_name(self.column), u64::from(self.row) + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.a1())
    }
}

/// Spreadsheet column letters for a zero-based index (0 -> A, 26 -> AA)
pub fn column_name(column: u32) -> String {
    let mut n = u64::from(column) + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellError {
    #[error("Cell {0} does not exist")]
    InvalidCell(CellRef),
    #[error("Cell {cell} could not be evaluated: {message}")]
    Evaluation { cell: CellRef, message: String },
}

/// Read/write access to a recalculating document.
///
/// A write must be fully recalculated before it returns, so a read issued
/// right after it observes every dependent cell's new value.
pub trait CellEvaluator {
    fn read(&self, cell: CellRef) -> Result<f64, CellError>;

    fn write(&mut self, cell: CellRef, value: f64) -> Result<(), CellError>;
}

/// Exclusive access to a document against interactive recalculation and
/// other automation.
pub trait DocumentLock {
    fn acquire_exclusive(&mut self);

    fn release(&mut self);
}

/// A document that can be probed: evaluable and lockable
pub trait Document: CellEvaluator + DocumentLock {}

impl<T: CellEvaluator + DocumentLock + ?Sized> Document for T {}

/// Holds a document's exclusive lock until dropped
pub struct ScopedLock<'d, D: DocumentLock + ?Sized> {
    document: &'d mut D,
}

impl<'d, D: DocumentLock + ?Sized> ScopedLock<'d, D> {
    pub fn acquire(document: &'d mut D) -> Self {
        document.acquire_exclusive();
        Self { document }
    }
}

impl<D: DocumentLock + ?Sized> Deref for ScopedLock<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.document
    }
}

impl<D: DocumentLock + ?Sized> DerefMut for ScopedLock<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.document
    }
}

impl<D: DocumentLock + ?Sized> Drop for ScopedLock<'_, D> {
    fn drop(&mut self) {
        self.document.release();
    }
}
