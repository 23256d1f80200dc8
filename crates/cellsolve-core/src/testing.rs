use std::collections::{HashMap, HashSet};

use crate::cell::{CellError, CellEvaluator, CellRef, DocumentLock};

pub(crate) fn cell(column: u32) -> CellRef {
    CellRef::new(0, 0, column)
}

/// Document whose output cells are affine functions of its input cells,
/// with lock bookkeeping for assertions.
#[derive(Debug, Default)]
pub(crate) struct AffineDocument {
    inputs: HashMap<CellRef, f64>,
    outputs: HashMap<CellRef, (f64, Vec<(CellRef, f64)>)>,
    products: HashMap<CellRef, (CellRef, CellRef)>,
    failing: HashSet<CellRef>,
    missing: HashSet<CellRef>,
    locked: bool,
    locks: usize,
    releases: usize,
    writes_while_unlocked: usize,
}

impl AffineDocument {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_input(&mut self, cell: CellRef, value: f64) {
        self.inputs.insert(cell, value);
    }

    pub(crate) fn input(&self, cell: CellRef) -> f64 {
        self.inputs.get(&cell).copied().unwrap_or(0.0)
    }

    /// `cell = constant + sum(coefficient * input)`
    pub(crate) fn define(&mut self, cell: CellRef, constant: f64, terms: &[(CellRef, f64)]) {
        self.outputs.insert(cell, (constant, terms.to_vec()));
    }

    /// `cell = a * b`, for nonlinear cases
    pub(crate) fn define_product(&mut self, cell: CellRef, a: CellRef, b: CellRef) {
        self.products.insert(cell, (a, b));
    }

    pub(crate) fn fail_on(&mut self, cell: CellRef) {
        self.failing.insert(cell);
    }

    /// Reads and writes of `cell` fail as if it were outside the document
    pub(crate) fn remove_cell(&mut self, cell: CellRef) {
        self.missing.insert(cell);
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn locks(&self) -> usize {
        self.locks
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases
    }

    pub(crate) fn writes_while_unlocked(&self) -> usize {
        self.writes_while_unlocked
    }
}

impl CellEvaluator for AffineDocument {
    fn read(&self, cell: CellRef) -> Result<f64, CellError> {
        if self.missing.contains(&cell) {
            return Err(CellError::InvalidCell(cell));
        }
        if self.failing.contains(&cell) {
            return Err(CellError::Evaluation {
                cell,
                message: "#VALUE!".to_string(),
            });
        }
        if let Some((constant, terms)) = self.outputs.get(&cell) {
            return Ok(constant + terms.iter().map(|(c, k)| k * self.input(*c)).sum::<f64>());
        }
        if let Some((a, b)) = self.products.get(&cell) {
            return Ok(self.input(*a) * self.input(*b));
        }
        Ok(self.input(cell))
    }

    fn write(&mut self, cell: CellRef, value: f64) -> Result<(), CellError> {
        if self.missing.contains(&cell)
            || self.outputs.contains_key(&cell)
            || self.products.contains_key(&cell)
        {
            return Err(CellError::InvalidCell(cell));
        }
        if !self.locked {
            self.writes_while_unlocked += 1;
        }
        self.inputs.insert(cell, value);
        Ok(())
    }
}

impl DocumentLock for AffineDocument {
    fn acquire_exclusive(&mut self) {
        assert!(!self.locked, "document locked twice");
        self.locked = true;
        self.locks += 1;
    }

    fn release(&mut self) {
        assert!(self.locked, "document released while unlocked");
        self.locked = false;
        self.releases += 1;
    }
}
