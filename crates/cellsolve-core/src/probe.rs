use tracing::trace;

use crate::cell::{CellRef, Document, ScopedLock};
use crate::error::SolveError;

/// Where an extraction session is in its zero/perturb/restore cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Every variable cell holds 0
    Zeroed,
    /// The variable at this index holds 1, all others 0
    Probing(usize),
    /// No further probes are accepted
    Done,
}

/// Readings taken by one [`ExtractionSession::probe`] call.
///
/// `baseline[k]` is observed cell `k` with all variables at 0;
/// `readings[i][k]` is the same cell with only variable `i` at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub baseline: Vec<f64>,
    pub readings: Vec<Vec<f64>>,
}

impl ProbeOutcome {
    /// Per-variable change of observed cell `k` relative to the baseline
    pub fn deltas(&self, k: usize) -> Vec<f64> {
        self.readings.iter().map(|r| r[k] - self.baseline[k]).collect()
    }

    /// Whether observed cell `k` read the same value at every probe step
    pub fn is_constant(&self, k: usize) -> bool {
        self.readings.iter().all(|r| r[k] == self.baseline[k])
    }
}

/// Exclusive probing session over a document.
///
/// Beginning a session locks the document and sets every variable cell to 0;
/// that all-zero state is the baseline for every probe in the session. The
/// lock is released when the session is dropped, on every exit path.
///
/// The session mutably borrows the document for its whole lifetime, so two
/// sessions over the same document cannot overlap.
///
/// Probing assumes the observed cells are affine in each variable: a single
/// 0 -> 1 step is taken per variable, so cross terms or curvature are not
/// detected and silently yield wrong coefficients.
pub struct ExtractionSession<'d, D: Document + ?Sized> {
    document: ScopedLock<'d, D>,
    variables: Vec<CellRef>,
    state: SessionState,
}

impl<'d, D: Document + ?Sized> ExtractionSession<'d, D> {
    pub fn begin(document: &'d mut D, variables: &[CellRef]) -> Result<Self, SolveError> {
        let mut session = Self {
            document: ScopedLock::acquire(document),
            variables: variables.to_vec(),
            state: SessionState::Zeroed,
        };
        for i in 0..session.variables.len() {
            let cell = session.variables[i];
            session.document.write(cell, 0.0)?;
        }
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Variable cells in canonical order
    pub fn variables(&self) -> &[CellRef] {
        &self.variables
    }

    /// Read a cell in the current (all-zero) state
    pub fn read(&self, cell: CellRef) -> Result<f64, SolveError> {
        self.ensure_open()?;
        Ok(self.document.read(cell)?)
    }

    /// Perturb each variable to 1 in turn and read `observed` each time
    pub fn probe(&mut self, observed: &[CellRef]) -> Result<ProbeOutcome, SolveError> {
        self.ensure_open()?;

        let baseline = self.read_all(observed)?;
        let mut readings = Vec::with_capacity(self.variables.len());

        for i in 0..self.variables.len() {
            let cell = self.variables[i];
            self.state = SessionState::Probing(i);
            self.document.write(cell, 1.0)?;
            let reading = self.read_all(observed);
            self.document.write(cell, 0.0)?;
            self.state = SessionState::Zeroed;

            let reading = reading?;
            trace!(event = "probe", variable = %cell, ?reading);
            readings.push(reading);
        }

        Ok(ProbeOutcome { baseline, readings })
    }

    /// Stop accepting probes. The lock stays held until the session is dropped.
    pub fn finish(&mut self) {
        self.state = SessionState::Done;
    }

    fn ensure_open(&self) -> Result<(), SolveError> {
        match self.state {
            SessionState::Done => Err(SolveError::SessionClosed),
            _ => Ok(()),
        }
    }

    fn read_all(&self, cells: &[CellRef]) -> Result<Vec<f64>, SolveError> {
        cells
            .iter()
            .map(|&c| self.document.read(c).map_err(SolveError::from))
            .collect()
    }
}
