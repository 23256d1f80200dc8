use std::collections::HashMap;

use cellsolve_core::{CellError, CellEvaluator, CellRef, DocumentLock};
use thiserror::Error;
use tracing::{trace, warn};

use crate::ast::{Address, BinaryOp, Expr, Function};
use crate::parser::{parse_a1, ParseError, Parser};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Circular reference through {0}")]
    Circular(String),
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),
    #[error("{function} expects {expected}")]
    Arity {
        function: Function,
        expected: &'static str,
    },
    #[error("A range cannot be used as a single value")]
    RangeAsValue,
    #[error("SUMPRODUCT arguments differ in size")]
    SizeMismatch,
}

#[derive(Debug, Clone, PartialEq)]
enum Content {
    Number(f64),
    Formula { text: String, expr: Expr },
}

#[derive(Debug, Clone, Default)]
struct Sheet {
    name: String,
    cells: HashMap<(u32, u32), Content>,
}

/// Intermediate result: a single number or the flattened values of a range
enum Value {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Value {
    fn scalar(self) -> Result<f64, EvalError> {
        match self {
            Value::Scalar(v) => Ok(v),
            Value::Array(_) => Err(EvalError::RangeAsValue),
        }
    }

    fn flatten(self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![v],
            Value::Array(values) => values,
        }
    }
}

/// An in-memory set of sheets holding numbers and formulas.
///
/// Reads are recalculated on demand, so a read observes every write made
/// before it. Empty cells read as 0.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    locked: bool,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet, or return the index of an existing one with this name
    pub fn add_sheet(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(index) = self.sheet_index(&name) {
            return index;
        }
        self.sheets.push(Sheet {
            name,
            cells: HashMap::new(),
        });
        self.sheets.len() - 1
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_name(&self, index: usize) -> Option<&str> {
        self.sheets.get(index).map(|s| s.name.as_str())
    }

    /// Sheet names compare case-insensitively
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Resolve `A1`, `$A$1`, `Sheet2!A1` or `'My sheet'!A1`; unqualified
    /// addresses are on `default_sheet`.
    pub fn resolve(&self, address: &str, default_sheet: usize) -> Option<CellRef> {
        let address = address.trim();
        let (sheet, cell) = match address.rsplit_once('!') {
            Some((sheet, cell)) => {
                let sheet = sheet.trim();
                let sheet = sheet
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .map(|s| s.replace("''", "'"))
                    .unwrap_or_else(|| sheet.to_string());
                (self.sheet_index(&sheet)?, cell)
            }
            None => (default_sheet, address),
        };
        if sheet >= self.sheets.len() {
            return None;
        }
        let (row, column) = parse_a1(cell)?;
        Some(CellRef::new(sheet, row, column))
    }

    /// `Sheet!A1` form of a cell, for display
    pub fn display_cell(&self, cell: CellRef) -> String {
        match self.sheet_name(cell.sheet) {
            Some(name) if name.contains(|c: char| !c.is_alphanumeric() && c != '_') => {
                format!("'{}'!{}", name.replace('\'', "''"), cell.a1())
            }
            Some(name) => format!("{name}!{}", cell.a1()),
            None => cell.to_string(),
        }
    }

    pub fn set_number(&mut self, cell: CellRef, value: f64) -> Result<(), CellError> {
        let sheet = self.sheet_mut(cell)?;
        sheet.cells.insert((cell.row, cell.column), Content::Number(value));
        Ok(())
    }

    /// Store a formula; `text` may start with `=`
    pub fn set_formula(&mut self, cell: CellRef, text: &str) -> Result<(), ParseError> {
        let expr = Parser::parse(text)?;
        let text = text.trim().trim_start_matches('=').to_string();
        let sheet = self
            .sheet_mut(cell)
            .map_err(|_| ParseError::InvalidReference(cell.to_string()))?;
        sheet
            .cells
            .insert((cell.row, cell.column), Content::Formula { text, expr });
        Ok(())
    }

    /// Store cell input as typed: `=...` is a formula, anything else a number
    pub fn set_input(&mut self, cell: CellRef, input: &str) -> Result<(), ParseError> {
        let input = input.trim();
        if input.starts_with('=') {
            return self.set_formula(cell, input);
        }
        let value: f64 = input
            .parse()
            .map_err(|_| ParseError::InvalidNumber(input.to_string()))?;
        self.set_number(cell, value)
            .map_err(|_| ParseError::InvalidReference(cell.to_string()))
    }

    /// Formula text of a cell, without the leading `=`
    pub fn formula(&self, cell: CellRef) -> Option<&str> {
        match self.content(cell)? {
            Content::Formula { text, .. } => Some(text),
            Content::Number(_) => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn evaluate(&self, cell: CellRef) -> Result<f64, EvalError> {
        let mut stack = Vec::new();
        self.eval_cell(cell, &mut stack)
    }

    fn content(&self, cell: CellRef) -> Option<&Content> {
        self.sheets.get(cell.sheet)?.cells.get(&(cell.row, cell.column))
    }

    fn sheet_mut(&mut self, cell: CellRef) -> Result<&mut Sheet, CellError> {
        self.sheets
            .get_mut(cell.sheet)
            .ok_or(CellError::InvalidCell(cell))
    }

    fn eval_cell(&self, cell: CellRef, stack: &mut Vec<CellRef>) -> Result<f64, EvalError> {
        match self.content(cell) {
            None => Ok(0.0),
            Some(Content::Number(v)) => Ok(*v),
            Some(Content::Formula { expr, .. }) => {
                if stack.contains(&cell) {
                    return Err(EvalError::Circular(self.display_cell(cell)));
                }
                stack.push(cell);
                let value = self.eval_expr(expr, cell.sheet, stack).and_then(Value::scalar);
                stack.pop();
                value
            }
        }
    }

    fn locate(&self, address: &Address, sheet: usize) -> Result<CellRef, EvalError> {
        let sheet = match &address.sheet {
            Some(name) => self
                .sheet_index(name)
                .ok_or_else(|| EvalError::UnknownSheet(name.clone()))?,
            None => sheet,
        };
        Ok(CellRef::new(sheet, address.row, address.column))
    }

    fn eval_expr(
        &self,
        expr: &Expr,
        sheet: usize,
        stack: &mut Vec<CellRef>,
    ) -> Result<Value, EvalError> {
        let value = match expr {
            Expr::Number(v) => *v,
            Expr::Cell { address, .. } => {
                let cell = self.locate(address, sheet)?;
                self.eval_cell(cell, stack)?
            }
            Expr::Range { from, to, .. } => {
                let from = self.locate(from, sheet)?;
                let to = self.locate(to, sheet)?;
                let mut values = Vec::new();
                for row in from.row.min(to.row)..=from.row.max(to.row) {
                    for column in from.column.min(to.column)..=from.column.max(to.column) {
                        values.push(self.eval_cell(CellRef::new(from.sheet, row, column), stack)?);
                    }
                }
                return Ok(Value::Array(values));
            }
            Expr::Negate(inner) => -self.eval_expr(inner, sheet, stack)?.scalar()?,
            Expr::Paren(inner) => return self.eval_expr(inner, sheet, stack),
            Expr::BinaryOp { left, op, right } => {
                let l = self.eval_expr(left, sheet, stack)?.scalar()?;
                let r = self.eval_expr(right, sheet, stack)?.scalar()?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div if r == 0.0 => return Err(EvalError::DivisionByZero),
                    BinaryOp::Div => l / r,
                }
            }
            Expr::Call { function, args } => self.call(*function, args, sheet, stack)?,
        };
        Ok(Value::Scalar(value))
    }

    fn call(
        &self,
        function: Function,
        args: &[Expr],
        sheet: usize,
        stack: &mut Vec<CellRef>,
    ) -> Result<f64, EvalError> {
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_expr(arg, sheet, stack)?);
        }

        match function {
            Function::Sum => Ok(evaluated.into_iter().flat_map(Value::flatten).sum()),
            Function::Min => Ok(evaluated
                .into_iter()
                .flat_map(Value::flatten)
                .reduce(f64::min)
                .unwrap_or(0.0)),
            Function::Max => Ok(evaluated
                .into_iter()
                .flat_map(Value::flatten)
                .reduce(f64::max)
                .unwrap_or(0.0)),
            Function::Abs => {
                let mut evaluated = evaluated.into_iter();
                match (evaluated.next(), evaluated.next()) {
                    (Some(value), None) => Ok(value.scalar()?.abs()),
                    _ => Err(EvalError::Arity {
                        function,
                        expected: "exactly one argument",
                    }),
                }
            }
            Function::SumProduct => {
                let arrays: Vec<Vec<f64>> = evaluated.into_iter().map(Value::flatten).collect();
                let Some(first) = arrays.first() else {
                    return Err(EvalError::Arity {
                        function,
                        expected: "at least one argument",
                    });
                };
                let len = first.len();
                if arrays.iter().any(|a| a.len() != len) {
                    return Err(EvalError::SizeMismatch);
                }
                Ok((0..len).map(|i| arrays.iter().map(|a| a[i]).product::<f64>()).sum())
            }
        }
    }
}

impl CellEvaluator for Workbook {
    fn read(&self, cell: CellRef) -> Result<f64, CellError> {
        if cell.sheet >= self.sheets.len() {
            return Err(CellError::InvalidCell(cell));
        }
        self.evaluate(cell).map_err(|e| CellError::Evaluation {
            cell,
            message: e.to_string(),
        })
    }

    fn write(&mut self, cell: CellRef, value: f64) -> Result<(), CellError> {
        trace!(event = "cell_write", cell = %cell, value);
        self.set_number(cell, value)
    }
}

impl DocumentLock for Workbook {
    fn acquire_exclusive(&mut self) {
        if self.locked {
            warn!(event = "lock_reacquired", "workbook lock acquired while already held");
        }
        self.locked = true;
    }

    fn release(&mut self) {
        if !self.locked {
            warn!(event = "lock_not_held", "workbook lock released while not held");
        }
        self.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cellsolve_core::ScopedLock;

    fn book() -> (Workbook, usize) {
        let mut book = Workbook::new();
        let sheet = book.add_sheet("Model");
        (book, sheet)
    }

    fn at(book: &Workbook, address: &str) -> CellRef {
        book.resolve(address, 0).unwrap()
    }

    #[test]
    fn test_arithmetic_and_recalculation() {
        let (mut book, _) = book();
        let (a1, b1) = (at(&book, "A1"), at(&book, "B1"));
        book.set_number(a1, 4.0).unwrap();
        book.set_formula(b1, "=3*A1 - (A1 + 2) / 2").unwrap();

        assert_relative_eq!(book.read(b1).unwrap(), 9.0);
        book.write(a1, 10.0).unwrap();
        assert_relative_eq!(book.read(b1).unwrap(), 24.0);
    }

    #[test]
    fn test_empty_cells_read_zero() {
        let (mut book, _) = book();
        let c1 = at(&book, "C1");
        book.set_formula(c1, "=Z99 + 1").unwrap();
        assert_eq!(book.read(at(&book, "Q7")).unwrap(), 0.0);
        assert_eq!(book.read(c1).unwrap(), 1.0);
    }

    #[test]
    fn test_functions() {
        let (mut book, _) = book();
        let inputs = [
            ("A1", 1.0),
            ("A2", -2.0),
            ("A3", 3.0),
            ("B1", 4.0),
            ("B2", 5.0),
            ("B3", 6.0),
        ];
        for (address, value) in inputs {
            let cell = at(&book, address);
            book.set_number(cell, value).unwrap();
        }

        let cases = [
            ("=SUM(A1:A3, 10)", 12.0),
            ("=SUMPRODUCT(A1:A3, B1:B3)", 4.0 - 10.0 + 18.0),
            ("=MIN(A1:B3)", -2.0),
            ("=MAX(A1:A3, 0.5)", 3.0),
            ("=ABS(A2)", 2.0),
            ("=max()", 0.0),
            ("=-SUM(B1:B2)", -9.0),
        ];
        let d1 = at(&book, "D1");
        for (formula, expected) in cases {
            book.set_formula(d1, formula).unwrap();
            assert_relative_eq!(book.read(d1).unwrap(), expected);
        }
    }

    #[test]
    fn test_cross_sheet_references() {
        let (mut book, model) = book();
        let data = book.add_sheet("Input data");
        let rate = CellRef::new(data, 2, 2);
        book.set_number(rate, 0.5).unwrap();
        let out = CellRef::new(model, 0, 0);
        book.set_formula(out, "='Input data'!C3 * 4").unwrap();

        assert_eq!(book.read(out).unwrap(), 2.0);
        assert_eq!(book.resolve("'Input data'!$C$3", model), Some(rate));
        assert_eq!(book.resolve("input DATA!C3", model), Some(rate));
        assert_eq!(book.display_cell(rate), "'Input data'!C3");
        assert_eq!(book.display_cell(out), "Model!A1");
        assert_eq!(book.resolve("Nowhere!A1", model), None);
    }

    #[test]
    fn test_circular_reference() {
        let (mut book, _) = book();
        let (a1, b1) = (at(&book, "A1"), at(&book, "B1"));
        book.set_formula(a1, "=B1 + 1").unwrap();
        book.set_formula(b1, "=A1 * 2").unwrap();

        let err = book.evaluate(a1).unwrap_err();
        assert!(matches!(err, EvalError::Circular(_)));
        assert!(matches!(book.read(b1), Err(CellError::Evaluation { .. })));
    }

    #[test]
    fn test_shared_dependency_is_not_circular() {
        let (mut book, _) = book();
        let (a1, b1, c1) = (at(&book, "A1"), at(&book, "B1"), at(&book, "C1"));
        book.set_number(a1, 2.0).unwrap();
        book.set_formula(b1, "=A1 * A1").unwrap();
        book.set_formula(c1, "=B1 + B1 + A1").unwrap();
        assert_eq!(book.read(c1).unwrap(), 10.0);
    }

    #[test]
    fn test_evaluation_errors() {
        let (mut book, _) = book();
        let d1 = at(&book, "D1");

        book.set_formula(d1, "=1/A1").unwrap();
        assert_eq!(book.evaluate(d1), Err(EvalError::DivisionByZero));

        book.set_formula(d1, "=A1:A2 + 1").unwrap();
        assert_eq!(book.evaluate(d1), Err(EvalError::RangeAsValue));

        book.set_formula(d1, "=SUMPRODUCT(A1:A2, B1:B3)").unwrap();
        assert_eq!(book.evaluate(d1), Err(EvalError::SizeMismatch));

        book.set_formula(d1, "=ABS(1, 2)").unwrap();
        assert!(matches!(book.evaluate(d1), Err(EvalError::Arity { .. })));

        book.set_formula(d1, "=Other!A1").unwrap();
        assert_eq!(book.evaluate(d1), Err(EvalError::UnknownSheet("Other".to_string())));
    }

    #[test]
    fn test_set_input() {
        let (mut book, _) = book();
        let a1 = at(&book, "A1");
        book.set_input(a1, " 2.5 ").unwrap();
        assert_eq!(book.read(a1).unwrap(), 2.5);
        book.set_input(a1, "=A2+1").unwrap();
        assert_eq!(book.formula(a1), Some("A2+1"));
        assert!(book.set_input(a1, "hello").is_err());
        assert!(book.set_input(a1, "=1 +").is_err());
    }

    #[test]
    fn test_missing_sheet_is_invalid_cell() {
        let (mut book, _) = book();
        let cell = CellRef::new(3, 0, 0);
        assert_eq!(book.read(cell), Err(CellError::InvalidCell(cell)));
        assert_eq!(book.write(cell, 1.0), Err(CellError::InvalidCell(cell)));
    }

    #[test]
    fn test_write_replaces_formula() {
        let (mut book, _) = book();
        let a1 = at(&book, "A1");
        book.set_formula(a1, "=7").unwrap();
        book.write(a1, 1.0).unwrap();
        assert_eq!(book.formula(a1), None);
        assert_eq!(book.read(a1).unwrap(), 1.0);
    }

    #[test]
    fn test_scoped_lock() {
        let (mut book, _) = book();
        {
            let guard = ScopedLock::acquire(&mut book);
            assert!(guard.is_locked());
        }
        assert!(!book.is_locked());
    }
}
