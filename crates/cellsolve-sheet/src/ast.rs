use std::fmt;
use std::str::FromStr;

use crate::lexer::Span;

/// A cell address as written in a formula; the sheet is still a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub sheet: Option<String>,
    pub row: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Cell {
        span: Span,
        address: Address,
    },
    /// Rectangular block, both corners inclusive and on the same sheet
    Range {
        span: Span,
        from: Address,
        to: Address,
    },
    Negate(Box<Expr>),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sum,
    SumProduct,
    Min,
    Max,
    Abs,
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::Sum => "SUM",
            Function::SumProduct => "SUMPRODUCT",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Abs => "ABS",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUM" => Ok(Function::Sum),
            "SUMPRODUCT" => Ok(Function::SumProduct),
            "MIN" => Ok(Function::Min),
            "MAX" => Ok(Function::Max),
            "ABS" => Ok(Function::Abs),
            _ => Err(s.to_string()),
        }
    }
}

impl Expr {
    /// Every cell or range address the expression mentions, in source order
    pub fn references(&self) -> Vec<&Address> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Address>) {
        match self {
            Expr::Number(_) => {}
            Expr::Cell { address, .. } => out.push(address),
            Expr::Range { from, to, .. } => {
                out.push(from);
                out.push(to);
            }
            Expr::Negate(inner) | Expr::Paren(inner) => inner.collect_references(out),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}
