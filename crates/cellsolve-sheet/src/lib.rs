pub mod ast;
pub mod lexer;
pub mod parser;
pub mod problem;
pub mod workbook;

pub use ast::{Address, BinaryOp, Expr, Function};
pub use lexer::{Lexer, Span, Token, TokenKind};
pub use parser::{ParseError, Parser};
pub use problem::{CellInput, ConstraintEntry, LoadError, ProblemFile, RightOperand, SheetSpec};
pub use workbook::{EvalError, Workbook};
