//! Structural expressions carried by steps
//!
//! The unroller lowers syntax nodes into [`Expr`] so the executor can
//! re-evaluate conditions and stored values against runtime state without
//! re-parsing source text. Anything the lowering does not understand becomes
//! [`Expr::Opaque`] and evaluates to its own text.

use super::StepIndex;
use crate::memory::value::HeapToken;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-" => Some(UnaryOp::Neg),
            "+" => Some(UnaryOp::Plus),
            "!" => Some(UnaryOp::Not),
            "~" => Some(UnaryOp::BitNot),
            _ => None,
        }
    }

    pub fn apply(self, operand: i64) -> i64 {
        match self {
            UnaryOp::Neg => operand.wrapping_neg(),
            UnaryOp::Plus => operand,
            UnaryOp::Not => (operand == 0) as i64,
            UnaryOp::BitNot => !operand,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    /// Operator of a compound assignment such as `+=`
    pub fn from_compound(symbol: &str) -> Option<Self> {
        symbol.strip_suffix('=').and_then(BinaryOp::from_symbol)
    }

    /// Integer semantics; `None` on division by zero
    pub fn apply(self, left: i64, right: i64) -> Option<i64> {
        let value = match self {
            BinaryOp::Add => left.wrapping_add(right),
            BinaryOp::Sub => left.wrapping_sub(right),
            BinaryOp::Mul => left.wrapping_mul(right),
            BinaryOp::Div => left.checked_div(right)?,
            BinaryOp::Mod => left.checked_rem(right)?,
            BinaryOp::Eq => (left == right) as i64,
            BinaryOp::Ne => (left != right) as i64,
            BinaryOp::Lt => (left < right) as i64,
            BinaryOp::Le => (left <= right) as i64,
            BinaryOp::Gt => (left > right) as i64,
            BinaryOp::Ge => (left >= right) as i64,
            BinaryOp::And => (left != 0 && right != 0) as i64,
            BinaryOp::Or => (left != 0 || right != 0) as i64,
            BinaryOp::BitAnd => left & right,
            BinaryOp::BitOr => left | right,
            BinaryOp::BitXor => left ^ right,
            BinaryOp::Shl => left.wrapping_shl(right as u32),
            BinaryOp::Shr => left.wrapping_shr(right as u32),
        };
        Some(value)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Lowered expression tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Number {
        value: i64,
    },
    Str {
        text: String,
    },
    Null,
    Var {
        name: String,
    },
    Deref {
        pointer: Box<Expr>,
    },
    AddrOf {
        target: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
        arrow: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Array initializer list
    List {
        elements: Vec<Expr>,
    },
    /// Struct initializer list
    Record {
        fields: Vec<(String, Expr)>,
    },
    /// Address of a heap cell allocated by a `new`/`malloc` step
    HeapAddress {
        token: HeapToken,
    },
    /// Value returned by the call whose `CallEnter` step has this index
    CallResult {
        call_id: StepIndex,
    },
    Opaque {
        text: String,
    },
}

impl Expr {
    pub fn number(value: i64) -> Self {
        Expr::Number { value }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    pub fn opaque(text: impl Into<String>) -> Self {
        Expr::Opaque { text: text.into() }
    }

    pub fn deref(pointer: Expr) -> Self {
        Expr::Deref {
            pointer: Box::new(pointer),
        }
    }

    pub fn addr_of(target: Expr) -> Self {
        Expr::AddrOf {
            target: Box::new(target),
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The variable name if this is a bare identifier
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { value } => write!(f, "{}", value),
            Expr::Str { text } => write!(f, "{:?}", text),
            Expr::Null => write!(f, "NULL"),
            Expr::Var { name } => write!(f, "{}", name),
            Expr::Deref { pointer } => write!(f, "*{}", pointer),
            Expr::AddrOf { target } => write!(f, "&{}", target),
            Expr::Index { base, index } => write!(f, "{}[{}]", base, index),
            Expr::Field { base, field, arrow } => {
                write!(f, "{}{}{}", base, if *arrow { "->" } else { "." }, field)
            }
            Expr::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => write!(f, "({} ? {} : {})", condition, then, otherwise),
            Expr::List { elements } => {
                write!(f, "{{")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "}}")
            }
            Expr::Record { fields } => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, ".{} = {}", name, value)?;
                }
                write!(f, "}}")
            }
            Expr::HeapAddress { token } => write!(f, "{:#010x}", token),
            Expr::CallResult { call_id } => write!(f, "<result of call #{}>", call_id),
            Expr::Opaque { text } => write!(f, "{}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_apply() {
        assert_eq!(BinaryOp::Add.apply(2, 3), Some(5));
        assert_eq!(BinaryOp::Lt.apply(2, 3), Some(1));
        assert_eq!(BinaryOp::Div.apply(7, 0), None);
        assert_eq!(BinaryOp::Mod.apply(7, 3), Some(1));
        assert_eq!(BinaryOp::from_compound("+="), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::from_compound("="), None);
    }

    #[test]
    fn test_display() {
        let expr = Expr::binary(
            BinaryOp::Gt,
            Expr::deref(Expr::var("p")),
            Expr::number(0),
        );
        assert_eq!(expr.to_string(), "(*p > 0)");
    }
}
