//! Binary operator tables.
//!
//! Every operator is an entry in a static table of symbol, precedence rank,
//! associativity and value function. The same table is consulted when chains of
//! operators are evaluated and when they are rendered, so the two always agree.
use lazy_static::lazy_static;
use std::fmt::{self, Display};

use crate::util::HashMap;
use crate::value::Value;
use crate::Error;

pub type ValueFunction = fn(&Value, &Value) -> Result<Value, Error>;

/// One row of an operator table.
pub struct OperatorInfo {
    pub symbol: &'static str,
    /// Higher binds tighter.
    pub precedence: u8,
    pub right_associative: bool,
    pub function: ValueFunction,
}

impl OperatorInfo {
    fn new(symbol: &'static str, precedence: u8, function: ValueFunction) -> Self {
        Self {
            symbol,
            precedence,
            right_associative: false,
            function,
        }
    }

    fn right_associative(mut self) -> Self {
        self.right_associative = true;
        self
    }
}

/// A binary operator which can appear in a flat operator chain.
pub trait BinaryOperator: Copy + Display + 'static {
    fn info(self) -> &'static OperatorInfo;

    fn symbol(self) -> &'static str {
        self.info().symbol
    }

    fn precedence(self) -> u8 {
        self.info().precedence
    }

    fn is_right_associative(self) -> bool {
        self.info().right_associative
    }

    /// Whether this operator, appearing to the right of `other` in a chain,
    /// must be applied before `other`.
    fn has_precedence_over(self, other: Self) -> bool {
        if self.precedence() == other.precedence() {
            self.is_right_associative()
        } else {
            self.precedence() > other.precedence()
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Result<Value, Error> {
        (self.info().function)(left, right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    And,
    LargerOrEqual,
    Larger,
    SmallerOrEqual,
    Smaller,
    ApproxEqual,
    NotEqual,
    Equal,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Power,
}

/// The numeric subset of [`Operator`] used by the legacy arithmetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Or,
    And,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Power,
}

lazy_static! {
    // In the order of the `Operator` variants.
    static ref OPERATORS: Vec<OperatorInfo> = vec![
        OperatorInfo::new("||", 0, |a, b| a.or(b)),
        OperatorInfo::new("&&", 1, |a, b| a.and(b)),
        OperatorInfo::new(">=", 2, |a, b| a.compare(TruthOperator::LargerOrEqual, b)),
        OperatorInfo::new(">", 2, |a, b| a.compare(TruthOperator::Larger, b)),
        OperatorInfo::new("<=", 2, |a, b| a.compare(TruthOperator::SmallerOrEqual, b)),
        OperatorInfo::new("<", 2, |a, b| a.compare(TruthOperator::Smaller, b)),
        OperatorInfo::new("~=", 2, |a, b| a.compare(TruthOperator::ApproxEqual, b)),
        OperatorInfo::new("!=", 2, |a, b| a.compare(TruthOperator::NotEqual, b)),
        OperatorInfo::new("==", 2, |a, b| a.compare(TruthOperator::Equal, b)),
        OperatorInfo::new("+", 3, |a, b| a.add(b)),
        OperatorInfo::new("-", 3, |a, b| a.subtract(b)),
        OperatorInfo::new("*", 4, |a, b| a.multiply(b)),
        OperatorInfo::new("/", 4, |a, b| a.divide(b)),
        OperatorInfo::new("%", 4, |a, b| a.modulo(b)),
        OperatorInfo::new("^", 5, |a, b| a.power(b)).right_associative(),
    ];

    static ref OPERATORS_BY_SYMBOL: HashMap<&'static str, Operator> =
        Operator::ALL.iter().map(|op| (op.symbol(), *op)).collect();

    static ref ARITHMETIC_OPERATORS_BY_SYMBOL: HashMap<&'static str, ArithmeticOperator> =
        ArithmeticOperator::ALL.iter().map(|op| (op.symbol(), *op)).collect();
}

impl Operator {
    pub const ALL: [Operator; 15] = [
        Operator::Or,
        Operator::And,
        Operator::LargerOrEqual,
        Operator::Larger,
        Operator::SmallerOrEqual,
        Operator::Smaller,
        Operator::ApproxEqual,
        Operator::NotEqual,
        Operator::Equal,
        Operator::Plus,
        Operator::Minus,
        Operator::Multiply,
        Operator::Divide,
        Operator::Modulo,
        Operator::Power,
    ];

    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        OPERATORS_BY_SYMBOL.get(symbol).copied()
    }
}

impl BinaryOperator for Operator {
    fn info(self) -> &'static OperatorInfo {
        &OPERATORS[self as usize]
    }
}

impl ArithmeticOperator {
    pub const ALL: [ArithmeticOperator; 8] = [
        ArithmeticOperator::Or,
        ArithmeticOperator::And,
        ArithmeticOperator::Plus,
        ArithmeticOperator::Minus,
        ArithmeticOperator::Multiply,
        ArithmeticOperator::Divide,
        ArithmeticOperator::Modulo,
        ArithmeticOperator::Power,
    ];

    pub fn from_symbol(symbol: &str) -> Option<ArithmeticOperator> {
        ARITHMETIC_OPERATORS_BY_SYMBOL.get(symbol).copied()
    }

    /// The general operator with the same meaning.
    pub fn as_operator(self) -> Operator {
        match self {
            ArithmeticOperator::Or => Operator::Or,
            ArithmeticOperator::And => Operator::And,
            ArithmeticOperator::Plus => Operator::Plus,
            ArithmeticOperator::Minus => Operator::Minus,
            ArithmeticOperator::Multiply => Operator::Multiply,
            ArithmeticOperator::Divide => Operator::Divide,
            ArithmeticOperator::Modulo => Operator::Modulo,
            ArithmeticOperator::Power => Operator::Power,
        }
    }
}

impl BinaryOperator for ArithmeticOperator {
    fn info(self) -> &'static OperatorInfo {
        self.as_operator().info()
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The operators of comparison nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruthOperator {
    Smaller,
    SmallerOrEqual,
    Equal,
    ApproxEqual,
    NotEqual,
    LargerOrEqual,
    Larger,
}

impl TruthOperator {
    pub const ALL: [TruthOperator; 7] = [
        TruthOperator::Smaller,
        TruthOperator::SmallerOrEqual,
        TruthOperator::Equal,
        TruthOperator::ApproxEqual,
        TruthOperator::NotEqual,
        TruthOperator::LargerOrEqual,
        TruthOperator::Larger,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            TruthOperator::Smaller => "<",
            TruthOperator::SmallerOrEqual => "<=",
            TruthOperator::Equal => "==",
            TruthOperator::ApproxEqual => "~=",
            TruthOperator::NotEqual => "!=",
            TruthOperator::LargerOrEqual => ">=",
            TruthOperator::Larger => ">",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<TruthOperator> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn test(self, a: f64, b: f64) -> bool {
        match self {
            TruthOperator::Smaller => a < b,
            TruthOperator::SmallerOrEqual => a <= b,
            TruthOperator::Equal => a == b,
            TruthOperator::ApproxEqual => approx_equal(a, b),
            TruthOperator::NotEqual => a != b,
            TruthOperator::LargerOrEqual => a >= b,
            TruthOperator::Larger => a > b,
        }
    }
}

impl Display for TruthOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Equality with a relative tolerance, absolute for values near zero.
pub fn approx_equal(a: f64, b: f64) -> bool {
    const TOLERANCE: f64 = 1e-9;
    a == b || (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}
