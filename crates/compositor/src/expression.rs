//! Band-math expressions such as `(nir - red) / (nir + red)`.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | band | '(' expr ')'
//! ```
//!
//! Exponentiation is right-associative and binds tighter than unary minus,
//! so `-2^2` is `-4`.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use mosaic_common::{MosaicError, MosaicResult};

/// What happens to NaN or infinite results of band math.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Write 0.0 and keep the pixel's validity from the composite mask.
    #[default]
    ReplaceWithZero,
    /// Write the no-data sentinel and mark the pixel invalid.
    MaskOut,
}

impl NonFinitePolicy {
    pub fn parse(s: &str) -> MosaicResult<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "replace_with_zero" | "zero" => Ok(NonFinitePolicy::ReplaceWithZero),
            "mask_out" | "mask" => Ok(NonFinitePolicy::MaskOut),
            _ => Err(MosaicError::invalid_parameter(
                "non_finite_policy",
                format!("unknown policy '{}' (expected replace_with_zero or mask_out)", s),
            )),
        }
    }
}

impl FromStr for NonFinitePolicy {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    #[inline]
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f32),
    Band(String),
    Neg(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f32),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(BinaryOp::Sub));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '^' => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Op(BinaryOp::Pow));
                    i += 2;
                } else {
                    tokens.push(Token::Op(BinaryOp::Mul));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent suffix: 1e-3, 2.5E4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f32>()
                    .map_err(|_| format!("'{}' is not a number", text))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}' at {}", other, i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Node, String> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, String> {
        if let Some(Token::Op(BinaryOp::Sub)) = self.peek() {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node, String> {
        let base = self.primary()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Ident(name)) => Ok(Node::Band(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::RParen) => Err("unexpected ')'".to_string()),
            Some(Token::Op(op)) => Err(format!("unexpected operator '{}'", op.symbol())),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Intermediate result: a scalar until a band is involved.
enum Value {
    Scalar(f32),
    Grid(Array2<f32>),
}

impl Value {
    fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        match (lhs, rhs) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(op.apply(a, b)),
            (Value::Grid(a), Value::Scalar(b)) => Value::Grid(a.mapv_into(|v| op.apply(v, b))),
            (Value::Scalar(a), Value::Grid(b)) => Value::Grid(b.mapv_into(|v| op.apply(a, v))),
            (Value::Grid(mut a), Value::Grid(b)) => {
                Zip::from(&mut a).and(&b).for_each(|x, &y| *x = op.apply(*x, y));
                Value::Grid(a)
            }
        }
    }
}

/// A parsed band-math formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse a formula. Syntax errors are reported as `InvalidExpression`.
    pub fn parse(source: &str) -> MosaicResult<Self> {
        let invalid = |message: String| MosaicError::InvalidExpression {
            expression: source.to_string(),
            message,
        };

        let tokens = tokenize(source).map_err(invalid)?;
        if tokens.is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr().map_err(invalid)?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected trailing {:?}", token)));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The formula as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct band identifiers in order of first use.
    pub fn bands(&self) -> Vec<&str> {
        fn walk<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
            match node {
                Node::Number(_) => {}
                Node::Band(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Node::Neg(inner) => walk(inner, out),
                Node::Binary { lhs, rhs, .. } => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Fail with `UnknownBand` for the first identifier not in `available`.
    pub fn check_bands(&self, available: &[String]) -> MosaicResult<()> {
        match self.bands().into_iter().find(|b| !available.iter().any(|a| a.as_str() == *b)) {
            Some(missing) => Err(MosaicError::unknown_band(missing, available)),
            None => Ok(()),
        }
    }

    /// Evaluate over `shape` pixels, looking bands up with `band`.
    ///
    /// Non-finite results are left as they are; the caller applies its
    /// [`NonFinitePolicy`].
    pub fn evaluate<'a, F>(&self, shape: (usize, usize), band: F) -> MosaicResult<Array2<f32>>
    where
        F: Fn(&str) -> MosaicResult<ArrayView2<'a, f32>>,
    {
        fn eval<'a, F>(node: &Node, shape: (usize, usize), band: &F) -> MosaicResult<Value>
        where
            F: Fn(&str) -> MosaicResult<ArrayView2<'a, f32>>,
        {
            Ok(match node {
                Node::Number(v) => Value::Scalar(*v),
                Node::Band(name) => {
                    let view = band(name)?;
                    if view.dim() != shape {
                        return Err(MosaicError::GridMismatch(format!(
                            "band {} is {:?}, expected {:?}",
                            name,
                            view.dim(),
                            shape
                        )));
                    }
                    Value::Grid(view.to_owned())
                }
                Node::Neg(inner) => match eval(inner, shape, band)? {
                    Value::Scalar(v) => Value::Scalar(-v),
                    Value::Grid(g) => Value::Grid(g.mapv_into(|v| -v)),
                },
                Node::Binary { op, lhs, rhs } => {
                    let lhs = eval(lhs, shape, band)?;
                    let rhs = eval(rhs, shape, band)?;
                    Value::binary(*op, lhs, rhs)
                }
            })
        }

        Ok(match eval(&self.root, shape, &band)? {
            Value::Grid(grid) => grid,
            Value::Scalar(v) => Array2::from_elem(shape, v),
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
