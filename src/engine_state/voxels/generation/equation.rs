//! # Custom Terrain Equations
//!
//! Worlds created with the `custom-equation` generation type compute each
//! column's surface height from a user-written expression, for example
//!
//! ```text
//! baseHeight + continent * 30 + (mountain > 0.2 ? pow(mountain, 2) * 80 : 0)
//! ```
//!
//! The expression is parsed once when the world is created and evaluated per
//! column afterwards. Parsing is recursive descent driven by an explicit
//! operator precedence table; a malformed expression is reported with the
//! byte offset and text of the offending token.
//!
//! ## Grammar
//!
//! * numbers (`12`, `0.5`, `1e3`), parentheses, unary `-` `+` `!`
//! * binary operators, loosest first: `||`, `&&`, `== !=`, `< <= > >=`,
//!   `+ -`, `* / %`, `^` (right associative)
//! * the ternary `cond ? a : b`, loosest of all
//! * variables: `continent`, `mountain`, `detail`, `temperature`,
//!   `humidity`, `x`, `z`
//! * constants: `pi`, `e`, `baseHeight`, `seaLevel`
//! * functions: `sin`, `cos`, `abs` (one argument), `min`, `max`, `pow`
//!   (two arguments)
//!
//! Comparisons and logic evaluate to `1.0` or `0.0`; anything non-zero is
//! true.

use phf::phf_map;

use crate::engine_state::error::EquationError;

use super::terrain::{BASE_HEIGHT, SEA_LEVEL};

/// Per-column inputs an equation can read.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EquationInputs {
    /// Continental noise, `[-1, 1]`.
    pub continent: f64,
    /// Mountain noise, `[-1, 1]`.
    pub mountain: f64,
    /// Detail noise, `[-1, 1]`.
    pub detail: f64,
    /// Biome temperature, `[-1, 1]`.
    pub temperature: f64,
    /// Biome humidity, `[-1, 1]`.
    pub humidity: f64,
    /// World X of the column.
    pub x: f64,
    /// World Z of the column.
    pub z: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Variable {
    Continent,
    Mountain,
    Detail,
    Temperature,
    Humidity,
    X,
    Z,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Function {
    Sin,
    Cos,
    Abs,
    Min,
    Max,
    Pow,
}

impl Function {
    fn arity(self) -> usize {
        match self {
            Function::Sin | Function::Cos | Function::Abs => 1,
            Function::Min | Function::Max | Function::Pow => 2,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Function::Sin => args[0].sin(),
            Function::Cos => args[0].cos(),
            Function::Abs => args[0].abs(),
            Function::Min => args[0].min(args[1]),
            Function::Max => args[0].max(args[1]),
            Function::Pow => args[0].powf(args[1]),
        }
    }
}

static VARIABLES: phf::Map<&'static str, Variable> = phf_map! {
    "continent" => Variable::Continent,
    "mountain" => Variable::Mountain,
    "detail" => Variable::Detail,
    "temperature" => Variable::Temperature,
    "humidity" => Variable::Humidity,
    "x" => Variable::X,
    "z" => Variable::Z,
};

static CONSTANTS: phf::Map<&'static str, f64> = phf_map! {
    "pi" => std::f64::consts::PI,
    "e" => std::f64::consts::E,
    "baseHeight" => BASE_HEIGHT as f64,
    "seaLevel" => SEA_LEVEL as f64,
};

static FUNCTIONS: phf::Map<&'static str, Function> = phf_map! {
    "sin" => Function::Sin,
    "cos" => Function::Cos,
    "abs" => Function::Abs,
    "min" => Function::Min,
    "max" => Function::Max,
    "pow" => Function::Pow,
};

#[derive(Copy, Clone, Debug, PartialEq)]
enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Associativity {
    Left,
    Right,
}

/// Binary operators: spelling, operator, binding power, associativity.
///
/// Longer spellings come first so that `<=` is not read as `<`.
const OPERATOR_TABLE: &[(&str, BinaryOp, u8, Associativity)] = &[
    ("||", BinaryOp::Or, 1, Associativity::Left),
    ("&&", BinaryOp::And, 2, Associativity::Left),
    ("==", BinaryOp::Equal, 3, Associativity::Left),
    ("!=", BinaryOp::NotEqual, 3, Associativity::Left),
    ("<=", BinaryOp::LessEqual, 4, Associativity::Left),
    (">=", BinaryOp::GreaterEqual, 4, Associativity::Left),
    ("<", BinaryOp::Less, 4, Associativity::Left),
    (">", BinaryOp::Greater, 4, Associativity::Left),
    ("+", BinaryOp::Add, 5, Associativity::Left),
    ("-", BinaryOp::Subtract, 5, Associativity::Left),
    ("*", BinaryOp::Multiply, 6, Associativity::Left),
    ("/", BinaryOp::Divide, 6, Associativity::Left),
    ("%", BinaryOp::Remainder, 6, Associativity::Left),
    ("^", BinaryOp::Power, 7, Associativity::Right),
];

/// Unary operators bind tighter than `* / %` but looser than `^`, so
/// `-2^2` is `-4`.
const UNARY_BINDING_POWER: u8 = 7;
/// Deepest nesting of sub-expressions the parser accepts.
const MAX_NESTING: usize = 256;

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Number(f64),
    Variable(Variable),
    Negate(Box<Node>),
    Not(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Number(f64),
    Identifier(String),
    Operator(BinaryOp),
    Bang,
    OpenParen,
    CloseParen,
    Comma,
    Question,
    Colon,
    End,
}

#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
    text: String,
}

fn tokenize(source: &str) -> Result<Vec<Token>, EquationError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut position = 0;

    while position < bytes.len() {
        let byte = bytes[position];
        if byte.is_ascii_whitespace() {
            position += 1;
            continue;
        }
        let start = position;

        if byte.is_ascii_digit() || byte == b'.' {
            position += 1;
            while position < bytes.len() {
                let next = bytes[position];
                let exponent_sign = (next == b'+' || next == b'-')
                    && matches!(bytes[position - 1], b'e' | b'E');
                if next.is_ascii_digit() || next == b'.' || next == b'e' || next == b'E' || exponent_sign {
                    position += 1;
                } else {
                    break;
                }
            }
            let text = &source[start..position];
            let value: f64 = text.parse().map_err(|_| EquationError {
                position: start,
                token: text.to_string(),
                expected: "a number".to_string(),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position: start,
                text: text.to_string(),
            });
            continue;
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            while position < bytes.len()
                && (bytes[position].is_ascii_alphanumeric() || bytes[position] == b'_')
            {
                position += 1;
            }
            let text = &source[start..position];
            tokens.push(Token {
                kind: TokenKind::Identifier(text.to_string()),
                position: start,
                text: text.to_string(),
            });
            continue;
        }

        let rest = &source[start..];
        if let Some((spelling, op, _, _)) = OPERATOR_TABLE
            .iter()
            .find(|(spelling, ..)| rest.starts_with(spelling))
        {
            position += spelling.len();
            tokens.push(Token {
                kind: TokenKind::Operator(*op),
                position: start,
                text: spelling.to_string(),
            });
            continue;
        }

        let kind = match byte {
            b'!' => TokenKind::Bang,
            b'(' => TokenKind::OpenParen,
            b')' => TokenKind::CloseParen,
            b',' => TokenKind::Comma,
            b'?' => TokenKind::Question,
            b':' => TokenKind::Colon,
            _ => {
                let character = rest.chars().next().unwrap_or('?');
                return Err(EquationError {
                    position: start,
                    token: character.to_string(),
                    expected: "an operator, number or name".to_string(),
                });
            }
        };
        position += 1;
        tokens.push(Token {
            kind,
            position: start,
            text: source[start..position].to_string(),
        });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: source.len(),
        text: "end of input".to_string(),
    });
    Ok(tokens)
}

fn binding(op: BinaryOp) -> (u8, Associativity) {
    OPERATOR_TABLE
        .iter()
        .find(|(_, candidate, ..)| *candidate == op)
        .map(|(_, _, power, assoc)| (*power, *assoc))
        .unwrap_or((0, Associativity::Left))
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn error(&self, token: &Token, expected: &str) -> EquationError {
        EquationError {
            position: token.position,
            token: token.text.clone(),
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, EquationError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), expected))
        }
    }

    fn parse_expression(&mut self) -> Result<Node, EquationError> {
        let condition = self.parse_binary(1)?;
        if self.peek().kind != TokenKind::Question {
            return Ok(condition);
        }
        self.advance();
        let when_true = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let when_false = self.parse_expression()?;
        Ok(Node::Ternary(
            Box::new(condition),
            Box::new(when_true),
            Box::new(when_false),
        ))
    }

    fn parse_binary(&mut self, min_power: u8) -> Result<Node, EquationError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(self.peek(), "a shallower expression"));
        }
        self.depth += 1;
        let parsed = self.parse_binary_inner(min_power);
        self.depth -= 1;
        parsed
    }

    fn parse_binary_inner(&mut self, min_power: u8) -> Result<Node, EquationError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Operator(op) => op,
                _ => break,
            };
            let (power, assoc) = binding(op);
            if power < min_power {
                break;
            }
            self.advance();
            let next_min = match assoc {
                Associativity::Left => power + 1,
                Associativity::Right => power,
            };
            let right = self.parse_binary(next_min)?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, EquationError> {
        match self.peek().kind {
            TokenKind::Operator(BinaryOp::Subtract) => {
                self.advance();
                Ok(Node::Negate(Box::new(self.parse_binary(UNARY_BINDING_POWER)?)))
            }
            TokenKind::Operator(BinaryOp::Add) => {
                self.advance();
                self.parse_binary(UNARY_BINDING_POWER)
            }
            TokenKind::Bang => {
                self.advance();
                Ok(Node::Not(Box::new(self.parse_binary(UNARY_BINDING_POWER)?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, EquationError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Number(value) => Ok(Node::Number(*value)),
            TokenKind::OpenParen => {
                let inner = self.parse_expression()?;
                self.expect(TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Identifier(name) => {
                if let Some(function) = FUNCTIONS.get(name.as_str()) {
                    return self.parse_call(*function, &token);
                }
                if let Some(variable) = VARIABLES.get(name.as_str()) {
                    return Ok(Node::Variable(*variable));
                }
                if let Some(constant) = CONSTANTS.get(name.as_str()) {
                    return Ok(Node::Number(*constant));
                }
                Err(self.error(&token, "a known variable, constant or function"))
            }
            _ => Err(self.error(&token, "a number, name or '('")),
        }
    }

    fn parse_call(&mut self, function: Function, name: &Token) -> Result<Node, EquationError> {
        self.expect(TokenKind::OpenParen, "'(' after function name")?;
        let mut args = Vec::with_capacity(function.arity());
        if self.peek().kind != TokenKind::CloseParen {
            loop {
                args.push(self.parse_expression()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen, "')' or ','")?;
        if args.len() != function.arity() {
            let expected = format!("{} argument(s) for {}", function.arity(), name.text);
            return Err(self.error(name, &expected));
        }
        Ok(Node::Call(function, args))
    }
}

fn truth(value: f64) -> f64 {
    if value != 0.0 {
        1.0
    } else {
        0.0
    }
}

fn evaluate(node: &Node, inputs: &EquationInputs) -> f64 {
    match node {
        Node::Number(value) => *value,
        Node::Variable(variable) => match variable {
            Variable::Continent => inputs.continent,
            Variable::Mountain => inputs.mountain,
            Variable::Detail => inputs.detail,
            Variable::Temperature => inputs.temperature,
            Variable::Humidity => inputs.humidity,
            Variable::X => inputs.x,
            Variable::Z => inputs.z,
        },
        Node::Negate(inner) => -evaluate(inner, inputs),
        Node::Not(inner) => 1.0 - truth(evaluate(inner, inputs)),
        Node::Binary(op, left, right) => {
            let l = evaluate(left, inputs);
            // Short-circuit logic before touching the right side.
            match op {
                BinaryOp::Or if l != 0.0 => return 1.0,
                BinaryOp::And if l == 0.0 => return 0.0,
                _ => {}
            }
            let r = evaluate(right, inputs);
            match op {
                BinaryOp::Or | BinaryOp::And => truth(r),
                BinaryOp::Equal => truth((l == r) as u8 as f64),
                BinaryOp::NotEqual => truth((l != r) as u8 as f64),
                BinaryOp::Less => truth((l < r) as u8 as f64),
                BinaryOp::LessEqual => truth((l <= r) as u8 as f64),
                BinaryOp::Greater => truth((l > r) as u8 as f64),
                BinaryOp::GreaterEqual => truth((l >= r) as u8 as f64),
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide => l / r,
                BinaryOp::Remainder => l % r,
                BinaryOp::Power => l.powf(r),
            }
        }
        Node::Call(function, args) => {
            let mut values = [0.0; 2];
            for (slot, arg) in values.iter_mut().zip(args) {
                *slot = evaluate(arg, inputs);
            }
            function.apply(&values[..args.len()])
        }
        Node::Ternary(condition, when_true, when_false) => {
            if evaluate(condition, inputs) != 0.0 {
                evaluate(when_true, inputs)
            } else {
                evaluate(when_false, inputs)
            }
        }
    }
}

/// A parsed terrain height expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    source: String,
    root: Node,
}

impl Equation {
    /// Parses an expression.
    ///
    /// # Errors
    /// An [`EquationError`] naming the first token that could not be parsed.
    pub fn parse(source: &str) -> Result<Self, EquationError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
        };
        let root = parser.parse_expression()?;
        let trailing = parser.peek().clone();
        if trailing.kind != TokenKind::End {
            return Err(parser.error(&trailing, "an operator or end of input"));
        }
        Ok(Equation {
            source: source.to_string(),
            root,
        })
    }

    /// The text this equation was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression for one column.
    ///
    /// Non-finite results (division by zero and the like) evaluate to the
    /// base height.
    pub fn evaluate(&self, inputs: &EquationInputs) -> f64 {
        let value = evaluate(&self.root, inputs);
        if value.is_finite() {
            value
        } else {
            BASE_HEIGHT as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> f64 {
        Equation::parse(source).unwrap().evaluate(&EquationInputs::default())
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("7 % 4 * 2"), 6.0);
    }

    #[test]
    fn comparisons_logic_and_ternary() {
        assert_eq!(eval("1 < 2 && 3 >= 3"), 1.0);
        assert_eq!(eval("1 > 2 || 0"), 0.0);
        assert_eq!(eval("!0"), 1.0);
        assert_eq!(eval("1 == 1 ? 5 : 6"), 5.0);
        assert_eq!(eval("0 ? 5 : 1 ? 7 : 8"), 7.0);
    }

    #[test]
    fn names_resolve() {
        let equation = Equation::parse("baseHeight + continent * 10 + max(x, z) + pow(2, 3)").unwrap();
        let inputs = EquationInputs {
            continent: 0.5,
            x: 3.0,
            z: -1.0,
            ..Default::default()
        };
        assert_eq!(equation.evaluate(&inputs), BASE_HEIGHT as f64 + 5.0 + 3.0 + 8.0);
        assert!((eval("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert_eq!(eval("seaLevel"), SEA_LEVEL as f64);
        assert_eq!(eval("abs(-1.5e1)"), 15.0);
    }

    #[test]
    fn errors_pinpoint_the_offending_token() {
        let err = Equation::parse("64 + * 3").unwrap_err();
        assert_eq!(err.position, 5);
        assert_eq!(err.token, "*");

        let err = Equation::parse("64 + height").unwrap_err();
        assert_eq!(err.position, 5);
        assert_eq!(err.token, "height");

        let err = Equation::parse("(1 + 2").unwrap_err();
        assert_eq!(err.token, "end of input");
        assert_eq!(err.position, 6);

        let err = Equation::parse("min(1)").unwrap_err();
        assert_eq!(err.token, "min");

        let err = Equation::parse("1 $ 2").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.to_string().contains("column 3"));

        assert!(Equation::parse("1 2").is_err());
        assert!(Equation::parse("1 ? 2").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = Equation::parse(&nested).unwrap_err();
        assert_eq!(err.expected, "a shallower expression");

        assert!(Equation::parse(&"-".repeat(100_000)).is_err());
        assert!(Equation::parse(&format!("{}1", "!".repeat(100_000))).is_err());

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert!(Equation::parse(&shallow).is_ok());
    }

    #[test]
    fn non_finite_results_fall_back() {
        assert_eq!(eval("1 / 0"), BASE_HEIGHT as f64);
    }
}
