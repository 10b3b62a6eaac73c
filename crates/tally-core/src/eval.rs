//! Restricted arithmetic evaluator for counting messages.
//!
//! Message text is tokenized and parsed into a small expression tree
//! ([`Expr`]) that can only represent numeric literals, `+ - * / **`, unary
//! minus, and the allow-listed functions/constants `sin cos tan log log10 sqrt
//! exp pi e` (case-insensitive). Anything outside that set is rejected while
//! parsing, so evaluation is a single exhaustive `match` with no dynamic
//! dispatch and no side effects.
//!
//! Inputs are bounded by [`MAX_EXPRESSION_LEN`] and [`MAX_NESTING_DEPTH`]; the
//! parser refuses to descend further instead of growing the stack.

use std::{fmt, iter::Peekable, str::CharIndices};

/// Longest message (in bytes) the evaluator will look at.
pub const MAX_EXPRESSION_LEN: usize = 256;
/// Deepest nesting of parentheses / unary minus / exponents / call arguments.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Empty, malformed or oversized input.
    #[error("parse error: {0}")]
    Parse(String),

    /// Well-formed input that uses something outside the allow-list.
    #[error("unsupported expression: {0}")]
    Unsupported(String),

    /// Division by zero, out-of-domain argument, non-finite result, bad arity.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Log,
    Log10,
    Sqrt,
    Exp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Parsed expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(f64),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    Name(Constant),
}

enum Symbol {
    Function(Function),
    Constant(Constant),
}

fn lookup(name: &str) -> Option<Symbol> {
    let sym = match name.to_ascii_lowercase().as_str() {
        "sin" => Symbol::Function(Function::Sin),
        "cos" => Symbol::Function(Function::Cos),
        "tan" => Symbol::Function(Function::Tan),
        "log" => Symbol::Function(Function::Log),
        "log10" => Symbol::Function(Function::Log10),
        "sqrt" => Symbol::Function(Function::Sqrt),
        "exp" => Symbol::Function(Function::Exp),
        "pi" => Symbol::Constant(Constant::Pi),
        "e" => Symbol::Constant(Constant::E),
        _ => return None,
    };
    Some(sym)
}

impl Function {
    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Sqrt => "sqrt",
            Function::Exp => "exp",
        }
    }

    fn apply(self, args: &[f64]) -> EvalResult<f64> {
        let arity_error = || {
            EvalError::Evaluation(format!(
                "{}() got {} argument(s)",
                self.name(),
                args.len()
            ))
        };

        match (self, args) {
            (Function::Log, [x, base]) => {
                if *x <= 0.0 || *base <= 0.0 || *base == 1.0 {
                    return Err(domain_error(self));
                }
                Ok(x.ln() / base.ln())
            }
            (_, [x]) => {
                let x = *x;
                match self {
                    Function::Sin => Ok(x.sin()),
                    Function::Cos => Ok(x.cos()),
                    Function::Tan => Ok(x.tan()),
                    Function::Exp => Ok(x.exp()),
                    Function::Log if x > 0.0 => Ok(x.ln()),
                    Function::Log10 if x > 0.0 => Ok(x.log10()),
                    Function::Sqrt if x >= 0.0 => Ok(x.sqrt()),
                    Function::Log | Function::Log10 | Function::Sqrt => Err(domain_error(self)),
                }
            }
            _ => Err(arity_error()),
        }
    }
}

fn domain_error(func: Function) -> EvalError {
    EvalError::Evaluation(format!("{}() argument out of domain", func.name()))
}

impl Constant {
    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::E => std::f64::consts::E,
        }
    }
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> EvalResult<f64> {
        match self {
            BinaryOp::Add => Ok(a + b),
            BinaryOp::Sub => Ok(a - b),
            BinaryOp::Mul => Ok(a * b),
            BinaryOp::Div if b == 0.0 => Err(EvalError::Evaluation("division by zero".to_string())),
            BinaryOp::Div => Ok(a / b),
            BinaryOp::Pow if a == 0.0 && b < 0.0 => Err(EvalError::Evaluation(
                "zero cannot be raised to a negative power".to_string(),
            )),
            BinaryOp::Pow => Ok(a.powf(b)),
        }
    }
}

impl Expr {
    /// Evaluate the tree. Every intermediate value must be finite.
    pub fn eval(&self) -> EvalResult<f64> {
        let value = match self {
            Expr::Literal(v) => *v,
            Expr::Name(c) => c.value(),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => -operand.eval()?,
            Expr::Binary { op, lhs, rhs } => op.apply(lhs.eval()?, rhs.eval()?)?,
            Expr::Call { func, args } => {
                let values = args.iter().map(Expr::eval).collect::<EvalResult<Vec<_>>>()?;
                func.apply(&values)?
            }
        };

        if !value.is_finite() {
            return Err(EvalError::Evaluation("result is not a finite number".to_string()));
        }
        Ok(value)
    }
}

/// Parse and evaluate `text`.
pub fn evaluate(text: &str) -> EvalResult<f64> {
    parse(text)?.eval()
}

/// Round half to even and convert to an integer count.
///
/// Returns `None` when the rounded value does not fit an `i64`.
pub fn round_to_count(value: f64) -> Option<i64> {
    let rounded = value.round_ties_even();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}

/// Evaluate `text` as a counting candidate; any failure means "not a number".
pub fn evaluate_count(text: &str) -> Option<i64> {
    evaluate(text).ok().and_then(round_to_count)
}

// ============== Lexer ==============

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    LParen,
    RParen,
    Comma,
    Dot,
    Str,
    /// Operator or punctuation that belongs to a richer language.
    Foreign(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::DoubleStar => f.write_str("**"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Dot => f.write_str("."),
            Token::Str => f.write_str("string literal"),
            Token::Foreign(s) => f.write_str(s),
        }
    }
}

const FOREIGN_CHARS: &str = "%<>=!&|^~[]{}@:;";

fn tokenize(input: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next_is_digit(input, start + 1)) {
            let value = lex_number(input, &mut chars)?;
            if let Some(&(_, next)) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    return Err(EvalError::Parse(format!("invalid numeric literal near `{next}`")));
                }
            }
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut end = start;
            while let Some(&(i, ch)) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    end = i + ch.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(input[start..end].to_string()));
            continue;
        }

        chars.next();
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                if chars.peek().map(|&(_, n)| n) == Some('*') {
                    chars.next();
                    Token::DoubleStar
                } else {
                    Token::Star
                }
            }
            '/' => {
                if chars.peek().map(|&(_, n)| n) == Some('/') {
                    chars.next();
                    Token::Foreign("//".to_string())
                } else {
                    Token::Slash
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '\'' | '"' => {
                skip_string(c, &mut chars)?;
                Token::Str
            }
            c if FOREIGN_CHARS.contains(c) => Token::Foreign(c.to_string()),
            other => return Err(EvalError::Parse(format!("unexpected character `{other}`"))),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn next_is_digit(input: &str, at: usize) -> bool {
    input[at..].chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn lex_number(input: &str, chars: &mut Peekable<CharIndices<'_>>) -> EvalResult<f64> {
    let mut literal = String::new();
    let mut seen_dot = false;

    // Mantissa: digits with optional `_` separators and at most one dot.
    while let Some(&(i, c)) = chars.peek() {
        match c {
            '0'..='9' => literal.push(c),
            '_' if literal.ends_with(|p: char| p.is_ascii_digit())
                && next_is_digit(input, i + 1) => {}
            '.' if !seen_dot => {
                seen_dot = true;
                literal.push(c);
            }
            _ => break,
        }
        chars.next();
    }

    // Exponent: only consumed when followed by digits (optionally signed).
    if let Some(&(i, c)) = chars.peek() {
        if c == 'e' || c == 'E' {
            let rest = &input[i + 1..];
            let digits_at = if rest.starts_with(['+', '-']) { 1 } else { 0 };
            if next_is_digit(rest, digits_at) {
                literal.push('e');
                chars.next();
                while let Some(&(j, d)) = chars.peek() {
                    let sign_ok = j == i + 1 && (d == '+' || d == '-');
                    let sep_ok = d == '_'
                        && literal.ends_with(|p: char| p.is_ascii_digit())
                        && next_is_digit(input, j + 1);
                    if d.is_ascii_digit() || sign_ok {
                        literal.push(d);
                    } else if !sep_ok {
                        break;
                    }
                    chars.next();
                }
            }
        }
    }

    literal
        .parse::<f64>()
        .map_err(|_| EvalError::Parse(format!("invalid numeric literal `{literal}`")))
}

fn skip_string(quote: char, chars: &mut Peekable<CharIndices<'_>>) -> EvalResult<()> {
    for (_, c) in chars.by_ref() {
        if c == quote {
            return Ok(());
        }
    }
    Err(EvalError::Parse("unterminated string literal".to_string()))
}

// ============== Parser ==============

/// Parse `text` into an expression tree.
pub fn parse(text: &str) -> EvalResult<Expr> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EvalError::Parse("empty expression".to_string()));
    }
    if text.len() > MAX_EXPRESSION_LEN {
        return Err(EvalError::Parse(format!(
            "expression longer than {MAX_EXPRESSION_LEN} bytes"
        )));
    }

    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.unexpected(tok.clone())),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn unexpected(&self, tok: Token) -> EvalError {
        match tok {
            Token::Foreign(op) => EvalError::Unsupported(format!("operator `{op}`")),
            Token::Dot => EvalError::Unsupported("attribute access".to_string()),
            Token::Str => EvalError::Unsupported("string literal".to_string()),
            other => EvalError::Parse(format!("unexpected `{other}`")),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(EvalError::Parse(format!(
                "expression nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    // factor := '-' factor | power
    fn factor(&mut self) -> EvalResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                let operand = self.nested(Self::factor)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(Token::Plus) => Err(EvalError::Unsupported("unary plus".to_string())),
            _ => self.power(),
        }
    }

    // power := primary ['**' factor]
    fn power(&mut self) -> EvalResult<Expr> {
        let base = self.primary()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        let exponent = self.nested(Self::factor)?;
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            lhs: Box::new(base),
            rhs: Box::new(exponent),
        })
    }

    // primary := number | name | name '(' args ')' | '(' expression ')'
    fn primary(&mut self) -> EvalResult<Expr> {
        match self.bump() {
            Some(Token::Number(v)) => Ok(Expr::Literal(v)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::expression)?;
                if !self.eat(&Token::RParen) {
                    return Err(EvalError::Parse("missing closing parenthesis".to_string()));
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.name(name),
            Some(tok) => Err(self.unexpected(tok)),
            None => Err(EvalError::Parse("unexpected end of expression".to_string())),
        }
    }

    fn name(&mut self, name: String) -> EvalResult<Expr> {
        if self.peek() == Some(&Token::Dot) {
            return Err(EvalError::Unsupported(format!("attribute access on `{name}`")));
        }

        let called = self.eat(&Token::LParen);
        match (lookup(&name), called) {
            (Some(Symbol::Function(func)), true) => {
                let args = self.nested(Self::arguments)?;
                Ok(Expr::Call { func, args })
            }
            (Some(Symbol::Constant(c)), false) => Ok(Expr::Name(c)),
            (Some(Symbol::Function(func)), false) => Err(EvalError::Unsupported(format!(
                "function `{}` must be called",
                func.name()
            ))),
            (Some(Symbol::Constant(_)), true) => {
                Err(EvalError::Unsupported(format!("`{name}` is not callable")))
            }
            (None, true) => Err(EvalError::Unsupported(format!("unknown function `{name}`"))),
            (None, false) => Err(EvalError::Unsupported(format!("unknown name `{name}`"))),
        }
    }

    // arguments := [expression (',' expression)*] ')'
    fn arguments(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            return match self.bump() {
                Some(tok) => Err(self.unexpected(tok)),
                None => Err(EvalError::Parse("missing closing parenthesis".to_string())),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(text: &str, expected: f64) {
        let got = evaluate(text).unwrap_or_else(|e| panic!("{text}: {e}"));
        assert!(
            (got - expected).abs() < 1e-9,
            "{text}: expected {expected}, got {got}"
        );
    }

    fn unsupported(text: &str) {
        assert!(
            matches!(evaluate(text), Err(EvalError::Unsupported(_))),
            "{text}: {:?}",
            evaluate(text)
        );
    }

    #[test]
    fn evaluates_reference_expressions() {
        approx("sin(PI/2) + cos(0)", 2.0);
        approx("Sin(pi/2) + COS(0)", 2.0);
        approx("2 * (3 + 4)", 14.0);
        approx("log10(100)", 2.0);
        approx("sqrt(16)", 4.0);
        approx("exp(0) + log(e)", 2.0);
        approx("log(8, 2)", 3.0);
    }

    #[test]
    fn literals() {
        approx("42", 42.0);
        approx("  7 ", 7.0);
        approx("1.5", 1.5);
        approx(".5", 0.5);
        approx("5.", 5.0);
        approx("1e3", 1000.0);
        approx("2.5E-1", 0.25);
        approx("1_000", 1000.0);
    }

    #[test]
    fn precedence_and_associativity() {
        approx("1 + 2 * 3", 7.0);
        approx("10 - 4 - 3", 3.0);
        approx("2 ** 3 ** 2", 512.0);
        approx("-2 ** 2", -4.0);
        approx("2 ** -1", 0.5);
        approx("-(3 - 5)", 2.0);
        approx("8 / 4 / 2", 1.0);
        approx("--3", 3.0);
    }

    #[test]
    fn allow_list_is_enforced() {
        unsupported("os.system('x')");
        unsupported("__import__('os')");
        unsupported("foo");
        unsupported("abs(-1)");
        unsupported("sin");
        unsupported("pi()");
        unsupported("7 % 3");
        unsupported("7 // 3");
        unsupported("+5");
        unsupported("1 < 2");
        unsupported("'5'");
        unsupported("log(x=1)");
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        for text in ["", "   ", "1 +", "(1 + 2", "5 apples", "2pi", "1__0", "1 2", "3 ?", ")"] {
            assert!(
                matches!(evaluate(text), Err(EvalError::Parse(_)) | Err(EvalError::Unsupported(_))),
                "{text}: {:?}",
                evaluate(text)
            );
        }
        assert!(matches!(evaluate(""), Err(EvalError::Parse(_))));
        assert!(matches!(evaluate("1 +"), Err(EvalError::Parse(_))));
        assert!(matches!(evaluate("(1 + 2"), Err(EvalError::Parse(_))));
        assert!(matches!(evaluate("2pi"), Err(EvalError::Parse(_))));
    }

    #[test]
    fn evaluation_errors_propagate() {
        for text in [
            "1 / 0",
            "1 / (2 - 2)",
            "log(0)",
            "log(-1)",
            "log10(0)",
            "sqrt(-4)",
            "log(8, 1)",
            "0 ** -1",
            "(-8) ** (1/3)",
            "exp(1000)",
            "10 ** 400",
            "sin()",
            "sqrt(1, 2)",
        ] {
            assert!(
                matches!(evaluate(text), Err(EvalError::Evaluation(_))),
                "{text}: {:?}",
                evaluate(text)
            );
        }
    }

    #[test]
    fn oversized_or_deep_input_is_rejected() {
        let long = "1+".repeat(MAX_EXPRESSION_LEN) + "1";
        assert!(matches!(evaluate(&long), Err(EvalError::Parse(_))));

        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(deep.len() <= MAX_EXPRESSION_LEN);
        assert!(matches!(evaluate(&deep), Err(EvalError::Parse(_))));

        let negations = "-".repeat(200) + "1";
        assert!(matches!(evaluate(&negations), Err(EvalError::Parse(_))));

        let tower = "2**".repeat(60) + "1";
        assert!(matches!(evaluate(&tower), Err(EvalError::Parse(_))));

        let fine = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        approx(&fine, 1.0);
    }

    #[test]
    fn tree_shape_is_a_tagged_variant() {
        let expr = parse("-sqrt(4) * pi").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(Expr::Call {
                        func: Function::Sqrt,
                        args: vec![Expr::Literal(4.0)],
                    }),
                }),
                rhs: Box::new(Expr::Name(Constant::Pi)),
            }
        );
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_to_count(2.5), Some(2));
        assert_eq!(round_to_count(3.5), Some(4));
        assert_eq!(round_to_count(-0.5), Some(0));
        assert_eq!(round_to_count(6.49), Some(6));
        assert_eq!(round_to_count(1e300), None);
        assert_eq!(round_to_count(f64::NAN), None);
    }

    #[test]
    fn evaluate_count_swallows_errors() {
        assert_eq!(evaluate_count("12 / 2"), Some(6));
        assert_eq!(evaluate_count("sqrt(2) ** 2"), Some(2));
        assert_eq!(evaluate_count("hello"), None);
        assert_eq!(evaluate_count("1/0"), None);
    }
}
