//! Environment marker parsing and evaluation.
//!
//! Markers are boolean expressions over environment facts
//! (`sys_platform == "win32" and python_version >= "3.6"`). Leaves compare a
//! variable against a literal; internal nodes are `and`/`or`; parentheses
//! group. Version-class variables (`python_version` and friends) compare
//! with version ordering, platform-class variables with exact string
//! comparison.
//!
//! Evaluation never fails: a leaf naming an unknown variable evaluates
//! false instead of erroring.

use std::fmt;

use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::constraint::Constraint;
use crate::environment::MarkerEnvironment;
use crate::version::Version;

/// Variables whose values are compared as versions, not strings.
const VERSION_VARIABLES: &[&str] = &[
    "python_version",
    "python_full_version",
    "implementation_version",
];

/// A predicate over environment facts gating whether a dependency applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// The always-true marker (no restriction).
    Any,
    /// A single `variable op literal` comparison.
    Expr {
        var: String,
        op: MarkerOp,
        value: String,
    },
    /// All children must hold.
    And(Vec<Marker>),
    /// At least one child must hold.
    Or(Vec<Marker>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `var in "literal"` — the variable's value occurs in the literal.
    In,
    NotIn,
    /// `"literal" in var` — the literal occurs in the variable's value.
    Contains,
    NotContains,
}

impl Marker {
    /// Parse a marker expression.
    pub fn parse(text: &str) -> PyriteResult<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            input: text,
        };
        let marker = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(PyriteError::parse(
                format!("unexpected trailing `{}`", parser.describe_current()),
                text,
            ));
        }
        Ok(marker)
    }

    /// Evaluate against an environment. Total: unknown variables make their
    /// leaf false rather than failing.
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        match self {
            Marker::Any => true,
            Marker::And(children) => children.iter().all(|m| m.evaluate(env)),
            Marker::Or(children) => children.iter().any(|m| m.evaluate(env)),
            Marker::Expr { var, op, value } => {
                let Some(actual) = env.get(var) else {
                    return false;
                };
                evaluate_comparison(var, actual, *op, value)
            }
        }
    }

    /// Whether this is the unrestricted marker.
    pub fn is_any(&self) -> bool {
        matches!(self, Marker::Any)
    }

    /// Both restrictions must hold (a dependency edge's own marker combined
    /// with its target's self-marker).
    pub fn intersect(&self, other: &Marker) -> Marker {
        match (self, other) {
            (Marker::Any, _) => other.clone(),
            (_, Marker::Any) => self.clone(),
            _ if self == other => self.clone(),
            _ => {
                let mut children = Vec::new();
                for marker in [self, other] {
                    match marker {
                        Marker::And(parts) => children.extend(parts.iter().cloned()),
                        other => children.push(other.clone()),
                    }
                }
                Marker::And(children)
            }
        }
    }

    /// Either restriction suffices (a package reachable through multiple
    /// dependency paths).
    pub fn union(&self, other: &Marker) -> Marker {
        match (self, other) {
            (Marker::Any, _) | (_, Marker::Any) => Marker::Any,
            _ if self == other => self.clone(),
            _ => {
                let mut children = Vec::new();
                for marker in [self, other] {
                    match marker {
                        Marker::Or(parts) => children.extend(parts.iter().cloned()),
                        other => children.push(other.clone()),
                    }
                }
                Marker::Or(children)
            }
        }
    }

    /// Extract the python-interpreter constraint implied by this marker.
    ///
    /// `python_version == "2.7"` implies `~2.7` (the whole minor series),
    /// ordering operators map directly, and `and`/`or` map to
    /// intersection/union. Clauses about other variables impose nothing.
    pub fn python_constraint(&self) -> Constraint {
        match self {
            Marker::Any => Constraint::Any,
            Marker::And(children) => children
                .iter()
                .fold(Constraint::Any, |acc, m| acc.intersect(&m.python_constraint())),
            Marker::Or(children) => children
                .iter()
                .map(Marker::python_constraint)
                .reduce(|acc, c| acc.union(&c))
                .unwrap_or(Constraint::Any),
            Marker::Expr { var, op, value } => {
                if var != "python_version" && var != "python_full_version" {
                    return Constraint::Any;
                }
                let spec = match op {
                    MarkerOp::Eq => format!("~{value}"),
                    MarkerOp::Ne => format!("!={value}"),
                    MarkerOp::Lt => format!("<{value}"),
                    MarkerOp::Le => format!("<={value}"),
                    MarkerOp::Gt => format!(">{value}"),
                    MarkerOp::Ge => format!(">={value}"),
                    _ => return Constraint::Any,
                };
                Constraint::parse(&spec).unwrap_or(Constraint::Any)
            }
        }
    }

    /// Collect the extras this marker is gated on (`extra == "socks"`).
    pub fn gated_extras(&self) -> Vec<String> {
        let mut extras = Vec::new();
        self.collect_extras(&mut extras);
        extras
    }

    fn collect_extras(&self, out: &mut Vec<String>) {
        match self {
            Marker::Expr { var, op, value } if var == "extra" && *op == MarkerOp::Eq => {
                if !out.contains(value) {
                    out.push(value.clone());
                }
            }
            Marker::And(children) | Marker::Or(children) => {
                for child in children {
                    child.collect_extras(out);
                }
            }
            _ => {}
        }
    }
}

fn evaluate_comparison(var: &str, actual: &str, op: MarkerOp, literal: &str) -> bool {
    match op {
        MarkerOp::In => literal.contains(actual),
        MarkerOp::NotIn => !literal.contains(actual),
        MarkerOp::Contains => actual.contains(literal),
        MarkerOp::NotContains => !actual.contains(literal),
        _ => {
            if VERSION_VARIABLES.contains(&var) {
                if let (Ok(a), Ok(b)) = (Version::parse(actual), Version::parse(literal)) {
                    return match op {
                        MarkerOp::Eq => a == b,
                        MarkerOp::Ne => a != b,
                        MarkerOp::Lt => a < b,
                        MarkerOp::Le => a <= b,
                        MarkerOp::Gt => a > b,
                        MarkerOp::Ge => a >= b,
                        _ => unreachable!(),
                    };
                }
            }
            match op {
                MarkerOp::Eq => actual == literal,
                MarkerOp::Ne => actual != literal,
                MarkerOp::Lt => actual < literal,
                MarkerOp::Le => actual <= literal,
                MarkerOp::Gt => actual > literal,
                MarkerOp::Ge => actual >= literal,
                _ => unreachable!(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
    Op(&'static str),
    LParen,
    RParen,
    And,
    Or,
    In,
    Not,
}

fn tokenize(text: &str) -> PyriteResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => literal.push(c),
                        None => {
                            return Err(PyriteError::parse("unterminated string literal", text))
                        }
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            '<' | '>' | '=' | '!' => {
                chars.next();
                let two = chars.peek() == Some(&'=');
                let op = match (ch, two) {
                    ('<', true) => "<=",
                    ('<', false) => "<",
                    ('>', true) => ">=",
                    ('>', false) => ">",
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('=', false) => {
                        return Err(PyriteError::parse("single `=` is not an operator", text))
                    }
                    ('!', false) => {
                        return Err(PyriteError::parse("stray `!`", text))
                    }
                    _ => unreachable!(),
                };
                if two {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::In,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(PyriteError::parse(
                    format!("unexpected character `{other}`"),
                    text,
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            Some(Token::Literal(value)) => format!("\"{value}\""),
            Some(Token::Op(op)) => op.to_string(),
            Some(Token::LParen) => "(".to_string(),
            Some(Token::RParen) => ")".to_string(),
            Some(Token::And) => "and".to_string(),
            Some(Token::Or) => "or".to_string(),
            Some(Token::In) => "in".to_string(),
            Some(Token::Not) => "not".to_string(),
            None => "end of input".to_string(),
        }
    }

    fn parse_or(&mut self) -> PyriteResult<Marker> {
        let mut parts = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            Marker::Or(parts)
        })
    }

    fn parse_and(&mut self) -> PyriteResult<Marker> {
        let mut parts = vec![self.parse_atom()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.next();
                    parts.push(self.parse_atom()?);
                }
                // Two expressions joined by anything that is not a boolean
                // operator (or the closing of an enclosing group) is a
                // malformed marker.
                Some(Token::Ident(word)) => {
                    return Err(PyriteError::parse(
                        format!("unknown boolean operator `{word}`"),
                        self.input,
                    ));
                }
                _ => break,
            }
        }
        Ok(if parts.len() == 1 {
            parts.pop().unwrap()
        } else {
            Marker::And(parts)
        })
    }

    fn parse_atom(&mut self) -> PyriteResult<Marker> {
        match self.peek() {
            Some(Token::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(PyriteError::parse("unbalanced parenthesis", self.input)),
                }
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> PyriteResult<Marker> {
        let left = self.next();
        let op = self.parse_operator()?;
        let right = self.next();

        match (left, right) {
            (Some(Token::Ident(var)), Some(Token::Literal(value))) => Ok(Marker::Expr {
                var,
                op,
                value,
            }),
            (Some(Token::Literal(value)), Some(Token::Ident(var))) => {
                // Flip `"literal" op var` into variable-first form.
                let op = match op {
                    MarkerOp::In => MarkerOp::Contains,
                    MarkerOp::NotIn => MarkerOp::NotContains,
                    MarkerOp::Lt => MarkerOp::Gt,
                    MarkerOp::Le => MarkerOp::Ge,
                    MarkerOp::Gt => MarkerOp::Lt,
                    MarkerOp::Ge => MarkerOp::Le,
                    other => other,
                };
                Ok(Marker::Expr { var, op, value })
            }
            _ => Err(PyriteError::parse(
                "comparison needs a variable and a quoted literal",
                self.input,
            )),
        }
    }

    fn parse_operator(&mut self) -> PyriteResult<MarkerOp> {
        match self.next() {
            Some(Token::Op("==")) => Ok(MarkerOp::Eq),
            Some(Token::Op("!=")) => Ok(MarkerOp::Ne),
            Some(Token::Op("<")) => Ok(MarkerOp::Lt),
            Some(Token::Op("<=")) => Ok(MarkerOp::Le),
            Some(Token::Op(">")) => Ok(MarkerOp::Gt),
            Some(Token::Op(">=")) => Ok(MarkerOp::Ge),
            Some(Token::In) => Ok(MarkerOp::In),
            Some(Token::Not) => match self.next() {
                Some(Token::In) => Ok(MarkerOp::NotIn),
                _ => Err(PyriteError::parse("`not` must be followed by `in`", self.input)),
            },
            _ => Err(PyriteError::parse("expected comparison operator", self.input)),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Any => Ok(()),
            Marker::Expr { var, op, value } => match op {
                MarkerOp::Contains => write!(f, "\"{value}\" in {var}"),
                MarkerOp::NotContains => write!(f, "\"{value}\" not in {var}"),
                _ => write!(f, "{var} {} \"{value}\"", op_text(*op)),
            },
            Marker::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(child, Marker::Or(_)) {
                        write!(f, "({child})")?;
                    } else {
                        write!(f, "{child}")?;
                    }
                }
                Ok(())
            }
            Marker::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}

fn op_text(op: MarkerOp) -> &'static str {
    match op {
        MarkerOp::Eq => "==",
        MarkerOp::Ne => "!=",
        MarkerOp::Lt => "<",
        MarkerOp::Le => "<=",
        MarkerOp::Gt => ">",
        MarkerOp::Ge => ">=",
        MarkerOp::In => "in",
        MarkerOp::NotIn => "not in",
        MarkerOp::Contains | MarkerOp::NotContains => unreachable!("rendered flipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::version::Version;

    fn linux_env() -> MarkerEnvironment {
        Environment::linux_cpython((3, 7, 2)).marker_environment()
    }

    fn m(text: &str) -> Marker {
        Marker::parse(text).unwrap()
    }

    #[test]
    fn platform_equality() {
        let env = linux_env();
        assert!(m("sys_platform == \"linux\"").evaluate(&env));
        assert!(!m("sys_platform == \"win32\"").evaluate(&env));
        assert!(m("sys_platform != \"win32\"").evaluate(&env));
    }

    #[test]
    fn version_comparison_is_not_string_comparison() {
        let env = Environment::linux_cpython((3, 10, 1)).marker_environment();
        // String comparison would put "3.10" below "3.9".
        assert!(m("python_version >= '3.9'").evaluate(&env));
        assert!(m("python_version == '3.10'").evaluate(&env));
    }

    #[test]
    fn boolean_combinations() {
        let env = linux_env();
        assert!(m("sys_platform == 'linux' and python_version >= '3.6'").evaluate(&env));
        assert!(!m("sys_platform == 'linux' and python_version < '3.0'").evaluate(&env));
        assert!(m("sys_platform == 'win32' or python_version >= '3.6'").evaluate(&env));
    }

    #[test]
    fn parenthesized_grouping() {
        let env = linux_env();
        let marker =
            m("sys_platform == 'win32' and (python_version == '2.7' or python_version == '2.6')");
        assert!(!marker.evaluate(&env));

        let marker =
            m("sys_platform == 'linux' and (python_version == '3.7' or python_version == '2.7')");
        assert!(marker.evaluate(&env));
    }

    #[test]
    fn containment() {
        let env = linux_env();
        assert!(m("'linux' in sys_platform").evaluate(&env));
        assert!(m("sys_platform in 'linux-gnu linux'").evaluate(&env));
        assert!(m("'bsd' not in sys_platform").evaluate(&env));
    }

    #[test]
    fn unknown_variable_is_false_not_an_error() {
        let env = linux_env();
        assert!(!m("platform_release == '5.0'").evaluate(&env));
        assert!(!m("extra == 'socks'").evaluate(&env));
    }

    #[test]
    fn unknown_boolean_token_is_a_parse_error() {
        let err = Marker::parse("python_version == '3.6' xor sys_platform == 'linux'")
            .unwrap_err();
        assert!(err.to_string().contains("xor"));
        assert!(Marker::parse("os_name == 'posix' nand os_name == 'nt'").is_err());
    }

    #[test]
    fn malformed_markers_fail() {
        assert!(Marker::parse("python_version ==").is_err());
        assert!(Marker::parse("(python_version == '3.6'").is_err());
        assert!(Marker::parse("python_version = '3.6'").is_err());
        assert!(Marker::parse("== '3.6'").is_err());
    }

    #[test]
    fn intersection_law() {
        let env = linux_env();
        let markers = [
            m("sys_platform == 'linux'"),
            m("python_version >= '3.6'"),
            m("sys_platform == 'win32'"),
            Marker::Any,
        ];
        for a in &markers {
            for b in &markers {
                assert_eq!(
                    a.intersect(b).evaluate(&env),
                    a.evaluate(&env) && b.evaluate(&env),
                    "{a} ∩ {b}"
                );
                assert_eq!(
                    a.union(b).evaluate(&env),
                    a.evaluate(&env) || b.evaluate(&env),
                    "{a} ∪ {b}"
                );
            }
        }
    }

    #[test]
    fn any_is_identity_for_intersect() {
        let marker = m("sys_platform == 'linux'");
        assert_eq!(Marker::Any.intersect(&marker), marker);
        assert_eq!(marker.intersect(&Marker::Any), marker);
        assert!(Marker::Any.is_any());
    }

    #[test]
    fn display_canonical_form() {
        let marker = m(
            "sys_platform == \"win32\" and (python_version == \"2.7\" or python_version == \"2.6\") and extra == \"socks\"",
        );
        assert_eq!(
            marker.to_string(),
            "sys_platform == \"win32\" and (python_version == \"2.7\" or python_version == \"2.6\") and extra == \"socks\""
        );
    }

    #[test]
    fn python_constraint_extraction() {
        let marker = m("python_version == \"2.7\" or python_version == \"2.6\"");
        let constraint = marker.python_constraint();
        assert!(constraint.allows(&Version::parse("2.7.5").unwrap()));
        assert!(constraint.allows(&Version::parse("2.6.0").unwrap()));
        assert!(!constraint.allows(&Version::parse("3.0").unwrap()));

        let marker = m("sys_platform == 'win32'");
        assert!(marker.python_constraint().is_any());
    }

    #[test]
    fn gated_extras() {
        let marker = m("sys_platform == 'win32' and extra == 'socks'");
        assert_eq!(marker.gated_extras(), vec!["socks".to_string()]);
        assert!(m("sys_platform == 'win32'").gated_extras().is_empty());
    }
}
