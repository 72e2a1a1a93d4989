//! Expression language used by ad-hoc scripts.
//!
//! ```text
//! expr    := unary (binop unary)*
//! unary   := '-' unary | primary
//! primary := number | string | 'args' '[' index ']' | name '(' [expr (',' expr)*] ')' | '(' expr ')'
//! ```
//!
//! Comparisons bind loosest, then `+ -`, then `* /`. Comparisons evaluate to
//! 1 or 0.

use std::fmt;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Num(_) => "a number",
            Value::Str(_) => "a string",
            Value::List(_) => "a list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("args[{index}] is out of range ({available} argument(s))")]
    ArgIndex { index: usize, available: usize },
    #[error("'{op}' is not defined for {left} and {right}")]
    Operands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("{func}(): {msg}")]
    Call { func: &'static str, msg: String },
}

fn syntax(pos: usize, msg: impl Into<String>) -> ExprError {
    ExprError::Syntax {
        pos,
        msg: msg.into(),
    }
}

//
// Lexer
//

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
}

const SYMBOLS: [&str; 15] = [
    "<=", ">=", "==", "!=", "<", ">", "+", "-", "*", "/", "(", ")", "[", "]", ",",
];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if f(c)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn number(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        self.eat_while(|c| c.is_ascii_digit() || c == '.');
        let rest = &self.src[self.pos..];
        let mut exp = rest.chars();
        if matches!(exp.next(), Some('e' | 'E')) {
            let signed = rest[1..].starts_with(&['+', '-'][..]);
            let digits_at = if signed { 2 } else { 1 };
            if rest[digits_at..].starts_with(|c: char| c.is_ascii_digit()) {
                self.pos += digits_at;
                self.eat_while(|c| c.is_ascii_digit());
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| syntax(start, format!("invalid number '{text}'")))
    }

    fn string(&mut self, quote: char) -> Result<Tok, ExprError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(syntax(start, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(syntax(start, "unterminated string")),
                },
                Some(c) if c == quote => return Ok(Tok::Str(out)),
                Some(c) => out.push(c),
            }
        }
    }

    fn tokens(mut self) -> Result<Vec<(usize, Tok)>, ExprError> {
        let mut out = Vec::new();
        loop {
            self.eat_while(char::is_whitespace);
            let start = self.pos;
            let Some(c) = self.peek() else {
                return Ok(out);
            };
            let tok = if c.is_ascii_digit() || c == '.' {
                self.number()?
            } else if c.is_alphabetic() || c == '_' {
                Tok::Ident(self.eat_while(|c| c.is_alphanumeric() || c == '_').to_string())
            } else if c == '\'' || c == '"' {
                self.string(c)?
            } else {
                let rest = &self.src[self.pos..];
                let sym = SYMBOLS
                    .iter()
                    .find(|s| rest.starts_with(**s))
                    .ok_or_else(|| syntax(start, format!("unexpected character '{c}'")))?;
                self.pos += sym.len();
                Tok::Sym(*sym)
            };
            out.push((start, tok));
        }
    }
}

//
// Syntax tree
//

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn from_symbol(sym: &str) -> Option<Self> {
        Some(match sym {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }

    fn binding(self) -> u8 {
        match self {
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => 1,
            BinOp::Add | BinOp::Sub => 2,
            BinOp::Mul | BinOp::Div => 3,
        }
    }
}

const UNARY_BINDING: u8 = 4;

/// Bound on parser recursion and on the height of the parsed tree. Folding a
/// binary operator into the left operand counts as one level.
const MAX_DEPTH: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sum,
    Min,
    Max,
    Avg,
    Count,
    Len,
    Abs,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Func::Sum,
            "min" => Func::Min,
            "max" => Func::Max,
            "avg" => Func::Avg,
            "count" => Func::Count,
            "len" => Func::Len,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Sum => "sum",
            Func::Min => "min",
            Func::Max => "max",
            Func::Avg => "avg",
            Func::Count => "count",
            Func::Len => "len",
            Func::Abs => "abs",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Arg(usize),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

struct Parser {
    toks: Vec<(usize, Tok)>,
    at: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.at).map(|(_, t)| t)
    }

    fn pos(&self) -> usize {
        self.toks.get(self.at).map_or(self.end, |(p, _)| *p)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.at).map(|(_, t)| t.clone());
        self.at += 1;
        tok
    }

    fn expect(&mut self, sym: &'static str) -> Result<(), ExprError> {
        let pos = self.pos();
        match self.next() {
            Some(Tok::Sym(s)) if s == sym => Ok(()),
            _ => Err(syntax(pos, format!("expected '{sym}'"))),
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(self.pos(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self, min_binding: u8) -> Result<Expr, ExprError> {
        let entry = self.depth;
        let parsed = self.fold(min_binding);
        self.depth = entry;
        parsed
    }

    fn fold(&mut self, min_binding: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.prefix()?;
        while let Some(op) = match self.peek() {
            Some(Tok::Sym(s)) => BinOp::from_symbol(s),
            _ => None,
        } {
            if op.binding() < min_binding {
                break;
            }
            self.next();
            self.descend()?;
            let rhs = self.expr(op.binding() + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        let pos = self.pos();
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Sym("-")) => {
                self.descend()?;
                Ok(Expr::Neg(Box::new(self.expr(UNARY_BINDING)?)))
            }
            Some(Tok::Sym("(")) => {
                self.descend()?;
                let inner = self.expr(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) if name == "args" => {
                self.expect("[")?;
                let index_pos = self.pos();
                let index = match self.next() {
                    Some(Tok::Num(n)) if n >= 0.0 && n.fract() == 0.0 => n as usize,
                    _ => return Err(syntax(index_pos, "expected an argument index")),
                };
                self.expect("]")?;
                Ok(Expr::Arg(index))
            }
            Some(Tok::Ident(name)) => {
                let func = Func::from_name(&name).ok_or(ExprError::UnknownFunction(name))?;
                self.expect("(")?;
                self.descend()?;
                let mut args = Vec::new();
                if self.peek() != Some(&Tok::Sym(")")) {
                    loop {
                        args.push(self.expr(0)?);
                        if self.peek() == Some(&Tok::Sym(",")) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(")")?;
                Ok(Expr::Call(func, args))
            }
            Some(_) => Err(syntax(pos, "unexpected token")),
            None => Err(syntax(pos, "unexpected end of script")),
        }
    }
}

impl Expr {
    pub fn parse(src: &str) -> Result<Expr, ExprError> {
        let toks = Lexer { src, pos: 0 }.tokens()?;
        let mut parser = Parser {
            toks,
            at: 0,
            end: src.len(),
            depth: 0,
        };
        let expr = parser.expr(0)?;
        if parser.peek().is_some() {
            return Err(syntax(parser.pos(), "unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Highest `args[i]` index the expression refers to.
    pub fn max_arg(&self) -> Option<usize> {
        match self {
            Expr::Num(_) | Expr::Str(_) => None,
            Expr::Arg(i) => Some(*i),
            Expr::Neg(e) => e.max_arg(),
            Expr::Binary(_, l, r) => l.max_arg().max(r.max_arg()),
            Expr::Call(_, args) => args.iter().filter_map(Expr::max_arg).max(),
        }
    }

    pub fn eval(&self, args: &[Value]) -> Result<Value, ExprError> {
        match self {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Arg(i) => args.get(*i).cloned().ok_or(ExprError::ArgIndex {
                index: *i,
                available: args.len(),
            }),
            Expr::Neg(e) => match e.eval(args)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                other => Err(ExprError::Operands {
                    op: "-",
                    left: "nothing",
                    right: other.kind(),
                }),
            },
            Expr::Binary(op, l, r) => binary(*op, l.eval(args)?, r.eval(args)?),
            Expr::Call(func, call_args) => {
                let values = call_args
                    .iter()
                    .map(|a| a.eval(args))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, values)
            }
        }
    }
}

//
// Evaluation
//

fn truth(b: bool) -> Value {
    Value::Num(if b { 1.0 } else { 0.0 })
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, ExprError> {
    match (op, &left, &right) {
        (_, Value::Num(a), Value::Num(b)) => {
            let (a, b) = (*a, *b);
            Ok(match op {
                BinOp::Add => Value::Num(a + b),
                BinOp::Sub => Value::Num(a - b),
                BinOp::Mul => Value::Num(a * b),
                BinOp::Div => Value::Num(a / b),
                BinOp::Lt => truth(a < b),
                BinOp::Le => truth(a <= b),
                BinOp::Gt => truth(a > b),
                BinOp::Ge => truth(a >= b),
                BinOp::Eq => truth(a == b),
                BinOp::Ne => truth(a != b),
            })
        }
        (BinOp::Add, Value::Str(_), Value::Str(_) | Value::Num(_))
        | (BinOp::Add, Value::Num(_), Value::Str(_)) => Ok(Value::Str(format!("{left}{right}"))),
        (_, Value::Str(a), Value::Str(b)) => match op {
            BinOp::Lt => Ok(truth(a < b)),
            BinOp::Le => Ok(truth(a <= b)),
            BinOp::Gt => Ok(truth(a > b)),
            BinOp::Ge => Ok(truth(a >= b)),
            BinOp::Eq => Ok(truth(a == b)),
            BinOp::Ne => Ok(truth(a != b)),
            _ => Err(operands(op, &left, &right)),
        },
        _ => Err(operands(op, &left, &right)),
    }
}

fn operands(op: BinOp, left: &Value, right: &Value) -> ExprError {
    ExprError::Operands {
        op: op.symbol(),
        left: left.kind(),
        right: right.kind(),
    }
}

/// Flatten numbers and lists of numbers into one sequence.
fn numbers(func: Func, values: Vec<Value>) -> Result<Vec<f64>, ExprError> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Num(n) => out.push(n),
            Value::List(items) => {
                for item in items {
                    match item {
                        Value::Num(n) => out.push(n),
                        other => return Err(not_numeric(func, &other)),
                    }
                }
            }
            other => return Err(not_numeric(func, &other)),
        }
    }
    Ok(out)
}

fn not_numeric(func: Func, value: &Value) -> ExprError {
    ExprError::Call {
        func: func.name(),
        msg: format!("expected numbers, got {}", value.kind()),
    }
}

fn single(func: Func, mut values: Vec<Value>) -> Result<Value, ExprError> {
    if values.len() != 1 {
        return Err(ExprError::Call {
            func: func.name(),
            msg: format!("takes exactly one argument, got {}", values.len()),
        });
    }
    Ok(values.remove(0))
}

fn call(func: Func, values: Vec<Value>) -> Result<Value, ExprError> {
    match func {
        Func::Sum => Ok(Value::Num(numbers(func, values)?.iter().sum())),
        Func::Min => Ok(Value::Num(
            numbers(func, values)?.into_iter().fold(f64::INFINITY, f64::min),
        )),
        Func::Max => Ok(Value::Num(
            numbers(func, values)?.into_iter().fold(f64::NEG_INFINITY, f64::max),
        )),
        Func::Avg => {
            let nums = numbers(func, values)?;
            Ok(Value::Num(nums.iter().sum::<f64>() / nums.len() as f64))
        }
        Func::Count => Ok(Value::Num(
            values
                .iter()
                .map(|v| match v {
                    Value::List(items) => items.len(),
                    _ => 1,
                })
                .sum::<usize>() as f64,
        )),
        Func::Len => match single(func, values)? {
            Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
            Value::List(items) => Ok(Value::Num(items.len() as f64)),
            other => Err(ExprError::Call {
                func: func.name(),
                msg: format!("expected a string or a list, got {}", other.kind()),
            }),
        },
        Func::Abs => match single(func, values)? {
            Value::Num(n) => Ok(Value::Num(n.abs())),
            other => Err(not_numeric(func, &other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, args: &[Value]) -> Result<Value, ExprError> {
        Expr::parse(src)?.eval(args)
    }

    fn num(src: &str, args: &[Value]) -> f64 {
        match eval(src, args).unwrap() {
            Value::Num(n) => n,
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn precedence_and_unary_minus() {
        assert_eq!(num("1 + 2 * 3", &[]), 7.0);
        assert_eq!(num("(1 + 2) * 3", &[]), 9.0);
        assert_eq!(num("10 - 4 - 3", &[]), 3.0);
        assert_eq!(num("-2 * 3", &[]), -6.0);
        assert_eq!(num("2 - -2", &[]), 4.0);
        assert_eq!(num("1.5e2 / 3", &[]), 50.0);
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(num("1 + 1 == 2", &[]), 1.0);
        assert_eq!(num("3 < 2", &[]), 0.0);
        assert_eq!(num("'abc' < 'abd'", &[]), 1.0);
        assert_eq!(num("\"x\" != 'x'", &[]), 0.0);
    }

    #[test]
    fn arguments_are_indexed() {
        let args = [Value::Num(4.0), Value::Num(6.0)];
        assert_eq!(num("args[0] * args[1]", &args), 24.0);
        assert_eq!(
            eval("args[2]", &args),
            Err(ExprError::ArgIndex {
                index: 2,
                available: 2
            })
        );
    }

    #[test]
    fn string_concatenation() {
        let args = [Value::Str("Q".into()), Value::Num(3.0)];
        assert_eq!(
            eval("args[0] + '-' + args[1]", &args).unwrap(),
            Value::Str("Q-3".into())
        );
        assert!(matches!(
            eval("'a' * 2", &[]),
            Err(ExprError::Operands { op: "*", .. })
        ));
    }

    #[test]
    fn builtin_functions_over_lists() {
        let col = Value::List(vec![Value::Num(3.0), Value::Num(-1.0), Value::Num(4.0)]);
        let args = [col];
        assert_eq!(num("sum(args[0])", &args), 6.0);
        assert_eq!(num("min(args[0])", &args), -1.0);
        assert_eq!(num("max(args[0], 10)", &args), 10.0);
        assert_eq!(num("avg(args[0])", &args), 2.0);
        assert_eq!(num("count(args[0])", &args), 3.0);
        assert_eq!(num("len(args[0])", &args), 3.0);
        assert_eq!(num("abs(min(args[0]))", &args), 1.0);
        assert_eq!(num("sum()", &[]), 0.0);
        assert_eq!(num("len('héllo')", &[]), 5.0);
    }

    #[test]
    fn sum_rejects_strings() {
        let args = [Value::List(vec![Value::Num(1.0), Value::Str("x".into())])];
        assert!(matches!(
            eval("sum(args[0])", &args),
            Err(ExprError::Call { func: "sum", .. })
        ));
    }

    #[test]
    fn syntax_errors_carry_offsets() {
        assert!(matches!(
            Expr::parse("1 +"),
            Err(ExprError::Syntax { pos: 3, .. })
        ));
        assert!(matches!(
            Expr::parse("1 2"),
            Err(ExprError::Syntax { pos: 2, .. })
        ));
        assert!(matches!(
            Expr::parse("'open"),
            Err(ExprError::Syntax { pos: 0, .. })
        ));
        assert!(matches!(
            Expr::parse("1 ^ 2"),
            Err(ExprError::Syntax { pos: 2, .. })
        ));
        assert_eq!(
            Expr::parse("median(args[0])"),
            Err(ExprError::UnknownFunction("median".into()))
        );
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let too_deep = |script: String| {
            matches!(
                Expr::parse(&script),
                Err(ExprError::Syntax { ref msg, .. }) if msg == "expression nested too deeply"
            )
        };
        assert!(too_deep("-".repeat(10_000) + "1"));
        assert!(too_deep("(".repeat(10_000) + "1" + &")".repeat(10_000)));
        assert!(too_deep("abs(".repeat(10_000) + "1" + &")".repeat(10_000)));
        assert!(too_deep(vec!["1"; 10_000].join(" + ")));

        assert_eq!(num(&("-".repeat(100) + "2"), &[]), 2.0);
        assert_eq!(num(&("(".repeat(100) + "2" + &")".repeat(100)), &[]), 2.0);
        assert_eq!(num(&vec!["1"; 100].join(" + "), &[]), 100.0);
    }

    #[test]
    fn max_arg_walks_the_tree() {
        let expr = Expr::parse("sum(args[0]) + -args[3] * 2").unwrap();
        assert_eq!(expr.max_arg(), Some(3));
        assert_eq!(Expr::parse("1 + 2").unwrap().max_arg(), None);
    }
}
