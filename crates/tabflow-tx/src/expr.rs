//! Expression oracle consumed by `filter`, `validate` and `derive`.
//!
//! A small, pure expression language over batch rows. Column references are
//! written `col('name')`, `col("name")`, `col(name)` or as a bare identifier.
//! Evaluation never raises: a missing column or a type mismatch yields NULL,
//! and NULL evaluates to false in boolean position.
//!
//! Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* / %`,
//! unary `- !`, primaries. `/` always yields FLOAT64; the other arithmetic
//! operators stay INT64 on INT64 operands; `+` concatenates two strings.

use tabflow_core::{Batch, FlowError, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone)]
enum Node {
    Lit(Value),
    Col(String),
    Unary(char, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
}

/// A parsed expression, reusable across rows and batches.
#[derive(Debug, Clone)]
pub struct Expr {
    text: String,
    root: Node,
}

impl Expr {
    /// Parse expression text; rejection is a compile-time failure.
    pub fn parse(text: &str) -> Result<Expr, FlowError> {
        let tokens = lex(text)?;
        let mut p = Parser { tokens, pos: 0 };
        let root = p.parse_or()?;
        if p.pos != p.tokens.len() {
            return Err(FlowError::Expr(format!(
                "unexpected trailing input in `{text}`"
            )));
        }
        Ok(Expr {
            text: text.to_string(),
            root,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluate to a boolean; NULL and non-truthy values are false.
    pub fn eval_bool(&self, batch: &Batch, row: usize) -> bool {
        truthy(&eval(&self.root, batch, row)).unwrap_or(false)
    }

    /// Evaluate to a value; failures surface as NULL, never as an error.
    pub fn eval_value(&self, batch: &Batch, row: usize) -> Value {
        eval(&self.root, batch, row)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(&'static str),
}

fn lex(text: &str) -> Result<Vec<Token>, FlowError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                let mut is_float = false;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || (matches!(chars[i], '+' | '-')
                            && i > start
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    if !chars[i].is_ascii_digit() {
                        is_float = true;
                    }
                    i += 1;
                }
                let lit: String = chars[start..i].iter().collect();
                if is_float {
                    let v = lit
                        .parse()
                        .map_err(|_| FlowError::Expr(format!("bad number `{lit}`")))?;
                    tokens.push(Token::Float(v));
                } else {
                    let v = lit
                        .parse()
                        .map_err(|_| FlowError::Expr(format!("bad number `{lit}`")))?;
                    tokens.push(Token::Int(v));
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(FlowError::Expr(format!("unterminated string in `{text}`")));
                    };
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    if ch == '\\' {
                        let Some(&esc) = chars.get(i) else {
                            return Err(FlowError::Expr("dangling escape".into()));
                        };
                        i += 1;
                        s.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    } else {
                        s.push(ch);
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '(' | ')' | ',' | '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Sym(match c {
                    '(' => "(",
                    ')' => ")",
                    ',' => ",",
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "%",
                }));
                i += 1;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let sym = match two.as_str() {
                    "==" => Some("=="),
                    "!=" => Some("!="),
                    "<=" => Some("<="),
                    ">=" => Some(">="),
                    "&&" => Some("&&"),
                    "||" => Some("||"),
                    _ => None,
                };
                if let Some(sym) = sym {
                    tokens.push(Token::Sym(sym));
                    i += 2;
                } else {
                    match c {
                        '<' => tokens.push(Token::Sym("<")),
                        '>' => tokens.push(Token::Sym(">")),
                        '!' => tokens.push(Token::Sym("!")),
                        '=' => tokens.push(Token::Sym("==")), // tolerate single =
                        other => {
                            return Err(FlowError::Expr(format!("stray `{other}` in `{text}`")))
                        }
                    }
                    i += 1;
                }
            }
            other => return Err(FlowError::Expr(format!("stray `{other}` in `{text}`"))),
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

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &'static str) -> Result<(), FlowError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(FlowError::Expr(format!("expected `{sym}`")))
        }
    }

    fn parse_or(&mut self) -> Result<Node, FlowError> {
        let mut left = self.parse_and()?;
        while self.eat_sym("||") {
            let right = self.parse_and()?;
            left = Node::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, FlowError> {
        let mut left = self.parse_cmp()?;
        while self.eat_sym("&&") {
            let right = self.parse_cmp()?;
            left = Node::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Node, FlowError> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("==")) => BinOp::Eq,
                Some(Token::Sym("!=")) => BinOp::Ne,
                Some(Token::Sym("<")) => BinOp::Lt,
                Some(Token::Sym("<=")) => BinOp::Le,
                Some(Token::Sym(">")) => BinOp::Gt,
                Some(Token::Sym(">=")) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_add()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Node, FlowError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("+")) => BinOp::Add,
                Some(Token::Sym("-")) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Node, FlowError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("*")) => BinOp::Mul,
                Some(Token::Sym("/")) => BinOp::Div,
                Some(Token::Sym("%")) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, FlowError> {
        if self.eat_sym("-") {
            return Ok(Node::Unary('-', Box::new(self.parse_unary()?)));
        }
        if self.eat_sym("!") {
            return Ok(Node::Unary('!', Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, FlowError> {
        match self.peek().cloned() {
            Some(Token::Int(v)) => {
                self.pos += 1;
                Ok(Node::Lit(Value::Int(v)))
            }
            Some(Token::Float(v)) => {
                self.pos += 1;
                Ok(Node::Lit(Value::Float(v)))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Node::Lit(Value::Str(s)))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => return Ok(Node::Lit(Value::Bool(true))),
                    "false" => return Ok(Node::Lit(Value::Bool(false))),
                    "null" => return Ok(Node::Lit(Value::Null)),
                    _ => {}
                }
                if self.eat_sym("(") {
                    if name == "col" {
                        let col = match self.peek().cloned() {
                            Some(Token::Str(s)) => s,
                            Some(Token::Ident(id)) => id,
                            _ => return Err(FlowError::Expr("col() needs a column name".into())),
                        };
                        self.pos += 1;
                        self.expect_sym(")")?;
                        return Ok(Node::Col(col));
                    }
                    let mut call_args = Vec::new();
                    if !self.eat_sym(")") {
                        loop {
                            call_args.push(self.parse_or()?);
                            if self.eat_sym(")") {
                                break;
                            }
                            self.expect_sym(",")?;
                        }
                    }
                    return Ok(Node::Call(name, call_args));
                }
                // bare identifier doubles as a column reference
                Ok(Node::Col(name))
            }
            Some(Token::Sym("(")) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            other => Err(FlowError::Expr(format!("unexpected token {other:?}"))),
        }
    }
}

fn truthy(v: &Value) -> Option<bool> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::Str(s) => Some(!s.is_empty()),
        Value::Date(_) | Value::Timestamp(_) => Some(true),
    }
}

fn eval(node: &Node, batch: &Batch, row: usize) -> Value {
    match node {
        Node::Lit(v) => v.clone(),
        Node::Col(name) => match batch.col_index(name) {
            Some(c) => batch.value(row, c),
            None => Value::Null,
        },
        Node::Unary(op, inner) => {
            let v = eval(inner, batch, row);
            match (op, v) {
                (_, Value::Null) => Value::Null,
                ('-', Value::Int(i)) => Value::Int(-i),
                ('-', Value::Float(f)) => Value::Float(-f),
                ('!', v) => truthy(&v).map(|b| Value::Bool(!b)).unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        Node::Binary(op, l, r) => eval_binary(*op, l, r, batch, row),
        Node::Call(name, call_args) => {
            let vals: Vec<Value> = call_args.iter().map(|a| eval(a, batch, row)).collect();
            eval_call(name, &vals)
        }
    }
}

fn eval_binary(op: BinOp, l: &Node, r: &Node, batch: &Batch, row: usize) -> Value {
    if matches!(op, BinOp::And | BinOp::Or) {
        let lv = truthy(&eval(l, batch, row));
        // short circuit
        match (op, lv) {
            (BinOp::And, Some(false)) => return Value::Bool(false),
            (BinOp::Or, Some(true)) => return Value::Bool(true),
            _ => {}
        }
        let rv = truthy(&eval(r, batch, row));
        return match (op, lv, rv) {
            (BinOp::And, Some(a), Some(b)) => Value::Bool(a && b),
            (BinOp::Or, Some(a), Some(b)) => Value::Bool(a || b),
            (BinOp::And, _, Some(false)) | (BinOp::And, Some(false), _) => Value::Bool(false),
            (BinOp::Or, _, Some(true)) | (BinOp::Or, Some(true), _) => Value::Bool(true),
            _ => Value::Null,
        };
    }

    let lv = eval(l, batch, row);
    let rv = eval(r, batch, row);
    if lv.is_null() || rv.is_null() {
        return Value::Null;
    }

    match op {
        BinOp::Add => match (&lv, &rv) {
            (Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            _ => num_op(&lv, &rv, |a, b| a + b),
        },
        BinOp::Sub => match (&lv, &rv) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
            _ => num_op(&lv, &rv, |a, b| a - b),
        },
        BinOp::Mul => match (&lv, &rv) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
            _ => num_op(&lv, &rv, |a, b| a * b),
        },
        BinOp::Div => match (lv.as_f64(), rv.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Value::Null,
            _ => num_op(&lv, &rv, |a, b| a / b),
        },
        BinOp::Mod => match (&lv, &rv) {
            (Value::Int(a), Value::Int(b)) if *b != 0 => Value::Int(a.wrapping_rem(*b)),
            (Value::Int(_), Value::Int(_)) => Value::Null,
            _ => num_op(&lv, &rv, |a, b| a % b),
        },
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            compare(op, &lv, &rv)
        }
        BinOp::And | BinOp::Or => Value::Null,
    }
}

fn num_op(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Value::Float(f(a, b)),
        _ => Value::Null,
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;
    let ord = match (l, r) {
        (Value::Str(a), Value::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => match a.partial_cmp(&b) {
                Some(o) => o,
                None => return Value::Null,
            },
            _ => return Value::Null,
        },
    };
    let b = match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => return Value::Null,
    };
    Value::Bool(b)
}

fn eval_call(name: &str, call_args: &[Value]) -> Value {
    match (name, call_args) {
        ("abs", [Value::Int(i)]) => Value::Int(i.wrapping_abs()),
        ("abs", [Value::Float(f)]) => Value::Float(f.abs()),
        ("len", [Value::Str(s)]) => Value::Int(s.len() as i64),
        ("upper", [Value::Str(s)]) => Value::Str(s.to_uppercase()),
        ("lower", [Value::Str(s)]) => Value::Str(s.to_lowercase()),
        ("contains", [Value::Str(s), Value::Str(sub)]) => Value::Bool(s.contains(sub.as_str())),
        _ => Value::Null,
    }
}
