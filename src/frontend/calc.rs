// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Built-in arithmetic frontend served by the binary and used throughout the tests.
//!
//! Grammar:
//! ```text
//! program := stmt (';' stmt)*
//! stmt    := expr
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := INT | IDENT | '(' expr ')' | '-' factor
//! ```
//! Variables are bound through build arguments of the form `name=value`.

use std::fmt;

use crate::codec::{ArgumentKind, ParameterValue};
use crate::model::{HostList, HostValue, NodeId, Span, Tree, TreeBuilder};

use super::{Frontend, InvocationContext, InvocationError, ParseError, PropertyInfo};

const VALUE_KEY: &str = "value";

/// Deepest expression the parser accepts. Parsing, lowering and evaluation all recurse once
/// per level, so this bounds their stack use.
const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    Int(i64),
    Ident,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Semi,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    tok: Tok,
    span: Span,
}

fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let start = pos;
        let byte = bytes[pos];
        let single = match byte {
            b'+' => Some(Tok::Plus),
            b'-' => Some(Tok::Minus),
            b'*' => Some(Tok::Star),
            b'/' => Some(Tok::Slash),
            b'(' => Some(Tok::LParen),
            b')' => Some(Tok::RParen),
            b';' => Some(Tok::Semi),
            _ => None,
        };
        if let Some(tok) = single {
            pos += 1;
            tokens.push(Token { tok, span: span(start, pos) });
            continue;
        }
        if byte.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if byte.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let value = source[start..pos].parse::<i64>().map_err(|_| {
                ParseError::at("integer literal out of range", span(start, pos))
            })?;
            tokens.push(Token { tok: Tok::Int(value), span: span(start, pos) });
            continue;
        }
        if byte.is_ascii_alphabetic() || byte == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push(Token { tok: Tok::Ident, span: span(start, pos) });
            continue;
        }
        let width = source[start..].chars().next().map_or(1, char::len_utf8);
        return Err(ParseError::at(
            format!("unexpected character {:?}", &source[start..start + width]),
            span(start, start + width),
        ));
    }
    Ok(tokens)
}

fn span(start: usize, end: usize) -> Span {
    Span::new(start as u32, end as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn type_name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
        }
    }
}

#[derive(Debug)]
enum ExprKind {
    Num,
    Var,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Parsed expression. `height` counts the tree levels below and including this node.
#[derive(Debug)]
struct Expr {
    kind: ExprKind,
    span: Span,
    height: usize,
}

impl Expr {
    fn leaf(kind: ExprKind, span: Span) -> Self {
        Self { kind, span, height: 1 }
    }

    fn neg(operand: Expr, span: Span) -> Self {
        let height = operand.height + 1;
        Self { kind: ExprKind::Neg(Box::new(operand)), span, height }
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        let span = lhs.span.cover(rhs.span);
        let height = lhs.height.max(rhs.height) + 1;
        Self { kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), span, height }
    }

    fn type_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Num => "Num",
            ExprKind::Var => "Var",
            ExprKind::Neg(_) => "Neg",
            ExprKind::Binary(op, _, _) => op.type_name(),
        }
    }
}

fn too_deep(span: Span) -> ParseError {
    ParseError::at(format!("expression nested too deeply (limit {MAX_NESTING})"), span)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses and unary minus signs around the current position.
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Self { source, tokens, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eof_span(&self) -> Span {
        let end = self.source.len() as u32;
        Span::new(end, end)
    }

    /// Runs `parse` one nesting level deeper, failing once the limit is reached.
    fn nested(
        &mut self,
        at: Span,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(too_deep(at));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn statements(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut statements = Vec::new();
        loop {
            while self.peek().is_some_and(|t| t.tok == Tok::Semi) {
                self.pos += 1;
            }
            if self.peek().is_none() {
                return Ok(statements);
            }
            statements.push(self.expr()?);
            match self.peek() {
                None => return Ok(statements),
                Some(Token { tok: Tok::Semi, .. }) => {}
                Some(token) => {
                    return Err(ParseError::at("expected ';' between statements", token.span));
                }
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        while let Some((op, at)) = self.peek().and_then(|t| match t.tok {
            Tok::Plus => Some((BinOp::Add, t.span)),
            Tok::Minus => Some((BinOp::Sub, t.span)),
            _ => None,
        }) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = self.combine(op, lhs, rhs, at)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.factor()?;
        while let Some((op, at)) = self.peek().and_then(|t| match t.tok {
            Tok::Star => Some((BinOp::Mul, t.span)),
            Tok::Slash => Some((BinOp::Div, t.span)),
            _ => None,
        }) {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = self.combine(op, lhs, rhs, at)?;
        }
        Ok(lhs)
    }

    /// Left-associative chains grow the tree without recursing here, so their height is
    /// checked separately.
    fn combine(&self, op: BinOp, lhs: Expr, rhs: Expr, at: Span) -> Result<Expr, ParseError> {
        let expr = Expr::binary(op, lhs, rhs);
        if self.depth + expr.height > MAX_NESTING {
            return Err(too_deep(at));
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.bump() else {
            return Err(ParseError::at("unexpected end of input", self.eof_span()));
        };
        match token.tok {
            Tok::Int(_) => Ok(Expr::leaf(ExprKind::Num, token.span)),
            Tok::Ident => Ok(Expr::leaf(ExprKind::Var, token.span)),
            Tok::Minus => {
                let operand = self.nested(token.span, Self::factor)?;
                let span = token.span.cover(operand.span);
                Ok(Expr::neg(operand, span))
            }
            Tok::LParen => {
                let mut inner = self.nested(token.span, Self::expr)?;
                match self.bump() {
                    Some(close @ Token { tok: Tok::RParen, .. }) => {
                        // Leaf spans stay on the token; their text is the literal or name.
                        if !matches!(inner.kind, ExprKind::Num | ExprKind::Var) {
                            inner.span = inner.span.cover(token.span.cover(close.span));
                        }
                        Ok(inner)
                    }
                    Some(other) => Err(ParseError::at("expected ')'", other.span)),
                    None => Err(ParseError::at("unclosed '('", token.span)),
                }
            }
            _ => Err(ParseError::at("expected a number, a name or '('", token.span)),
        }
    }
}

fn lower(builder: &mut TreeBuilder, source: &str, parent: NodeId, expr: &Expr) {
    let node = builder.add_child(parent, expr.type_name());
    builder.set_span(node, expr.span);
    match &expr.kind {
        ExprKind::Num | ExprKind::Var => {
            let text = &source[expr.span.start as usize..expr.span.end as usize];
            builder.set_text(node, text);
        }
        ExprKind::Neg(operand) => {
            builder.enable_memo(node);
            lower(builder, source, node, operand);
        }
        ExprKind::Binary(_, lhs, rhs) => {
            builder.enable_memo(node);
            lower(builder, source, node, lhs);
            lower(builder, source, node, rhs);
        }
    }
}

fn parse_binding(arg: &str) -> Result<(&str, i64), ParseError> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| ParseError::new(format!("build argument {arg:?} is not name=value")))?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseError::new(format!("invalid variable name in build argument {arg:?}")));
    }
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|err| ParseError::new(format!("build argument {arg:?}: {err}")))?;
    Ok((name, value))
}

struct PropertySpec {
    name: &'static str,
    params: &'static [ArgumentKind],
}

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec { name: "value", params: &[] },
    PropertySpec { name: "timesTwo", params: &[ArgumentKind::Int] },
    PropertySpec { name: "scaled", params: &[ArgumentKind::Int] },
    PropertySpec { name: "depth", params: &[] },
    PropertySpec { name: "children", params: &[] },
    PropertySpec { name: "parent", params: &[] },
    PropertySpec { name: "parentOf", params: &[ArgumentKind::Node] },
    PropertySpec { name: "text", params: &[] },
    PropertySpec { name: "dump", params: &[] },
    PropertySpec { name: "describe", params: &[ArgumentKind::Text] },
    PropertySpec { name: "isAncestorOf", params: &[ArgumentKind::Node] },
    PropertySpec { name: "explain", params: &[] },
    PropertySpec { name: "memoized", params: &[] },
    PropertySpec { name: "self", params: &[] },
    // Self-containing list; the dispatcher breaks the cycle after encoding it.
    PropertySpec { name: "cycle", params: &[] },
];

/// Textual summary returned by `describe`.
struct Description {
    prefix: String,
    label: String,
    span: Option<Span>,
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.prefix, self.label)?;
        if let Some(span) = self.span {
            write!(f, " @ {span}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CalcFrontend;

impl CalcFrontend {
    fn value(&self, tree: &mut Tree, node: NodeId) -> Result<i64, InvocationError> {
        self.value_at(tree, node, 0)
    }

    /// `depth` counts levels below the node `value` was asked for; trees deeper than the
    /// parser allows are refused instead of recursing.
    fn value_at(
        &self,
        tree: &mut Tree,
        node: NodeId,
        depth: usize,
    ) -> Result<i64, InvocationError> {
        let cached = tree
            .node(node)
            .and_then(|n| n.memo())
            .and_then(|memo| memo.get(VALUE_KEY))
            .and_then(HostValue::as_int);
        if let Some(value) = cached {
            return Ok(value);
        }
        if depth > MAX_NESTING + 2 {
            return Err(InvocationError::new("expression nested too deeply to evaluate"));
        }

        let Some(type_name) = tree.type_name(node).map(str::to_owned) else {
            return Err(InvocationError::new(format!("node {node} is not part of the tree")));
        };
        let children = tree.children(node).to_vec();
        let overflow = || InvocationError::new(format!("integer overflow in {type_name}"));

        let value = match (type_name.as_str(), children.as_slice()) {
            ("Num", _) => {
                let text = tree.node(node).and_then(|n| n.text()).unwrap_or_default();
                text.parse::<i64>()
                    .map_err(|err| InvocationError::new(format!("bad literal {text:?}: {err}")))?
            }
            ("Var", _) => {
                let name = tree.node(node).and_then(|n| n.text()).unwrap_or_default().to_owned();
                self.lookup(tree, &name)?
            }
            ("Neg", [operand]) => {
                self.value_at(tree, *operand, depth + 1)?.checked_neg().ok_or_else(overflow)?
            }
            ("Add" | "Sub" | "Mul", [lhs, rhs]) => {
                let lhs = self.value_at(tree, *lhs, depth + 1)?;
                let rhs = self.value_at(tree, *rhs, depth + 1)?;
                match type_name.as_str() {
                    "Add" => lhs.checked_add(rhs),
                    "Sub" => lhs.checked_sub(rhs),
                    _ => lhs.checked_mul(rhs),
                }
                .ok_or_else(overflow)?
            }
            ("Div", [lhs, rhs]) => {
                let lhs = self.value_at(tree, *lhs, depth + 1)?;
                let rhs = self.value_at(tree, *rhs, depth + 1)?;
                if rhs == 0 {
                    return Err(InvocationError::new("division by zero"));
                }
                lhs.checked_div(rhs).ok_or_else(overflow)?
            }
            ("Stmt", [expr]) => self.value_at(tree, *expr, depth + 1)?,
            ("Program", statements) => match statements.last() {
                Some(last) => {
                    for stmt in &statements[..statements.len() - 1] {
                        self.value_at(tree, *stmt, depth + 1)?;
                    }
                    self.value_at(tree, *last, depth + 1)?
                }
                None => 0,
            },
            (other, _) => {
                return Err(InvocationError::new(format!("`{other}` has no value")));
            }
        };

        if let Some(memo) = tree.memo_mut(node) {
            memo.insert(VALUE_KEY, HostValue::Int(value));
        }
        Ok(value)
    }

    fn lookup(&self, tree: &Tree, name: &str) -> Result<i64, InvocationError> {
        for arg in tree.build_args() {
            if let Ok((bound, value)) = parse_binding(arg) {
                if bound == name {
                    return Ok(value);
                }
            }
        }
        Err(InvocationError::new(format!("unbound variable `{name}`")))
    }

    fn dump(&self, tree: &Tree, node: NodeId) -> String {
        let mut out = String::new();
        let base = tree.depth(node);
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            if !out.is_empty() {
                out.push('\n');
            }
            for _ in base..tree.depth(next) {
                out.push_str("  ");
            }
            out.push_str(&tree.label(next));
            stack.extend(tree.children(next).iter().rev().copied());
        }
        out
    }
}

fn check_args(spec: &PropertySpec, args: &[ParameterValue]) -> Result<(), InvocationError> {
    if args.len() != spec.params.len() {
        return Err(InvocationError::new(format!(
            "`{}` expects {} argument(s), got {}",
            spec.name,
            spec.params.len(),
            args.len()
        )));
    }
    for (idx, (arg, expected)) in args.iter().zip(spec.params).enumerate() {
        if arg.kind() != *expected {
            return Err(InvocationError::new(format!(
                "`{}` argument {idx} must be {expected}, got {}",
                spec.name,
                arg.kind()
            )));
        }
    }
    Ok(())
}

fn unknown_property(property: &str, type_name: &str) -> InvocationError {
    let suggestion = PROPERTIES
        .iter()
        .map(|spec| (spec.name, rapidfuzz::fuzz::ratio(property.chars(), spec.name.chars())))
        .filter(|(_, ratio)| *ratio >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name);
    match suggestion {
        Some(name) => InvocationError::new(format!(
            "no property `{property}` on `{type_name}`; did you mean `{name}`?"
        )),
        None => InvocationError::new(format!("no property `{property}` on `{type_name}`")),
    }
}

impl Frontend for CalcFrontend {
    fn name(&self) -> &str {
        "calc"
    }

    fn parse(&self, source: &str, args: &[String]) -> Result<Tree, ParseError> {
        for arg in args {
            parse_binding(arg)?;
        }
        let tokens = lex(source)?;
        let statements = Parser::new(source, tokens).statements()?;

        let mut builder = TreeBuilder::new("Program");
        let root = builder.root();
        builder.set_span(root, span(0, source.len()));
        builder.enable_memo(root);
        for statement in &statements {
            let stmt = builder.add_child(root, "Stmt");
            builder.set_span(stmt, statement.span);
            builder.enable_memo(stmt);
            lower(&mut builder, source, stmt, statement);
        }
        Ok(builder.source(source).build_args(args.to_vec()).finish())
    }

    fn invoke(
        &self,
        tree: &mut Tree,
        node: NodeId,
        property: &str,
        args: &[ParameterValue],
        cx: &mut InvocationContext,
    ) -> Result<HostValue, InvocationError> {
        let Some(type_name) = tree.type_name(node).map(str::to_owned) else {
            return Err(InvocationError::new(format!("node {node} is not part of the tree")));
        };
        let Some(spec) = PROPERTIES.iter().find(|spec| spec.name == property) else {
            return Err(unknown_property(property, &type_name));
        };
        check_args(spec, args)?;

        match (property, args) {
            ("value", []) => self.value(tree, node).map(HostValue::Int),
            ("timesTwo", [ParameterValue::Int(n)]) => n
                .checked_mul(2)
                .map(HostValue::Int)
                .ok_or_else(|| InvocationError::new("integer overflow in timesTwo")),
            ("scaled", [ParameterValue::Int(k)]) => self
                .value(tree, node)?
                .checked_mul(*k)
                .map(HostValue::Int)
                .ok_or_else(|| InvocationError::new("integer overflow in scaled")),
            ("depth", []) => Ok(HostValue::Int(tree.depth(node) as i64)),
            ("children", []) => {
                Ok(HostValue::list(tree.children(node).iter().map(|c| HostValue::Node(*c))))
            }
            ("parent", []) => Ok(tree.parent(node).map_or(HostValue::Null, HostValue::Node)),
            ("parentOf", [ParameterValue::Node(other)]) => Ok(other
                .and_then(|other| tree.parent(other))
                .map_or(HostValue::Null, HostValue::Node)),
            ("text", []) => Ok(HostValue::text(tree.source_text(node).unwrap_or_default())),
            ("dump", []) => Ok(HostValue::Text(self.dump(tree, node))),
            ("describe", [ParameterValue::Text(prefix)]) => Ok(HostValue::custom(Description {
                prefix: prefix.clone(),
                label: tree.label(node),
                span: tree.span(node),
            })),
            ("isAncestorOf", [ParameterValue::Node(other)]) => {
                Ok(HostValue::Bool(other.is_some_and(|other| tree.is_ancestor(node, other))))
            }
            ("explain", []) => {
                let result = self.value(tree, node)?;
                let mut subtree = vec![node];
                subtree.extend(tree.descendants_bfs(node));
                for id in subtree {
                    let value = self.value(tree, id)?;
                    cx.emit(format!("{} = {value}", tree.label(id)));
                }
                Ok(HostValue::Int(result))
            }
            ("memoized", []) => Ok(HostValue::Bool(
                tree.node(node)
                    .and_then(|n| n.memo())
                    .is_some_and(|memo| memo.get(VALUE_KEY).is_some()),
            )),
            ("self", []) => Ok(HostValue::Node(node)),
            ("cycle", []) => {
                let list = HostList::new([HostValue::text(type_name)]);
                list.push(HostValue::List(list.clone()));
                Ok(HostValue::List(list))
            }
            _ => Err(InvocationError::new(format!("`{property}` cannot take these arguments"))),
        }
    }

    fn properties(&self, tree: &Tree, node: NodeId) -> Vec<PropertyInfo> {
        if !tree.contains(node) {
            return Vec::new();
        }
        PROPERTIES
            .iter()
            .map(|spec| PropertyInfo::new(spec.name, spec.params.iter().copied()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Tree {
        CalcFrontend.parse(source, &[]).expect("parse")
    }

    fn eval(tree: &mut Tree, node: NodeId, property: &str, args: &[ParameterValue]) -> HostValue {
        CalcFrontend
            .invoke(tree, node, property, args, &mut InvocationContext::default())
            .expect("invoke")
    }

    fn shape(tree: &Tree, node: NodeId) -> String {
        let children = tree.children(node);
        let name = tree.type_name(node).expect("type").to_owned();
        if children.is_empty() {
            return name;
        }
        let inner = children.iter().map(|c| shape(tree, *c)).collect::<Vec<_>>().join(" ");
        format!("({name} {inner})")
    }

    #[test]
    fn parses_with_precedence() {
        let tree = parse("1 + 2 * 3; -x");
        assert_eq!(
            shape(&tree, tree.root()),
            "(Program (Stmt (Add Num (Mul Num Num))) (Stmt (Neg Var)))"
        );
    }

    #[test]
    fn parentheses_and_spans() {
        let tree = parse("(1 + 2) * 3");
        let stmt = tree.child(tree.root(), 0).expect("stmt");
        let mul = tree.child(stmt, 0).expect("mul");
        assert_eq!(tree.type_name(mul), Some("Mul"));
        assert_eq!(tree.source_text(mul), Some("(1 + 2) * 3"));
        let add = tree.child(mul, 0).expect("add");
        assert_eq!(tree.source_text(add), Some("(1 + 2)"));
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        let tree = parse(" ;; ");
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn reports_syntax_errors_with_span() {
        let err = CalcFrontend.parse("1 + ", &[]).unwrap_err();
        assert_eq!(err.span, Some(Span::new(4, 4)));
        let err = CalcFrontend.parse("1 $ 2", &[]).unwrap_err();
        assert_eq!(err.span, Some(Span::new(2, 3)));
        let err = CalcFrontend.parse("1 2", &[]).unwrap_err();
        assert!(err.message.contains("';'"));
        assert!(CalcFrontend.parse("(1", &[]).is_err());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let deep_sources = [
            format!("{}1", "-".repeat(200_000)),
            format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000)),
            format!("1{}", " + 1".repeat(200_000)),
            format!("{}1", "2 * (".repeat(100_000)),
        ];
        for source in &deep_sources {
            let err = CalcFrontend.parse(source, &[]).unwrap_err();
            assert!(err.message.starts_with("expression nested too deeply"), "{}", err.message);
            assert!(err.span.is_some());
        }
    }

    #[test]
    fn nesting_up_to_the_limit_still_evaluates() {
        let source = format!("{}7", "-".repeat(MAX_NESTING));
        let mut tree = parse(&source);
        let root = tree.root();
        assert_eq!(eval(&mut tree, root, "value", &[]).as_int(), Some(7));

        let sum = format!("1{}", " + 1".repeat(MAX_NESTING - 1));
        let mut tree = parse(&sum);
        let root = tree.root();
        assert_eq!(eval(&mut tree, root, "value", &[]).as_int(), Some(MAX_NESTING as i64));

        let wrapped = format!("{}5{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let mut tree = parse(&wrapped);
        let root = tree.root();
        assert_eq!(eval(&mut tree, root, "value", &[]).as_int(), Some(5));
    }

    #[test]
    fn parenthesized_leaves_keep_their_token_span() {
        let mut tree = parse("(42)");
        let stmt = tree.child(tree.root(), 0).expect("stmt");
        let num = tree.child(stmt, 0).expect("num");
        assert_eq!(tree.source_text(num), Some("42"));
        assert_eq!(eval(&mut tree, stmt, "value", &[]).as_int(), Some(42));
    }

    #[test]
    fn rejects_malformed_build_args() {
        assert!(CalcFrontend.parse("x", &["x".to_owned()]).is_err());
        assert!(CalcFrontend.parse("x", &["x=abc".to_owned()]).is_err());
        assert!(CalcFrontend.parse("x", &["x=4".to_owned()]).is_ok());
    }

    #[test]
    fn evaluates_and_memoizes_value() {
        let mut tree = CalcFrontend.parse("x * (2 + 3)", &["x=4".to_owned()]).expect("parse");
        let root = tree.root();
        assert_eq!(eval(&mut tree, root, "value", &[]).as_int(), Some(20));

        let populated = tree
            .node_ids()
            .filter(|id| tree.node(*id).and_then(|n| n.memo()).is_some_and(|m| !m.is_empty()))
            .count();
        // Program, Stmt, Mul, Add carry memo tables; Num and Var do not.
        assert_eq!(populated, 4);
        assert!(matches!(eval(&mut tree, root, "memoized", &[]), HostValue::Bool(true)));
    }

    #[test]
    fn times_two_ignores_node() {
        let mut tree = parse("1");
        let root = tree.root();
        assert_eq!(eval(&mut tree, root, "timesTwo", &[ParameterValue::Int(21)]).as_int(), Some(42));
    }

    #[test]
    fn evaluation_errors_are_reported() {
        let mut tree = parse("1 / 0; y");
        let stmt0 = tree.child(tree.root(), 0).expect("stmt");
        let stmt1 = tree.child(tree.root(), 1).expect("stmt");
        let mut cx = InvocationContext::default();
        let err = CalcFrontend.invoke(&mut tree, stmt0, "value", &[], &mut cx).unwrap_err();
        assert_eq!(err.message, "division by zero");
        let err = CalcFrontend.invoke(&mut tree, stmt1, "value", &[], &mut cx).unwrap_err();
        assert_eq!(err.message, "unbound variable `y`");
    }

    #[test]
    fn unknown_property_suggests_closest() {
        let mut tree = parse("1");
        let root = tree.root();
        let mut cx = InvocationContext::default();
        let err = CalcFrontend.invoke(&mut tree, root, "vaule", &[], &mut cx).unwrap_err();
        assert_eq!(err.message, "no property `vaule` on `Program`; did you mean `value`?");
        let err = CalcFrontend.invoke(&mut tree, root, "zzzzzzzz", &[], &mut cx).unwrap_err();
        assert_eq!(err.message, "no property `zzzzzzzz` on `Program`");
    }

    #[test]
    fn argument_shape_is_checked() {
        let mut tree = parse("1");
        let root = tree.root();
        let mut cx = InvocationContext::default();
        let err = CalcFrontend.invoke(&mut tree, root, "timesTwo", &[], &mut cx).unwrap_err();
        assert!(err.message.contains("expects 1 argument"));
        let err = CalcFrontend
            .invoke(&mut tree, root, "timesTwo", &[ParameterValue::Bool(true)], &mut cx)
            .unwrap_err();
        assert!(err.message.contains("must be int"));
    }

    #[test]
    fn dump_is_indented_per_depth() {
        let mut tree = parse("1 + a");
        let root = tree.root();
        let HostValue::Text(text) = eval(&mut tree, root, "dump", &[]) else {
            panic!("dump returns text");
        };
        assert_eq!(text, "Program\n  Stmt\n    Add\n      Num \"1\"\n      Var \"a\"");
    }

    #[test]
    fn explain_emits_one_message_per_node() {
        let mut tree = parse("2 * 3");
        let stmt = tree.child(tree.root(), 0).expect("stmt");
        let mut cx = InvocationContext::default();
        let result = CalcFrontend.invoke(&mut tree, stmt, "explain", &[], &mut cx).expect("explain");
        assert_eq!(result.as_int(), Some(6));
        assert_eq!(cx.messages(), ["Stmt = 6", "Mul = 6", "Num \"2\" = 2", "Num \"3\" = 3"]);
    }

    #[test]
    fn is_ancestor_of_accepts_null() {
        let mut tree = parse("1");
        let root = tree.root();
        let stmt = tree.child(root, 0).expect("stmt");
        let yes = eval(&mut tree, root, "isAncestorOf", &[ParameterValue::Node(Some(stmt))]);
        assert!(matches!(yes, HostValue::Bool(true)));
        let no = eval(&mut tree, root, "isAncestorOf", &[ParameterValue::Node(None)]);
        assert!(matches!(no, HostValue::Bool(false)));
    }

    #[test]
    fn lists_every_property() {
        let tree = parse("1");
        let names = CalcFrontend
            .properties(&tree, tree.root())
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>();
        assert!(names.contains(&"timesTwo(int)".to_owned()));
        assert!(names.contains(&"isAncestorOf(node)".to_owned()));
        assert_eq!(names.len(), PROPERTIES.len());
    }
}
