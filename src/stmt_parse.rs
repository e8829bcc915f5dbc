//! Parser for the canonical statement-graph rendering.
//!
//! Reads the text produced by `StmtGraph`'s `Display` back into a graph.
//! Each line is parsed into an AST node first. Resolution then checks that
//! ids are dense and in order and that every operand names an earlier
//! node, which is exactly what `StmtGraph::push` enforces.

use chumsky::prelude::*;

use crate::error::{Error, Result};
use crate::stmt::{StmtGraph, StmtId, StmtKind};

// ─── AST (first pass) ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum AstKind {
    Symbol(String),
    Literal(String),
    Unary(String, u32),
    Binary(String, u32, u32),
    Assign(u32, u32),
}

// ─── Parsers ────────────────────────────────────────────────────────────────

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Horizontal whitespace only; lines are split before parsing.
fn hspace<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    any()
        .filter(|c: &char| *c == ' ' || *c == '\t')
        .repeated()
        .ignored()
}

fn uint32<'src>() -> impl Parser<'src, &'src str, u32, Extra<'src>> + Clone {
    text::int::<_, Extra<'_>>(10).try_map(|s: &str, span| {
        s.parse::<u32>()
            .map_err(|e| Rich::custom(span, format!("bad id `{s}`: {e}")))
    })
}

/// `$12`
fn reference<'src>() -> impl Parser<'src, &'src str, u32, Extra<'src>> + Clone {
    just('$').ignore_then(uint32())
}

/// `[...]`, anything up to the closing bracket.
fn attr<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    none_of("]")
        .repeated()
        .to_slice()
        .delimited_by(just('['), just(']'))
        .map(|s: &str| s.to_owned())
}

fn kind<'src>() -> impl Parser<'src, &'src str, AstKind, Extra<'src>> + Clone {
    let sp = hspace();
    choice((
        just("Symbol")
            .ignore_then(sp.clone())
            .ignore_then(attr())
            .map(AstKind::Symbol),
        just("Literal")
            .ignore_then(sp.clone())
            .ignore_then(attr())
            .map(AstKind::Literal),
        just("UnaryOp")
            .ignore_then(sp.clone())
            .ignore_then(attr())
            .then_ignore(sp.clone())
            .then(reference())
            .map(|(op, src)| AstKind::Unary(op, src)),
        just("BinaryOp")
            .ignore_then(sp.clone())
            .ignore_then(attr())
            .then_ignore(sp.clone())
            .then(reference())
            .then_ignore(sp.clone())
            .then(reference())
            .map(|((op, lhs), rhs)| AstKind::Binary(op, lhs, rhs)),
        just("Assign")
            .ignore_then(sp.clone())
            .ignore_then(reference())
            .then_ignore(sp.clone())
            .then(reference())
            .map(|(dst, src)| AstKind::Assign(dst, src)),
    ))
}

/// `$<id> = <Kind> ...`
fn node_line<'src>() -> impl Parser<'src, &'src str, (u32, AstKind), Extra<'src>> + Clone {
    let sp = hspace();
    sp.clone()
        .ignore_then(reference())
        .then_ignore(sp.clone())
        .then_ignore(just('='))
        .then_ignore(sp.clone())
        .then(kind())
        .then_ignore(sp)
        .then_ignore(end())
}

// ─── Resolution (second pass) ───────────────────────────────────────────────

/// Parse a graph dump into a [`StmtGraph`]. Blank lines are skipped.
pub fn parse_graph(input: &str) -> Result<StmtGraph> {
    let mut graph = StmtGraph::new();

    for (lineno, line) in input.lines().enumerate() {
        let lineno = lineno + 1;
        if line.trim().is_empty() {
            continue;
        }

        let (id, ast) = node_line().parse(line).into_result().map_err(|errs| {
            let msgs: Vec<String> = errs.into_iter().map(|e| format!("{e}")).collect();
            Error::GraphParse {
                message: format!("line {lineno}: {}", msgs.join("; ")),
            }
        })?;

        if id as usize != graph.len() {
            return Err(Error::GraphParse {
                message: format!(
                    "line {lineno}: expected ${}, found ${id} (ids must be dense and ordered)",
                    graph.len()
                ),
            });
        }

        let kind = match ast {
            AstKind::Symbol(name) => StmtKind::Symbol { name },
            AstKind::Literal(value) => StmtKind::Literal { value },
            AstKind::Unary(op, src) => StmtKind::UnaryOp {
                op,
                src: StmtId::new(src),
            },
            AstKind::Binary(op, lhs, rhs) => StmtKind::BinaryOp {
                op,
                lhs: StmtId::new(lhs),
                rhs: StmtId::new(rhs),
            },
            AstKind::Assign(dst, src) => StmtKind::Assign {
                dst: StmtId::new(dst),
                src: StmtId::new(src),
            },
        };

        graph.push(kind).map_err(|e| Error::GraphParse {
            message: format!("line {lineno}: {e}"),
        })?;
    }

    Ok(graph)
}
