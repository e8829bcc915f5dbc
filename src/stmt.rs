//! Statement graph: the expression DAG handed over by front-ends.
//!
//! Nodes live in a Vec-backed arena owned by [`StmtGraph`] and refer to
//! their operands through copyable [`StmtId`] handles. A handle can only
//! point at a node created before it, so the graph is acyclic by
//! construction, and a node can be shared by any number of consumers
//! while being defined exactly once.
//!
//! Nodes carry no behavior. The only contracts are the ordered operand list
//! used for dependency traversal and the canonical one-line rendering used
//! in diagnostics:
//!
//! ```text
//! $0 = Symbol [x]
//! $1 = Literal [2.0]
//! $2 = BinaryOp [*] $0 $1
//! $3 = Assign $0 $2
//! ```

use std::fmt;

use crate::error::{Error, Result};

// ─── Handles ────────────────────────────────────────────────────────────────

/// Handle to a node in a [`StmtGraph`]. The raw value is the node's id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(u32);

impl StmtId {
    pub(crate) fn new(index: u32) -> Self {
        StmtId(index)
    }

    /// The node id, which is also its position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

// ─── Nodes ──────────────────────────────────────────────────────────────────

/// What a node is, with its kind-specific payload and operands.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Symbol { name: String },
    Literal { value: String },
    UnaryOp { op: String, src: StmtId },
    BinaryOp { op: String, lhs: StmtId, rhs: StmtId },
    Assign { dst: StmtId, src: StmtId },
}

impl StmtKind {
    /// Spelling of the kind in the canonical rendering.
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Symbol { .. } => "Symbol",
            StmtKind::Literal { .. } => "Literal",
            StmtKind::UnaryOp { .. } => "UnaryOp",
            StmtKind::BinaryOp { .. } => "BinaryOp",
            StmtKind::Assign { .. } => "Assign",
        }
    }

    /// Number of operands a node of this kind always has.
    pub fn arity(&self) -> usize {
        match self {
            StmtKind::Symbol { .. } | StmtKind::Literal { .. } => 0,
            StmtKind::UnaryOp { .. } => 1,
            StmtKind::BinaryOp { .. } | StmtKind::Assign { .. } => 2,
        }
    }
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    id: StmtId,
    kind: StmtKind,
}

impl StmtNode {
    pub fn id(&self) -> StmtId {
        self.id
    }

    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    /// Direct operands in order. Empty for symbols and literals.
    pub fn operands(&self) -> Vec<StmtId> {
        match &self.kind {
            StmtKind::Symbol { .. } | StmtKind::Literal { .. } => Vec::new(),
            StmtKind::UnaryOp { src, .. } => vec![*src],
            StmtKind::BinaryOp { lhs, rhs, .. } => vec![*lhs, *rhs],
            StmtKind::Assign { dst, src } => vec![*dst, *src],
        }
    }
}

impl fmt::Display for StmtNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.id, self.kind.name())?;
        match &self.kind {
            StmtKind::Symbol { name } => write!(f, " [{name}]")?,
            StmtKind::Literal { value } => write!(f, " [{value}]")?,
            StmtKind::UnaryOp { op, .. } | StmtKind::BinaryOp { op, .. } => write!(f, " [{op}]")?,
            StmtKind::Assign { .. } => {}
        }
        for operand in self.operands() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

// ─── Graph ──────────────────────────────────────────────────────────────────

/// Append-only arena of statement nodes.
#[derive(Debug, Clone, Default)]
pub struct StmtGraph {
    nodes: Vec<StmtNode>,
}

impl StmtGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node. Returns `None` for a handle from another graph that is
    /// past the end of this one.
    pub fn get(&self, id: StmtId) -> Option<&StmtNode> {
        self.nodes.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StmtNode> {
        self.nodes.iter()
    }

    pub fn symbol(&mut self, name: impl Into<String>) -> StmtId {
        self.push_unchecked(StmtKind::Symbol { name: name.into() })
    }

    pub fn literal(&mut self, value: impl Into<String>) -> StmtId {
        self.push_unchecked(StmtKind::Literal {
            value: value.into(),
        })
    }

    pub fn unary(&mut self, op: impl Into<String>, src: StmtId) -> Result<StmtId> {
        self.push(StmtKind::UnaryOp { op: op.into(), src })
    }

    pub fn binary(&mut self, op: impl Into<String>, lhs: StmtId, rhs: StmtId) -> Result<StmtId> {
        self.push(StmtKind::BinaryOp {
            op: op.into(),
            lhs,
            rhs,
        })
    }

    pub fn assign(&mut self, dst: StmtId, src: StmtId) -> Result<StmtId> {
        self.push(StmtKind::Assign { dst, src })
    }

    /// Append a node of any kind, checking that every operand already exists.
    pub fn push(&mut self, kind: StmtKind) -> Result<StmtId> {
        let node = StmtNode {
            id: StmtId::new(self.nodes.len() as u32),
            kind,
        };
        if let Some(bad) = node.operands().into_iter().find(|op| op.index() >= self.len()) {
            return Err(Error::DanglingOperand { id: bad.raw() });
        }
        let id = node.id;
        self.nodes.push(node);
        Ok(id)
    }

    fn push_unchecked(&mut self, kind: StmtKind) -> StmtId {
        let id = StmtId::new(self.nodes.len() as u32);
        self.nodes.push(StmtNode { id, kind });
        id
    }

    /// Nodes that list `id` among their operands, in id order. A node that
    /// uses the same operand twice appears once.
    pub fn users(&self, id: StmtId) -> Vec<StmtId> {
        self.nodes
            .get(id.index() + 1..)
            .unwrap_or_default()
            .iter()
            .filter(|node| node.operands().contains(&id))
            .map(|node| node.id)
            .collect()
    }

    /// Every node reachable from `roots`, each after all of its operands.
    ///
    /// Shared subexpressions are emitted once. Roots are visited in the order
    /// given, operands left to right.
    pub fn postorder(&self, roots: &[StmtId]) -> Vec<StmtId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        // (node, whether its operands have been pushed)
        let mut stack: Vec<(StmtId, bool)> = Vec::new();

        for &root in roots.iter().rev() {
            stack.push((root, false));
        }

        while let Some((id, expanded)) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if visited[id.index()] {
                continue;
            }
            if expanded {
                visited[id.index()] = true;
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for operand in node.operands().into_iter().rev() {
                if !visited[operand.index()] {
                    stack.push((operand, false));
                }
            }
        }

        order
    }
}

impl std::ops::Index<StmtId> for StmtGraph {
    type Output = StmtNode;
    fn index(&self, id: StmtId) -> &StmtNode {
        &self.nodes[id.index()]
    }
}

impl fmt::Display for StmtGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}
