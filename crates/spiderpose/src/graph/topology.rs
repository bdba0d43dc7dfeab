//! Fixed nine-part spider topology.
//!
//! The tree is described by an explicit table of parts; adjacency and edge
//! kinds are derived from it rather than from index ranges.
//!
//! ```text
//!            5   6   7   8      outer limbs
//!            |   |   |   |
//!            1   2   3   4      inner limbs
//!             \  |   |  /
//!                  0            root
//! ```

use crate::shape::ShapeKind;

/// Number of parts in the spider.
pub const NUM_NODES: usize = 9;
/// Index of the root body.
pub const ROOT: usize = 0;
/// Number of limbs (inner + outer).
pub const NUM_LIMBS: usize = NUM_NODES - 1;

/// Depth of a part in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Root,
    Inner,
    Outer,
}

/// One row of the topology table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartSpec {
    pub id: usize,
    /// Label value of this part in the observation.
    pub tag: u8,
    pub kind: ShapeKind,
    pub layer: Layer,
    pub parent: Option<usize>,
}

/// Directed edge type, named `source → target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    LimbToRoot,
    RootToLimb,
    OuterToInner,
    InnerToOuter,
}

impl EdgeKind {
    /// Resolve the kind of the directed edge `source → target`.
    ///
    /// Rules are checked in order: shape kinds first, then layers.
    pub fn resolve(source: &PartSpec, target: &PartSpec) -> Option<Self> {
        match (target.kind, source.kind) {
            (ShapeKind::Circle, ShapeKind::Rectangle) => return Some(Self::LimbToRoot),
            (ShapeKind::Rectangle, ShapeKind::Circle) => return Some(Self::RootToLimb),
            _ => {}
        }
        match (target.layer, source.layer) {
            (Layer::Inner, Layer::Outer) => Some(Self::OuterToInner),
            (Layer::Outer, Layer::Inner) => Some(Self::InnerToOuter),
            _ => None,
        }
    }
}

/// Undirected tree with per-node neighbor lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    parts: Vec<PartSpec>,
    /// Parent first, then children in table order.
    neighbors: Vec<Vec<usize>>,
}

impl Topology {
    /// The spider: root circle, four inner limbs on the root, one outer limb
    /// on each inner limb. Tags are `id + 1`.
    pub fn spider() -> Self {
        let inner = 1..=4;
        let mut parts = Vec::with_capacity(NUM_NODES);
        parts.push(PartSpec {
            id: ROOT,
            tag: 1,
            kind: ShapeKind::Circle,
            layer: Layer::Root,
            parent: None,
        });
        for id in inner.clone() {
            parts.push(PartSpec {
                id,
                tag: id as u8 + 1,
                kind: ShapeKind::Rectangle,
                layer: Layer::Inner,
                parent: Some(ROOT),
            });
        }
        for parent in inner {
            let id = parent + 4;
            parts.push(PartSpec {
                id,
                tag: id as u8 + 1,
                kind: ShapeKind::Rectangle,
                layer: Layer::Outer,
                parent: Some(parent),
            });
        }
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<PartSpec>) -> Self {
        let neighbors = parts
            .iter()
            .map(|p| {
                p.parent
                    .into_iter()
                    .chain(parts.iter().filter(|c| c.parent == Some(p.id)).map(|c| c.id))
                    .collect()
            })
            .collect();
        Self { parts, neighbors }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[PartSpec] {
        &self.parts
    }

    pub fn part(&self, id: usize) -> &PartSpec {
        &self.parts[id]
    }

    pub fn neighbors(&self, id: usize) -> &[usize] {
        &self.neighbors[id]
    }

    /// Position of `neighbor` in `node`'s neighbor list.
    pub fn slot_of(&self, node: usize, neighbor: usize) -> Option<usize> {
        self.neighbors[node].iter().position(|&n| n == neighbor)
    }

    /// Kind of the directed edge `source → target`, `None` if not adjacent.
    pub fn edge_kind(&self, source: usize, target: usize) -> Option<EdgeKind> {
        self.slot_of(target, source)?;
        EdgeKind::resolve(&self.parts[source], &self.parts[target])
    }

    /// Undirected edges as `(parent, child)`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.parts
            .iter()
            .filter_map(|p| p.parent.map(|parent| (parent, p.id)))
            .collect()
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::spider()
    }
}
