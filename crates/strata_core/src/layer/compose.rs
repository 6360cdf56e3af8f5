//! Layer composition.
//!
//! Layers are merged prim by prim, keyed by path. The layer order encodes
//! strength: a later layer overrides an earlier one. Children are never
//! taken from the layers themselves; the composed hierarchy is rebuilt from
//! the merged path set so that every path appears exactly once.

use std::collections::HashMap;
use std::fmt;

use super::index::{parent_path, path_depth, PathIndex, PATH_SEPARATOR};
use super::node::SceneNode;

/// Non-fatal problems found while composing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompositionWarning {
    /// A prim whose parent path is defined by no layer. The prim (and
    /// everything below it) is left out of the composed tree.
    OrphanedPrim { path: String, parent: String },
}

impl fmt::Display for CompositionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionWarning::OrphanedPrim { path, parent } => {
                write!(f, "prim {} dropped: parent {} is not defined", path, parent)
            }
        }
    }
}

/// The result of composing a layer stack.
#[derive(Clone, Debug, Default)]
pub struct Composition {
    /// Unnamed root whose children are the top-level prims
    pub root: SceneNode,

    pub warnings: Vec<CompositionWarning>,
}

impl Composition {
    /// Number of prims in the composed tree.
    pub fn prim_count(&self) -> usize {
        fn count(node: &SceneNode) -> usize {
            node.children.iter().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }
}

/// A merged prim waiting to be placed in the rebuilt tree.
struct MergedPrim {
    /// Position in first-seen order across the whole stack
    order: usize,
    node: SceneNode,
}

/// Compose layer documents, weakest first.
pub fn compose<'a, I>(documents: I) -> Composition
where
    I: IntoIterator<Item = &'a SceneNode>,
{
    let mut merged: HashMap<String, MergedPrim> = HashMap::new();
    let mut default_prim = None;
    let mut layer_count = 0;

    for document in documents {
        layer_count += 1;
        if document.default_prim.is_some() {
            default_prim = document.default_prim.clone();
        }
        merge_layer(&mut merged, &PathIndex::build(document));
    }

    let mut root = SceneNode {
        default_prim,
        ..Default::default()
    };
    let warnings = rebuild_hierarchy(&mut root, merged);

    log::info!(
        "Composed {} layers into {} top-level prims ({} warnings)",
        layer_count,
        root.children.len(),
        warnings.len()
    );

    Composition { root, warnings }
}

fn merge_layer(merged: &mut HashMap<String, MergedPrim>, index: &PathIndex<'_>) {
    for (path, node) in index.iter() {
        match merged.get_mut(path) {
            Some(existing) => {
                for key in existing.node.overlay(node) {
                    log::debug!("{}: stronger layer overrides {}", path, key);
                }
            }
            None => {
                let order = merged.len();
                merged.insert(
                    path.to_string(),
                    MergedPrim {
                        order,
                        node: node.detached(),
                    },
                );
            }
        }
    }
}

/// Insert every merged prim under its parent, shallowest first.
fn rebuild_hierarchy(
    root: &mut SceneNode,
    merged: HashMap<String, MergedPrim>,
) -> Vec<CompositionWarning> {
    let mut prims: Vec<(usize, String, MergedPrim)> = merged
        .into_iter()
        .map(|(path, prim)| (path_depth(&path), path, prim))
        .collect();
    prims.sort_by_key(|(depth, _, prim)| (*depth, prim.order));

    let mut warnings = Vec::new();
    for (_, path, prim) in prims {
        let parent = match parent_path(&path) {
            Some(parent_path) => {
                let segments: Vec<&str> = parent_path
                    .split(PATH_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .collect();
                root.descendant_mut(&segments)
            }
            None => Some(&mut *root),
        };

        match parent {
            Some(parent) => parent.children.push(prim.node),
            None => {
                let parent = parent_path(&path).unwrap_or_default().to_string();
                log::warn!("Dropping prim {}: parent {} is not defined", path, parent);
                warnings.push(CompositionWarning::OrphanedPrim { path, parent });
            }
        }
    }

    warnings
}
