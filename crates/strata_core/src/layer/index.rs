//! Path indexing of a single layer document.

use std::collections::HashMap;

use super::node::SceneNode;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Number of segments in a path (`"World/Geo/Box"` has depth 3).
pub fn path_depth(path: &str) -> usize {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).count()
}

/// Path of the parent prim, or `None` for a top-level prim.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR).map(|i| &path[..i])
}

/// Mapping from prim path to node for one document.
///
/// Iteration follows the order in which paths were first seen during the
/// depth-first walk; a path seen twice keeps its first position but points
/// at the later node.
#[derive(Debug, Default)]
pub struct PathIndex<'a> {
    order: Vec<String>,
    nodes: HashMap<String, &'a SceneNode>,
}

impl<'a> PathIndex<'a> {
    /// Index every named node below `root`.
    ///
    /// Only named nodes extend the path; unnamed nodes are transparent and
    /// their children are indexed as if they hung off the nearest named
    /// ancestor. The root itself is never part of a path.
    pub fn build(root: &'a SceneNode) -> Self {
        let mut index = PathIndex::default();
        let mut ancestors = Vec::new();
        for child in &root.children {
            index.visit(child, &mut ancestors);
        }
        index
    }

    fn visit(&mut self, node: &'a SceneNode, ancestors: &mut Vec<&'a str>) {
        let named = node.path_name();
        if let Some(name) = named {
            ancestors.push(name);
            self.insert(ancestors.join("/"), node);
        }

        for child in &node.children {
            self.visit(child, ancestors);
        }

        if named.is_some() {
            ancestors.pop();
        }
    }

    fn insert(&mut self, path: String, node: &'a SceneNode) {
        if self.nodes.insert(path.clone(), node).is_some() {
            log::debug!("Duplicate prim path {} in layer, later definition wins", path);
        } else {
            self.order.push(path);
        }
    }

    /// Node recorded for `path`.
    pub fn get(&self, path: &str) -> Option<&'a SceneNode> {
        self.nodes.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `(path, node)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a SceneNode)> + '_ {
        self.order
            .iter()
            .map(move |path| (path.as_str(), self.nodes[path.as_str()]))
    }
}

/// Index one document. Shorthand for [`PathIndex::build`].
pub fn index_paths(root: &SceneNode) -> PathIndex<'_> {
    PathIndex::build(root)
}
