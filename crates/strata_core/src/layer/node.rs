//! Scene-description node types.
//!
//! These types mirror the JSON emitted by the USDA converter: every prim is
//! an object with `def`, `type`, `name`, `attributes` and `children`. Known
//! attribute keys are parsed into typed fields when the document is read, so
//! a value of the wrong shape is rejected up front instead of surfacing as a
//! lookup failure deep inside geometry building.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_math::Vec3;

/// Prim type tag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// A transform-only container
    Xform,

    /// Triangle geometry
    Mesh,

    /// A face partition of the parent mesh
    GeomSubset,

    /// A flat color source
    Shader,

    /// Any other prim type (Material, Scope, ...); traversed but never rendered
    Other(String),

    /// No `type` key at all (document roots, attribute holders)
    #[default]
    Untyped,
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Xform => "Xform",
            NodeType::Mesh => "Mesh",
            NodeType::GeomSubset => "GeomSubset",
            NodeType::Shader => "Shader",
            NodeType::Other(name) => name,
            NodeType::Untyped => "",
        }
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, NodeType::Untyped)
    }
}

impl From<String> for NodeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Xform" => NodeType::Xform,
            "Mesh" => NodeType::Mesh,
            "GeomSubset" => NodeType::GeomSubset,
            "Shader" => NodeType::Shader,
            "" => NodeType::Untyped,
            _ => NodeType::Other(name),
        }
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `material:binding` target.
///
/// The converter writes relationship targets as `{ "ref": "</Root/Mat>" }`;
/// hand-written layers usually use the bare string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialBinding {
    Path(String),
    Ref {
        #[serde(rename = "ref")]
        target: String,
    },
}

impl MaterialBinding {
    /// The raw reference text, including its delimiters.
    pub fn target(&self) -> &str {
        match self {
            MaterialBinding::Path(target) => target,
            MaterialBinding::Ref { target } => target,
        }
    }

    /// Path segments of the bound prim.
    ///
    /// `</World/Looks/Red>` yields `["World", "Looks", "Red"]`.
    pub fn segments(&self) -> Vec<&str> {
        let target = self.target();
        let target = target.strip_prefix('<').unwrap_or(target);
        let target = target.strip_suffix('>').unwrap_or(target);
        target.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Typed attribute record.
///
/// Every field is optional because a layer may author any subset of them;
/// composition overlays them key by key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Vertex positions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<Vec3>>,

    /// Per-vertex normals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<Vec3>>,

    /// Vertex indices, face after face
    #[serde(
        rename = "faceVertexIndices",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub face_vertex_indices: Option<Vec<u32>>,

    /// Number of vertices per face; absent means all triangles
    #[serde(
        rename = "faceVertexCounts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub face_vertex_counts: Option<Vec<u32>>,

    /// Face indices of a GeomSubset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,

    #[serde(
        rename = "material:binding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub material_binding: Option<MaterialBinding>,

    /// Local transform, four rows as authored
    #[serde(
        rename = "xformOp:transform",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transform: Option<[[f32; 4]; 4]>,

    #[serde(
        rename = "inputs:diffuseColor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub diffuse_color: Option<Vec3>,
}

/// Overwrite `dst` with `src` when `src` is set. Returns true when both were
/// set and disagreed.
fn overlay<T: Clone + PartialEq>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    match src {
        Some(value) => {
            let conflict = dst.as_ref().is_some_and(|old| old != value);
            *dst = Some(value.clone());
            conflict
        }
        None => false,
    }
}

impl Attributes {
    /// Returns true if no attribute is set.
    pub fn is_empty(&self) -> bool {
        *self == Attributes::default()
    }

    /// Overlay a stronger layer's attributes on top of these.
    ///
    /// Keys set in `stronger` win; keys only set on one side are kept.
    /// Returns the keys whose values were replaced by a different value.
    pub fn overlay(&mut self, stronger: &Attributes) -> Vec<&'static str> {
        let mut conflicts = Vec::new();
        let mut note = |changed: bool, key: &'static str| {
            if changed {
                conflicts.push(key);
            }
        };

        note(overlay(&mut self.points, &stronger.points), "points");
        note(overlay(&mut self.normals, &stronger.normals), "normals");
        note(
            overlay(&mut self.face_vertex_indices, &stronger.face_vertex_indices),
            "faceVertexIndices",
        );
        note(
            overlay(&mut self.face_vertex_counts, &stronger.face_vertex_counts),
            "faceVertexCounts",
        );
        note(overlay(&mut self.indices, &stronger.indices), "indices");
        note(
            overlay(&mut self.material_binding, &stronger.material_binding),
            "material:binding",
        );
        note(
            overlay(&mut self.transform, &stronger.transform),
            "xformOp:transform",
        );
        note(
            overlay(&mut self.diffuse_color, &stronger.diffuse_color),
            "inputs:diffuseColor",
        );

        conflicts
    }
}

/// A node in a scene-description tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    /// Prim specifier (`def`, `over`, `class`)
    #[serde(rename = "def", default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "NodeType::is_untyped")]
    pub node_type: NodeType,

    /// Local name; absent for the document root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Declared entry point; only meaningful on a document root
    #[serde(
        rename = "defaultPrim",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_prim: Option<String>,

    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Create a named node with no attributes.
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Create an unnamed root wrapper around `children`.
    pub fn root(children: Vec<SceneNode>) -> Self {
        Self {
            children,
            ..Default::default()
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// The node's name, if it has a non-empty one.
    pub fn path_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&SceneNode> {
        self.children.iter().find(|c| c.path_name() == Some(name))
    }

    /// Mutable variant of [`SceneNode::child`].
    pub fn child_mut(&mut self, name: &str) -> Option<&mut SceneNode> {
        self.children.iter_mut().find(|c| c.path_name() == Some(name))
    }

    /// Walk down from this node through children matching each segment.
    pub fn descendant<S: AsRef<str>>(&self, segments: &[S]) -> Option<&SceneNode> {
        let mut node = self;
        for segment in segments {
            node = node.child(segment.as_ref())?;
        }
        Some(node)
    }

    /// Mutable variant of [`SceneNode::descendant`].
    pub fn descendant_mut<S: AsRef<str>>(&mut self, segments: &[S]) -> Option<&mut SceneNode> {
        let mut node = self;
        for segment in segments {
            node = node.child_mut(segment.as_ref())?;
        }
        Some(node)
    }

    /// Look up a `/`-separated path below this node.
    pub fn find(&self, path: &str) -> Option<&SceneNode> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.descendant(&segments)
    }

    /// Children of the given type.
    pub fn children_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &SceneNode> + '_ {
        self.children.iter().filter(move |c| c.node_type == node_type)
    }

    /// A copy of this node without its children.
    pub fn detached(&self) -> SceneNode {
        SceneNode {
            specifier: self.specifier.clone(),
            node_type: self.node_type.clone(),
            name: self.name.clone(),
            default_prim: self.default_prim.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    /// Overlay a stronger layer's opinion of the same prim.
    ///
    /// Top-level fields the stronger node sets are replaced, attributes are
    /// merged key by key, and children are left alone. Returns the attribute
    /// keys whose values changed.
    pub fn overlay(&mut self, stronger: &SceneNode) -> Vec<&'static str> {
        if stronger.specifier.is_some() {
            self.specifier = stronger.specifier.clone();
        }
        if !stronger.node_type.is_untyped() {
            self.node_type = stronger.node_type.clone();
        }
        if stronger.name.is_some() {
            self.name = stronger.name.clone();
        }
        if stronger.default_prim.is_some() {
            self.default_prim = stronger.default_prim.clone();
        }
        self.attributes.overlay(&stronger.attributes)
    }
}
