//! Renderable scene graph.
//!
//! The assembled scene is a tree of containers: Xform prims become empty
//! groups, Mesh prims become groups holding their render primitives. A
//! container with an authored `xformOp:transform` carries that matrix as its
//! authoritative local transform; every other container is identity.

use strata_math::{mat4_from_rows, Bounds, Mat4, Mat4Ext};

use crate::geometry::{build_primitives, BuildError, BuildResult, RenderPrimitive};
use crate::layer::{NodeType, SceneNode};

/// What produced a scene object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// The scene root
    Root,

    /// An Xform prim
    Group,

    /// A Mesh prim
    Mesh,
}

/// A node of the renderable scene graph.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,

    pub kind: ObjectKind,

    /// Explicit local matrix; `None` means identity
    pub local_transform: Option<Mat4>,

    /// Geometry drawn by this object (only Mesh objects have any)
    pub primitives: Vec<RenderPrimitive>,

    pub children: Vec<SceneObject>,
}

impl SceneObject {
    /// Create an empty object.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            local_transform: None,
            primitives: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Local transform matrix (identity when none was authored).
    pub fn matrix(&self) -> Mat4 {
        self.local_transform.unwrap_or(Mat4::IDENTITY)
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&SceneObject> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Look up a `/`-separated path of child names below this object.
    pub fn find(&self, path: &str) -> Option<&SceneObject> {
        let mut object = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            object = object.child(segment)?;
        }
        Some(object)
    }
}

/// A complete renderable scene, rebuilt from scratch on every composition.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    pub root: SceneObject,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self {
            root: SceneObject::new("", ObjectKind::Root),
        }
    }
}

impl SceneGraph {
    /// Visit every object depth-first with its accumulated world matrix.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&SceneObject, &Mat4, usize),
    {
        fn recurse<F>(object: &SceneObject, parent: &Mat4, depth: usize, visit: &mut F)
        where
            F: FnMut(&SceneObject, &Mat4, usize),
        {
            let world = *parent * object.matrix();
            visit(object, &world, depth);
            for child in &object.children {
                recurse(child, &world, depth + 1, visit);
            }
        }

        recurse(&self.root, &Mat4::IDENTITY, 0, &mut visit);
    }

    /// Get total object count (root included).
    pub fn object_count(&self) -> usize {
        let mut count = 0;
        self.walk(|_, _, _| count += 1);
        count
    }

    /// Get total primitive count.
    pub fn primitive_count(&self) -> usize {
        let mut count = 0;
        self.walk(|object, _, _| count += object.primitives.len());
        count
    }

    /// Get total triangle count across all primitives.
    pub fn total_triangle_count(&self) -> usize {
        let mut count = 0;
        self.walk(|object, _, _| {
            count += object
                .primitives
                .iter()
                .map(RenderPrimitive::triangle_count)
                .sum::<usize>();
        });
        count
    }

    /// Compute the world-space bounds of all primitives.
    pub fn world_bounds(&self) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        self.walk(|object, world, _| {
            for primitive in &object.primitives {
                bounds = bounds.union(&world.transform_bounds(&primitive.bounds()));
            }
        });
        bounds
    }
}

/// Pick the composed root's renderable entry prim.
///
/// A declared `defaultPrim` wins and must name an Xform or Mesh; otherwise
/// the first top-level Xform is used.
pub fn select_entry_point(root: &SceneNode) -> BuildResult<&SceneNode> {
    match &root.default_prim {
        Some(name) => {
            let entry = root
                .child(name)
                .ok_or_else(|| BuildError::MissingDefaultPrim(name.clone()))?;
            match entry.node_type {
                NodeType::Xform | NodeType::Mesh => Ok(entry),
                _ => Err(BuildError::UnrenderableEntryPoint {
                    name: name.clone(),
                    node_type: entry.node_type.to_string(),
                }),
            }
        }
        None => root
            .children_of_type(NodeType::Xform)
            .next()
            .ok_or(BuildError::NoEntryPoint),
    }
}

/// Local matrix from an authored `xformOp:transform`.
///
/// The four authored rows are read as a row-major matrix and then
/// transposed, which turns USD's row-vector layout into glam's column
/// convention.
pub fn authored_transform(node: &SceneNode) -> Option<Mat4> {
    node.attributes
        .transform
        .as_ref()
        .map(|rows| mat4_from_rows(rows).transpose())
}

/// Append the objects for `node` (and its renderable descendants) to
/// `parent`.
///
/// Xform and Mesh prims produce a container; any other prim type is skipped
/// together with its subtree, since shaders, materials and subsets are only
/// reached through lookups from the mesh that uses them.
pub fn assemble(node: &SceneNode, parent: &mut SceneObject, root: &SceneNode) -> BuildResult<()> {
    let name = node.path_name().unwrap_or_default();
    let mut object = match node.node_type {
        NodeType::Xform => SceneObject::new(name, ObjectKind::Group),
        NodeType::Mesh => {
            let mut object = SceneObject::new(name, ObjectKind::Mesh);
            object.primitives = build_primitives(node, root)?;
            object
        }
        _ => return Ok(()),
    };

    object.local_transform = authored_transform(node);

    for child in &node.children {
        assemble(child, &mut object, root)?;
    }

    parent.children.push(object);
    Ok(())
}

/// Assemble a fresh scene graph from a composed root.
pub fn assemble_scene(root: &SceneNode) -> BuildResult<SceneGraph> {
    let entry = select_entry_point(root)?;
    let mut scene = SceneGraph::default();
    assemble(entry, &mut scene.root, root)?;

    log::info!(
        "Assembled scene: {} objects, {} primitives, {} triangles",
        scene.object_count(),
        scene.primitive_count(),
        scene.total_triangle_count()
    );

    Ok(scene)
}
