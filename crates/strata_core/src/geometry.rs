//! Render primitives built from composed Mesh prims.
//!
//! A Mesh becomes one primitive per `GeomSubset` child, or a single
//! primitive when it has no subsets. Every primitive of a mesh shares the
//! mesh's position and normal buffers and only differs in its index buffer
//! and its flat color.

use std::ops::Range;
use std::sync::Arc;

use strata_math::{Bounds, Vec3};
use thiserror::Error;

use crate::layer::{NodeType, SceneNode};

/// Errors that abort building renderable geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("{prim} is missing required attribute {attribute}")]
    MissingAttribute {
        prim: String,
        attribute: &'static str,
    },

    #[error("Material binding {reference} on {prim} does not resolve: {segment} not found")]
    BrokenReference {
        prim: String,
        reference: String,
        segment: String,
    },

    #[error("Material {material} has no Shader child")]
    MissingShader { material: String },

    #[error("{prim}: faceVertexCounts sum to {expected}, faceVertexIndices has {actual}")]
    InvalidFaceCounts {
        prim: String,
        expected: usize,
        actual: usize,
    },

    #[error("{prim} has {points} points but {normals} normals")]
    NormalCountMismatch {
        prim: String,
        points: usize,
        normals: usize,
    },

    #[error("{prim}: face {face} is out of range ({face_count} faces)")]
    FaceOutOfRange {
        prim: String,
        face: u32,
        face_count: usize,
    },

    #[error("{prim}: vertex index {index} is out of range ({vertex_count} points)")]
    VertexOutOfRange {
        prim: String,
        index: u32,
        vertex_count: usize,
    },

    #[error("{prim}: vertex index {index} does not fit a 16-bit index buffer")]
    IndexOverflow { prim: String, index: u32 },

    #[error("No default prim declared and no top-level Xform found")]
    NoEntryPoint,

    #[error("Default prim {0} is not defined by any layer")]
    MissingDefaultPrim(String),

    #[error("Default prim {name} is a {node_type}, not an Xform or Mesh")]
    UnrenderableEntryPoint { name: String, node_type: String },
}

/// Result type for geometry and scene building.
pub type BuildResult<T> = Result<T, BuildError>;

/// A drawable piece of a mesh with a single flat color.
#[derive(Clone, Debug)]
pub struct RenderPrimitive {
    /// Name of the subset, or of the mesh when it has no subsets
    pub name: String,

    /// Vertex positions, shared by every primitive of the same mesh
    pub positions: Arc<[Vec3]>,

    /// Vertex normals, shared like `positions`
    pub normals: Arc<[Vec3]>,

    /// Triangle indices into `positions`
    pub indices: Vec<u16>,

    /// Flat unlit RGB color (0-1)
    pub color: Vec3,
}

impl RenderPrimitive {
    /// Number of triangles drawn by this primitive.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Raw position data for a vertex buffer upload.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions[..])
    }

    /// Raw normal data for a vertex buffer upload.
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals[..])
    }

    /// Raw index data for an index buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Bounds of the vertices this primitive actually references.
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        for &index in &self.indices {
            bounds.grow(self.positions[index as usize]);
        }
        bounds
    }
}

fn prim_name(node: &SceneNode) -> String {
    node.path_name().unwrap_or("<unnamed>").to_string()
}

fn required<'a, T>(
    node: &SceneNode,
    value: &'a Option<T>,
    attribute: &'static str,
) -> BuildResult<&'a T> {
    value.as_ref().ok_or_else(|| BuildError::MissingAttribute {
        prim: prim_name(node),
        attribute,
    })
}

/// Triangulated face list of a mesh.
struct Triangulation {
    /// Triangle vertex indices
    indices: Vec<u32>,

    /// For each authored face, its slice of `indices`
    faces: Vec<Range<usize>>,
}

/// Fan-triangulate the mesh's faces.
///
/// Without `faceVertexCounts` every face is a triangle. Faces with fewer than
/// three vertices produce no triangles but still occupy a face index.
fn triangulate(mesh: &SceneNode, face_vertex_indices: &[u32]) -> BuildResult<Triangulation> {
    let counts: Vec<u32> = match &mesh.attributes.face_vertex_counts {
        Some(counts) => counts.clone(),
        None => {
            if face_vertex_indices.len() % 3 != 0 {
                return Err(BuildError::InvalidFaceCounts {
                    prim: prim_name(mesh),
                    expected: face_vertex_indices.len() / 3 * 3,
                    actual: face_vertex_indices.len(),
                });
            }
            vec![3; face_vertex_indices.len() / 3]
        }
    };

    let expected: usize = counts.iter().map(|&c| c as usize).sum();
    if expected != face_vertex_indices.len() {
        return Err(BuildError::InvalidFaceCounts {
            prim: prim_name(mesh),
            expected,
            actual: face_vertex_indices.len(),
        });
    }

    let mut indices = Vec::with_capacity(face_vertex_indices.len());
    let mut faces = Vec::with_capacity(counts.len());
    let mut vertex_offset = 0usize;

    for &count in &counts {
        let count = count as usize;
        let start = indices.len();

        // Fan triangulation: (0,1,2), (0,2,3), ... (0,n-2,n-1)
        for i in 1..count.saturating_sub(1) {
            indices.push(face_vertex_indices[vertex_offset]);
            indices.push(face_vertex_indices[vertex_offset + i]);
            indices.push(face_vertex_indices[vertex_offset + i + 1]);
        }

        faces.push(start..indices.len());
        vertex_offset += count;
    }

    Ok(Triangulation { indices, faces })
}

/// Narrow triangle indices to 16 bits, checking them against the point count.
fn to_index_buffer(
    mesh: &SceneNode,
    indices: &[u32],
    vertex_count: usize,
) -> BuildResult<Vec<u16>> {
    indices
        .iter()
        .map(|&index| {
            if index as usize >= vertex_count {
                return Err(BuildError::VertexOutOfRange {
                    prim: prim_name(mesh),
                    index,
                    vertex_count,
                });
            }
            u16::try_from(index).map_err(|_| BuildError::IndexOverflow {
                prim: prim_name(mesh),
                index,
            })
        })
        .collect()
}

/// Resolve the flat color bound to `prim` through its `material:binding`.
///
/// The binding path is walked from the composition root by child name; the
/// color is the `inputs:diffuseColor` of the first Shader under the bound
/// material.
pub fn resolve_material_color(prim: &SceneNode, root: &SceneNode) -> BuildResult<Vec3> {
    let binding = required(prim, &prim.attributes.material_binding, "material:binding")?;

    let mut material = root;
    for segment in binding.segments() {
        material = material
            .child(segment)
            .ok_or_else(|| BuildError::BrokenReference {
                prim: prim_name(prim),
                reference: binding.target().to_string(),
                segment: segment.to_string(),
            })?;
    }

    let shader = material
        .children_of_type(NodeType::Shader)
        .next()
        .ok_or_else(|| BuildError::MissingShader {
            material: binding.target().to_string(),
        })?;

    required(shader, &shader.attributes.diffuse_color, "inputs:diffuseColor").copied()
}

/// Build the render primitives for a composed Mesh prim.
///
/// `root` is the composition root, used to resolve material bindings.
pub fn build_primitives(mesh: &SceneNode, root: &SceneNode) -> BuildResult<Vec<RenderPrimitive>> {
    let points = required(mesh, &mesh.attributes.points, "points")?;
    let normals = required(mesh, &mesh.attributes.normals, "normals")?;
    let face_vertex_indices =
        required(mesh, &mesh.attributes.face_vertex_indices, "faceVertexIndices")?;

    // Both buffers are indexed by the same triangle indices
    if normals.len() != points.len() {
        return Err(BuildError::NormalCountMismatch {
            prim: prim_name(mesh),
            points: points.len(),
            normals: normals.len(),
        });
    }

    let positions: Arc<[Vec3]> = Arc::from(points.as_slice());
    let normals: Arc<[Vec3]> = Arc::from(normals.as_slice());
    let triangulation = triangulate(mesh, face_vertex_indices)?;

    let subsets: Vec<&SceneNode> = mesh.children_of_type(NodeType::GeomSubset).collect();

    let primitive = |source: &SceneNode, indices: &[u32]| -> BuildResult<RenderPrimitive> {
        Ok(RenderPrimitive {
            name: prim_name(source),
            positions: Arc::clone(&positions),
            normals: Arc::clone(&normals),
            indices: to_index_buffer(mesh, indices, positions.len())?,
            color: resolve_material_color(source, root)?,
        })
    };

    if subsets.is_empty() {
        return Ok(vec![primitive(mesh, &triangulation.indices)?]);
    }

    subsets
        .into_iter()
        .map(|subset| {
            let faces = required(subset, &subset.attributes.indices, "indices")?;
            let mut indices = Vec::with_capacity(faces.len() * 3);
            for &face in faces {
                let range = triangulation.faces.get(face as usize).ok_or_else(|| {
                    BuildError::FaceOutOfRange {
                        prim: prim_name(subset),
                        face,
                        face_count: triangulation.faces.len(),
                    }
                })?;
                indices.extend_from_slice(&triangulation.indices[range.clone()]);
            }
            primitive(subset, &indices)
        })
        .collect()
}
