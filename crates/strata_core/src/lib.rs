//! Strata Core - layered scene composition for USD-style JSON documents.
//!
//! This crate provides:
//!
//! - **Layers**: `SceneNode` documents, path indexing and composition
//! - **Geometry**: `RenderPrimitive`s built from composed Mesh prims
//! - **Scene**: the renderable `SceneGraph` assembled from a composition
//! - **Session**: a layer stack with enable/disable toggles and rebuilds
//!
//! # Example
//!
//! ```ignore
//! use strata_core::session::Session;
//!
//! let mut session = Session::open_manifest("assets/layers/manifest.json")?;
//! let scene = session.toggle_layer("looks")?;
//! println!("{} primitives, {} triangles",
//!     scene.primitive_count(),
//!     scene.total_triangle_count());
//! ```

pub mod geometry;
pub mod layer;
pub mod scene;
pub mod session;

// Re-export commonly used types
pub use geometry::{BuildError, BuildResult, RenderPrimitive};
pub use layer::{compose, Composition, Layer, LayerManifest, NodeType, SceneNode};
pub use scene::{assemble_scene, SceneGraph, SceneObject};
pub use session::{Renderer, Session, SessionError};
