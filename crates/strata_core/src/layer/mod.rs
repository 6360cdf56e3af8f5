//! Layered scene documents and their composition.
//!
//! A layer is a JSON scene-description document, or USDA text converted into
//! one. Layers are stacked weakest first and composed by prim path into a
//! single tree.
//!
//! ## Supported prims
//!
//! - `Xform`: transform containers (`xformOp:transform`)
//! - `Mesh`: triangle or polygon geometry with optional `GeomSubset`s
//! - `Shader`: flat `inputs:diffuseColor`
//!
//! # Example
//!
//! ```ignore
//! use strata_core::layer::{compose, LayerManifest};
//!
//! let layers = LayerManifest::open("assets/layers/manifest.json")?.load()?;
//! let composition = compose(layers.iter().map(|l| &l.document));
//! println!("{} prims", composition.prim_count());
//! ```

mod compose;
mod index;
mod loader;
mod node;
mod usda;

pub use compose::*;
pub use index::*;
pub use loader::*;
pub use node::*;
pub use usda::*;
