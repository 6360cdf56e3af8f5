// Re-export glam for convenience
pub use glam::*;

// Strata math types
mod bounds;
mod transform;
pub use bounds::Bounds;
pub use transform::{mat4_from_rows, mat4_to_rows, Mat4Ext};
