//! Layer stack and scene rebuild.
//!
//! A [`Session`] owns the loaded layers and the scene currently on display.
//! Changing which layers are enabled recomposes and reassembles everything
//! from scratch; the new scene replaces the old one only once it has been
//! built completely, so a failed rebuild leaves the previous scene in place.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::geometry::BuildError;
use crate::layer::{compose, Composition, CompositionWarning, Layer, LayerManifest, LoadError};
use crate::scene::{assemble_scene, SceneGraph};

/// Errors surfaced by a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("No layer named {0}")]
    UnknownLayer(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Consumer of assembled scenes (the rasterizer, a debug printer, ...).
pub trait Renderer {
    /// Replace whatever is displayed with `scene`.
    fn present(&mut self, scene: Arc<SceneGraph>);
}

/// Ordered layers with their enabled flags, weakest first.
#[derive(Clone, Debug, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Add a layer on top of the stack (strongest).
    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn layer_mut(&mut self, name: &str) -> SessionResult<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| SessionError::UnknownLayer(name.to_string()))
    }

    /// Enable or disable a layer by name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> SessionResult<()> {
        self.layer_mut(name)?.enabled = enabled;
        Ok(())
    }

    /// Flip a layer's enabled flag and return the new state.
    pub fn toggle(&mut self, name: &str) -> SessionResult<bool> {
        let layer = self.layer_mut(name)?;
        layer.enabled = !layer.enabled;
        Ok(layer.enabled)
    }

    /// Compose the enabled layers in load order.
    pub fn compose(&self) -> Composition {
        compose(self.layers.iter().filter(|l| l.enabled).map(|l| &l.document))
    }
}

/// Loaded layers plus the scene built from them.
#[derive(Debug, Default)]
pub struct Session {
    stack: LayerStack,
    scene: Option<Arc<SceneGraph>>,
    composition: Composition,
}

impl Session {
    /// Start a session over already-loaded layers. Nothing is built yet.
    pub fn new(layers: Vec<Layer>) -> Self {
        Self {
            stack: LayerStack::new(layers),
            ..Default::default()
        }
    }

    /// Load every layer of a manifest and build the initial scene.
    pub fn open_manifest<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let layers = LayerManifest::open(path)?.load()?;
        let mut session = Self::new(layers);
        session.rebuild()?;
        Ok(session)
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// Layer stack for edits that should not trigger a rebuild yet.
    pub fn stack_mut(&mut self) -> &mut LayerStack {
        &mut self.stack
    }

    /// Scene currently on display, if a build has succeeded.
    pub fn scene(&self) -> Option<&Arc<SceneGraph>> {
        self.scene.as_ref()
    }

    /// Composed tree of the last successful build.
    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Warnings from the last successful composition.
    pub fn warnings(&self) -> &[CompositionWarning] {
        &self.composition.warnings
    }

    /// Recompose the enabled layers and reassemble the scene.
    pub fn rebuild(&mut self) -> SessionResult<Arc<SceneGraph>> {
        let composition = self.stack.compose();
        let scene = Arc::new(assemble_scene(&composition.root)?);

        self.composition = composition;
        self.scene = Some(Arc::clone(&scene));
        Ok(scene)
    }

    /// Enable or disable a layer, then rebuild.
    pub fn set_layer_enabled(
        &mut self,
        name: &str,
        enabled: bool,
    ) -> SessionResult<Arc<SceneGraph>> {
        self.stack.set_enabled(name, enabled)?;
        self.rebuild()
    }

    /// Flip a layer, then rebuild.
    pub fn toggle_layer(&mut self, name: &str) -> SessionResult<Arc<SceneGraph>> {
        let enabled = self.stack.toggle(name)?;
        log::info!("Layer {} {}", name, if enabled { "enabled" } else { "disabled" });
        self.rebuild()
    }

    /// Hand the current scene to a renderer. Returns false if there is none.
    pub fn present<R: Renderer>(&self, renderer: &mut R) -> bool {
        match &self.scene {
            Some(scene) => {
                renderer.present(Arc::clone(scene));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{parse_layer, NodeType};
    use strata_math::Vec3;

    const BASE: &str = r#"{
        "children": [{
            "type": "Xform", "name": "world",
            "children": [{
                "type": "Mesh", "name": "box",
                "attributes": {
                    "points": [[0,0,0],[1,0,0],[0,1,0]],
                    "normals": [[0,0,1],[0,0,1],[0,0,1]],
                    "faceVertexIndices": [0,1,2],
                    "material:binding": {"ref": "</world/grey>"}
                }
            }, {
                "type": "Material", "name": "grey",
                "children": [{
                    "type": "Shader", "name": "s",
                    "attributes": {"inputs:diffuseColor": [0.5,0.5,0.5]}
                }]
            }]
        }]
    }"#;

    const LOOKS: &str = r#"{
        "children": [{
            "name": "world",
            "children": [{
                "name": "box",
                "attributes": {"material:binding": "</world/red>"}
            }, {
                "type": "Material", "name": "red",
                "children": [{
                    "type": "Shader", "name": "s",
                    "attributes": {"inputs:diffuseColor": [1,0,0]}
                }]
            }]
        }]
    }"#;

    const BROKEN: &str = r#"{
        "children": [{
            "name": "world",
            "children": [{"name": "box", "attributes": {"material:binding": "</world/nope>"}}]
        }]
    }"#;

    fn layer(name: &str, json: &str) -> Layer {
        Layer::new(name, parse_layer(json).unwrap())
    }

    fn box_color(scene: &SceneGraph) -> Vec3 {
        scene.root.find("world/box").unwrap().primitives[0].color
    }

    #[derive(Default)]
    struct RecordingRenderer {
        presented: Vec<Arc<SceneGraph>>,
    }

    impl Renderer for RecordingRenderer {
        fn present(&mut self, scene: Arc<SceneGraph>) {
            self.presented.push(scene);
        }
    }

    #[test]
    fn test_toggle_layer_recomposes() {
        let mut session = Session::new(vec![layer("base", BASE), layer("looks", LOOKS)]);

        let scene = session.rebuild().unwrap();
        assert_eq!(box_color(&scene), Vec3::new(1.0, 0.0, 0.0));
        assert!(session.composition().root.find("world/red").is_some());

        let scene = session.toggle_layer("looks").unwrap();
        assert_eq!(box_color(&scene), Vec3::new(0.5, 0.5, 0.5));
        assert!(session.composition().root.find("world/red").is_none());
        assert_eq!(
            session.composition().root.find("world/box").unwrap().node_type,
            NodeType::Mesh
        );

        let scene = session.set_layer_enabled("looks", true).unwrap();
        assert_eq!(box_color(&scene), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_scene() {
        let mut session = Session::new(vec![
            layer("base", BASE),
            layer("broken", BROKEN),
        ]);
        session.stack.set_enabled("broken", false).unwrap();
        let before = session.rebuild().unwrap();

        let result = session.toggle_layer("broken");
        assert!(matches!(
            result,
            Err(SessionError::Build(BuildError::BrokenReference { .. }))
        ));

        let current = session.scene().unwrap();
        assert!(Arc::ptr_eq(current, &before));
        assert!(session.composition().root.find("world/grey").is_some());
    }

    #[test]
    fn test_unknown_layer() {
        let mut session = Session::new(vec![layer("base", BASE)]);
        assert!(matches!(
            session.toggle_layer("missing"),
            Err(SessionError::UnknownLayer(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_present_hands_over_current_scene() {
        let mut session = Session::new(vec![layer("base", BASE)]);
        let mut renderer = RecordingRenderer::default();

        assert!(!session.present(&mut renderer));

        let scene = session.rebuild().unwrap();
        assert!(session.present(&mut renderer));
        assert_eq!(renderer.presented.len(), 1);
        assert!(Arc::ptr_eq(&renderer.presented[0], &scene));
    }

    #[test]
    fn test_all_layers_disabled() {
        let mut session = Session::new(vec![layer("base", BASE)]);
        assert!(matches!(
            session.toggle_layer("base"),
            Err(SessionError::Build(BuildError::NoEntryPoint))
        ));
        assert!(session.scene().is_none());
        assert_eq!(session.stack().len(), 1);
    }

    /// Helper to get test asset path (works from any working directory)
    fn test_asset_path(relative: &str) -> std::path::PathBuf {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        let workspace_root = Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
        workspace_root.join(relative)
    }

    #[test]
    fn test_sample_manifest() {
        let _ = env_logger::builder().is_test(true).try_init();

        let manifest = test_asset_path("assets/layers/manifest.json");
        let mut session = Session::open_manifest(manifest).unwrap();
        assert!(session.warnings().is_empty());

        let scene = Arc::clone(session.scene().unwrap());
        let world = scene.root.child("World").unwrap();
        let origin = world.matrix().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(0.0, 0.0, 5.0)).length() < 0.001);

        let panel = world.child("Panel").unwrap();
        let colors: Vec<(&str, Vec3)> = panel
            .primitives
            .iter()
            .map(|p| (p.name.as_str(), p.color))
            .collect();
        assert_eq!(
            colors,
            vec![
                ("Lower", Vec3::new(1.0, 0.0, 0.0)),
                ("Upper", Vec3::new(0.0, 0.0, 1.0)),
            ]
        );
        assert_eq!(panel.primitives[1].indices, vec![3, 2, 5, 3, 5, 4]);

        let scene = session.toggle_layer("looks").unwrap();
        let panel = scene.root.find("World/Panel").unwrap();
        assert_eq!(panel.primitives.len(), 1);
        assert_eq!(panel.primitives[0].color, Vec3::splat(0.5));
        assert_eq!(scene.total_triangle_count(), 4);
    }
}
