//! Layer document loading.
//!
//! Layers are JSON documents produced by the USDA converter (or written by
//! hand). Files with a `.usda` extension are converted on load. A layer
//! manifest lists several of them in strength order.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::SceneNode;
use super::usda::{parse_usda, ParseError};

/// Errors that can occur while loading layers.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid layer document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid USDA layer {path}: {source}")]
    Usda {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Layer manifest {0} lists no layers")]
    EmptyManifest(PathBuf),
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// A loaded layer document.
#[derive(Clone, Debug)]
pub struct Layer {
    /// Display name (the file stem unless the manifest says otherwise)
    pub name: String,

    /// Where the document was read from
    pub source: PathBuf,

    pub document: SceneNode,

    /// Whether the layer takes part in composition
    pub enabled: bool,
}

impl Layer {
    /// Wrap an in-memory document.
    pub fn new(name: impl Into<String>, document: SceneNode) -> Self {
        let name = name.into();
        Self {
            source: PathBuf::from(&name),
            name,
            document,
            enabled: true,
        }
    }
}

/// One entry of a layer manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    /// Path to the layer document, relative to the manifest
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl LayerEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            enabled: true,
        }
    }
}

/// A list of layers, weakest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub layers: Vec<LayerEntry>,
}

impl LayerManifest {
    /// Read a manifest and resolve its relative layer paths against the
    /// manifest's directory.
    pub fn open<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let path = path.as_ref();
        let mut manifest: LayerManifest = read_json(path)?;
        if manifest.layers.is_empty() {
            return Err(LoadError::EmptyManifest(path.to_path_buf()));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut manifest.layers {
            if entry.path.is_relative() {
                entry.path = base_dir.join(&entry.path);
            }
        }

        Ok(manifest)
    }

    /// Load every listed layer.
    pub fn load(&self) -> LoadResult<Vec<Layer>> {
        load_layers(&self.layers)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> LoadResult<T> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a layer document, converting USDA text when the file is `.usda`.
fn read_document(path: &Path) -> LoadResult<SceneNode> {
    let is_usda = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("usda"));
    if !is_usda {
        return read_json(path);
    }

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_usda(&content).map_err(|source| LoadError::Usda {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a layer document from a string (useful for testing).
pub fn parse_layer(json: &str) -> Result<SceneNode, serde_json::Error> {
    serde_json::from_str(json)
}

/// Load a single layer document.
pub fn load_layer<P: AsRef<Path>>(path: P) -> LoadResult<Layer> {
    load_entry(&LayerEntry::new(path.as_ref()))
}

fn load_entry(entry: &LayerEntry) -> LoadResult<Layer> {
    let document = read_document(&entry.path)?;
    let name = entry.name.clone().unwrap_or_else(|| {
        entry
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string()
    });

    log::debug!("Loaded layer {} from {}", name, entry.path.display());

    Ok(Layer {
        name,
        source: entry.path.clone(),
        document,
        enabled: entry.enabled,
    })
}

/// Load all layers in parallel.
///
/// Nothing is returned until every document has been read; the first
/// failure fails the whole load. The result keeps the input order.
pub fn load_layers(entries: &[LayerEntry]) -> LoadResult<Vec<Layer>> {
    let layers = entries
        .par_iter()
        .map(load_entry)
        .collect::<LoadResult<Vec<_>>>()?;

    log::info!("Loaded {} layers", layers.len());
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::compose;
    use crate::layer::node::NodeType;
    use crate::scene::assemble_scene;
    use strata_math::Vec3;

    /// Helper to get test asset path (works from any working directory)
    fn test_asset_path(relative: &str) -> PathBuf {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        let crate_root = Path::new(&manifest_dir);
        // Go up to workspace root
        let workspace_root = crate_root.parent().unwrap().parent().unwrap();
        workspace_root.join(relative)
    }

    #[test]
    fn test_load_single_layer() {
        let layer = load_layer(test_asset_path("assets/layers/base.json")).unwrap();

        assert_eq!(layer.name, "base");
        assert!(layer.enabled);
        let world = layer.document.child("World").unwrap();
        assert_eq!(world.node_type, NodeType::Xform);
    }

    #[test]
    fn test_load_manifest_keeps_order() {
        let _ = env_logger::builder().is_test(true).try_init();

        let manifest = LayerManifest::open(test_asset_path("assets/layers/manifest.json")).unwrap();
        let layers = manifest.load().unwrap();

        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "looks", "placement"]);
        assert!(layers.iter().all(|l| l.source.exists()));
    }

    #[test]
    fn test_missing_file_fails_whole_load() {
        let entries = vec![
            LayerEntry::new(test_asset_path("assets/layers/base.json")),
            LayerEntry::new(test_asset_path("assets/layers/does_not_exist.json")),
        ];

        match load_layers(&entries) {
            Err(LoadError::Io { path, .. }) => assert!(path.ends_with("does_not_exist.json")),
            other => panic!("Expected IO error, got {:?}", other.map(|l| l.len())),
        }
    }

    #[test]
    fn test_manifest_defaults() {
        let json = r#"{"layers": [
            {"path": "a.json"},
            {"path": "b.json", "enabled": false, "name": "B"}
        ]}"#;
        let manifest: LayerManifest = serde_json::from_str(json).unwrap();

        assert!(manifest.layers[0].enabled);
        assert_eq!(manifest.layers[0].name, None);
        assert!(!manifest.layers[1].enabled);
        assert_eq!(manifest.layers[1].name.as_deref(), Some("B"));
    }

    #[test]
    fn test_parse_layer_rejects_bad_shape() {
        let json = r#"{"children": [
            {"name": "Box", "attributes": {"faceVertexIndices": [-1]}}
        ]}"#;
        assert!(parse_layer(json).is_err());
    }

    #[test]
    fn test_usda_layer_matches_json_layer() {
        let usda = load_layer(test_asset_path("assets/layers/base.usda")).unwrap();
        let json = load_layer(test_asset_path("assets/layers/base.json")).unwrap();

        assert_eq!(usda.name, "base");
        assert_eq!(usda.document, json.document);
    }

    #[test]
    fn test_usda_layer_composes_with_json_overrides() {
        let entries = vec![
            LayerEntry::new(test_asset_path("assets/layers/base.usda")),
            LayerEntry::new(test_asset_path("assets/layers/looks.json")),
        ];
        let layers = load_layers(&entries).unwrap();
        let composition = compose(layers.iter().map(|l| &l.document));
        assert!(composition.warnings.is_empty());

        let scene = assemble_scene(&composition.root).unwrap();
        let panel = scene.root.find("World/Panel").unwrap();
        let colors: Vec<Vec3> = panel.primitives.iter().map(|p| p.color).collect();
        assert_eq!(colors, vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)]);
    }

    #[test]
    fn test_bad_usda_reports_path() {
        let dir = std::env::temp_dir().join("strata_loader_bad_usda");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.usda");
        fs::write(&path, "def Xform \"World\" {\n").unwrap();

        match load_layer(&path) {
            Err(LoadError::Usda { path: failed, source }) => {
                assert_eq!(failed, path);
                assert!(matches!(source, ParseError::UnclosedBlock(1)));
            }
            other => panic!("Expected USDA error, got {:?}", other.map(|l| l.name)),
        }
    }
}
