use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use anyhow::{Context, Result};
use strata_core::layer::{load_layers, LayerEntry, LayerManifest};
use strata_core::{Renderer, SceneGraph, Session};

mod options;

use options::{Options, USAGE};

/// Renderer stand-in that prints the scene it is handed.
#[derive(Default)]
struct TextRenderer {
    frames: usize,
}

impl Renderer for TextRenderer {
    fn present(&mut self, scene: Arc<SceneGraph>) {
        self.frames += 1;
        println!("\n=== Scene #{} ===", self.frames);
        println!("Objects: {}", scene.object_count());
        println!("Primitives: {}", scene.primitive_count());
        println!("Total triangles: {}", scene.total_triangle_count());

        println!("\n--- Hierarchy ---");
        scene.walk(|object, world, depth| {
            if depth == 0 {
                return;
            }
            let pos = world.transform_point3(strata_math::Vec3::ZERO);
            println!(
                "{}{} [{:?}] at ({:.2}, {:.2}, {:.2})",
                "  ".repeat(depth),
                object.name,
                object.kind,
                pos.x,
                pos.y,
                pos.z
            );
            for primitive in &object.primitives {
                println!(
                    "{}  - {}: {} triangles, color ({:.2}, {:.2}, {:.2})",
                    "  ".repeat(depth),
                    primitive.name,
                    primitive.triangle_count(),
                    primitive.color.x,
                    primitive.color.y,
                    primitive.color.z
                );
            }
        });

        let bounds = scene.world_bounds();
        if !bounds.is_empty() {
            println!("\n--- World Bounds ---");
            println!("  Min: ({:.2}, {:.2}, {:.2})", bounds.min.x, bounds.min.y, bounds.min.z);
            println!("  Max: ({:.2}, {:.2}, {:.2})", bounds.max.x, bounds.max.y, bounds.max.z);
        }
    }
}

fn open_session(options: &Options) -> Result<Session> {
    let mut entries = match &options.manifest {
        Some(path) => {
            LayerManifest::open(path)
                .with_context(|| format!("Failed to read manifest {}", path.display()))?
                .layers
        }
        None => Vec::new(),
    };
    entries.extend(options.layers.iter().map(LayerEntry::new));

    let layers = load_layers(&entries).context("Failed to load layers")?;
    let mut session = Session::new(layers);
    for name in &options.disabled {
        session
            .stack_mut()
            .set_enabled(name, false)
            .with_context(|| format!("Cannot disable layer {}", name))?;
    }

    for layer in session.stack().layers() {
        log::info!(
            "Layer {} ({}) {}",
            layer.name,
            layer.source.display(),
            if layer.enabled { "enabled" } else { "disabled" }
        );
    }

    Ok(session)
}

fn report_warnings(session: &Session) {
    for warning in session.warnings() {
        log::warn!("{}", warning);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let options = Options::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{}", USAGE);
        e
    })?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut session = open_session(&options)?;
    let mut renderer = TextRenderer::default();

    session.rebuild().context("Failed to build scene")?;
    report_warnings(&session);
    session.present(&mut renderer);

    for name in &options.toggles {
        session
            .toggle_layer(name)
            .with_context(|| format!("Failed to rebuild after toggling {}", name))?;
        report_warnings(&session);
        session.present(&mut renderer);
    }

    if let Some(path) = &options.dump {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &session.composition().root)
            .context("Failed to write composed tree")?;
        println!("\nComposed tree written to {}", path.display());
    }

    Ok(())
}
