// Convert a USDA layer into the JSON layer format
// Run with: cargo run --bin usda2json -- <input.usda> [output.json]

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use strata_core::layer::usda_to_json;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        let program = args.first().map_or("usda2json", String::as_str);
        bail!("Usage: {} <input.usda> [output.json]", program);
    }

    let input = PathBuf::from(&args[1]);
    let content = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let document = usda_to_json(&content)
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    match args.get(2) {
        Some(output) => {
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writeln!(writer)?;
            log::info!("Wrote {}", output);
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &document)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
