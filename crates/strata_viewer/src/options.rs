//! Command-line options.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const USAGE: &str = "\
Usage: strata_viewer [OPTIONS] [LAYER.json|LAYER.usda]...

Layers are composed weakest first, in the order given.

Options:
  -m, --manifest PATH   Load layers from a layer manifest
  -d, --disable NAME    Start with the named layer disabled (repeatable)
  -t, --toggle NAME     Toggle the named layer after the first build and
                        rebuild (repeatable, applied in order)
      --dump PATH       Write the composed tree as JSON
  -h, --help            Show this help";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
pub struct Options {
    pub manifest: Option<PathBuf>,
    pub layers: Vec<PathBuf>,
    pub disabled: Vec<String>,
    pub toggles: Vec<String>,
    pub dump: Option<PathBuf>,
    pub help: bool,
}

impl Options {
    /// Parse arguments (without the program name).
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Options::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{} expects a value", flag))
            };

            match arg.as_str() {
                "-h" | "--help" => options.help = true,
                "-m" | "--manifest" => options.manifest = Some(PathBuf::from(value(&arg)?)),
                "-d" | "--disable" => options.disabled.push(value(&arg)?),
                "-t" | "--toggle" => options.toggles.push(value(&arg)?),
                "--dump" => options.dump = Some(PathBuf::from(value(&arg)?)),
                flag if flag.starts_with('-') => bail!("Unknown option {}", flag),
                path => options.layers.push(PathBuf::from(path)),
            }
        }

        if !options.help && options.manifest.is_none() && options.layers.is_empty() {
            bail!("No layers given");
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        Options::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_layers_and_flags() {
        let args = ["base.json", "-d", "looks", "looks.json", "--dump", "out.json"];
        let options = parse(&args).unwrap();

        assert_eq!(options.layers, vec![PathBuf::from("base.json"), PathBuf::from("looks.json")]);
        assert_eq!(options.disabled, vec!["looks".to_string()]);
        assert_eq!(options.dump, Some(PathBuf::from("out.json")));
        assert!(options.manifest.is_none());
    }

    #[test]
    fn test_parse_manifest_with_toggles() {
        let options = parse(&["-m", "layers/manifest.json", "-t", "looks", "-t", "looks"]).unwrap();

        assert_eq!(options.manifest, Some(PathBuf::from("layers/manifest.json")));
        assert_eq!(options.toggles.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--disable"]).is_err());
        assert!(parse(&["--bogus", "a.json"]).is_err());
        assert!(parse(&["--help"]).unwrap().help);
    }
}
