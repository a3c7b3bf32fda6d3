use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{EngineKind, RunConfig};

/// Write a starting configuration for `engine` to `output`, or to stdout.
pub fn write_template(engine: EngineKind, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&RunConfig::template(engine))?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Configuration written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
