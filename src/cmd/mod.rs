pub mod ms3d;
pub mod three_ds;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::Serialize;

/// Writes `value` as JSON to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create file '{}'", path.display()))?,
    );
    serde_json::to_writer(&mut file, value)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    file.flush()?;
    Ok(())
}
