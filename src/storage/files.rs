//! JSON file helpers shared by the index and the shard files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` and replace the file at `path`.
///
/// The bytes go to a sibling temp file first and are renamed over the target,
/// so a crash leaves either the old or the new contents, never a torn file.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}
