//! Build script for `syncfuse`.
//!
//! Compresses every file under `gui/` with gzip and generates a static asset
//! table (`assets_gen.rs` in `OUT_DIR`) together with a single build
//! timestamp in HTTP date format. The asset server hands the compressed
//! bytes out as-is to gzip-capable clients and uses the timestamp as the
//! cache-validation token for the whole bundle.

use std::{
    env, fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use eyre::{WrapErr as _, eyre};
use flate2::{Compression, write::GzEncoder};

fn main() -> eyre::Result<()> {
    println!("cargo::rerun-if-changed=gui");

    let out_dir = PathBuf::from(env::var("OUT_DIR").wrap_err("OUT_DIR not set")?);
    let gui_dir = Path::new("gui");

    let mut files = Vec::new();
    collect_files(gui_dir, gui_dir, &mut files)?;
    files.sort();

    let mut table = String::new();
    for (index, (logical, source)) in files.iter().enumerate() {
        let content = fs::read(source)
            .wrap_err_with(|| format!("failed to read asset {}", source.display()))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&content)?;
        let compressed = encoder.finish()?;

        let compressed_path = out_dir.join(format!("asset_{index}.gz"));
        fs::write(&compressed_path, compressed)
            .wrap_err_with(|| format!("failed to write {}", compressed_path.display()))?;

        table.push_str(&format!(
            "    ({logical:?}, include_bytes!({:?})),\n",
            compressed_path.display()
        ));
    }

    let build_date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();

    let generated = format!(
        "/// Shared build timestamp of the embedded asset bundle (HTTP date).\n\
         pub(crate) static BUILD_DATE: &str = {build_date:?};\n\
         \n\
         /// Embedded GUI assets: logical path to gzip-compressed content.\n\
         pub(crate) static ASSETS: &[(&str, &[u8])] = &[\n{table}];\n"
    );
    fs::write(out_dir.join("assets_gen.rs"), generated).wrap_err("failed to write asset table")?;

    Ok(())
}

/// Recursively collects files under `dir`, pairing each with its logical
/// path relative to `root` (forward slashes).
fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>) -> eyre::Result<()> {
    for entry in fs::read_dir(dir).wrap_err_with(|| format!("missing {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, files)?;
        } else {
            let logical = path
                .strip_prefix(root)
                .map_err(|_| eyre!("asset outside bundle root: {}", path.display()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((logical, path));
        }
    }
    Ok(())
}
