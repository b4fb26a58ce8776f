// Packs the challenge directory into the zip that gets uploaded.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to build zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Zip every file under `root` into `out`, skipping ignored directories at
/// any depth, ignored file names, and `out` itself. Entry names are relative
/// to `root` and use `/` separators. Returns the number of files stored.
pub fn create_challenge_zip(
    root: &Path,
    out: &Path,
    ignore_dirs: &[&str],
    ignore_files: &[&str],
) -> Result<usize, ArchiveError> {
    let out_file = File::create(out).map_err(|source| ArchiveError::Io {
        path: out.to_path_buf(),
        source,
    })?;
    // Compare against the real path so `./challenge_config.zip` still matches.
    let out_canonical = out.canonicalize().unwrap_or_else(|_| out.to_path_buf());

    let mut zip = ZipWriter::new(out_file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut stored = 0;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !ignore_dirs.iter().any(|d| e.file_name() == *d)
        });

    for entry in walker {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if ignore_files.iter().any(|f| entry.file_name() == *f) {
            continue;
        }
        let path = entry.path();
        if path.canonicalize().map_or(false, |p| p == out_canonical) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!("adding {} to archive", name);

        zip.start_file(name, options)?;
        let mut src = File::open(path).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        io::copy(&mut src, &mut zip).map_err(|source| ArchiveError::Io {
            path: out.to_path_buf(),
            source,
        })?;
        stored += 1;
    }

    zip.finish()?;
    Ok(stored)
}
