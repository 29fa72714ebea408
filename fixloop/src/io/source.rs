//! Reading the source/test artifacts and replacing the source atomically.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Read a whole artifact as UTF-8 text.
pub fn read_artifact(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Replace the file at `path` with `contents` (temp file + rename).
///
/// Symlinks are followed, so the link stays in place and its target is
/// replaced. The temp file sits next to that target so the rename never
/// crosses a filesystem boundary, and it takes the target's permissions.
/// Readers see either the old or the new contents.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let target = resolve_target(path)?;
    let tmp_path = sibling_path(&target, "fixloop-tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;

    let replaced = copy_permissions(&target, &tmp_path).and_then(|()| {
        fs::rename(&tmp_path, &target)
            .with_context(|| format!("replace {}", target.display()))
    });
    if let Err(err) = replaced {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    debug!(path = %target.display(), bytes = contents.len(), "source replaced");
    Ok(())
}

/// Final path behind any symlinks; `path` itself when it does not exist yet.
fn resolve_target(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(err) => Err(err).with_context(|| format!("resolve {}", path.display())),
    }
}

fn copy_permissions(from: &Path, to: &Path) -> Result<()> {
    let permissions = match fs::metadata(from) {
        Ok(metadata) => metadata.permissions(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("stat {}", from.display())),
    };
    fs::set_permissions(to, permissions)
        .with_context(|| format!("set permissions on {}", to.display()))
}

/// Hidden path next to `path` that keeps its extension.
///
/// `src/foo.ts` with tag `candidate` becomes `src/.foo.candidate.ts`, so
/// language tooling still recognizes the file type.
pub fn sibling_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = OsString::from(format!(".{stem}.{tag}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}
