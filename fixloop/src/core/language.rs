//! Source-language detection for code fences.

use std::path::Path;

/// Fence tag used when the source extension is not recognized.
pub const DEFAULT_FENCE_TAG: &str = "typescript";

/// Return the code-fence tag for a source file, based on its extension.
pub fn fence_tag_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ts" | "tsx" | "mts" | "cts") => "typescript",
        Some("js" | "jsx" | "mjs" | "cjs") => "javascript",
        Some("py") => "python",
        Some("rs") => "rust",
        Some("go") => "go",
        _ => DEFAULT_FENCE_TAG,
    }
}
