pub mod log;
use std::path::{Component, Path};

use sugar_path::SugarPath;

mod hooks;
pub use hooks::*;

/// `<root>/src/lazy.js` -> `src_lazy_js`.
pub fn uri_to_chunk_name(root: &Path, uri: &str) -> String {
    let path = Path::new(uri);
    let mut relatived = if path.is_absolute() {
        path.relative(root)
    } else {
        path.to_path_buf()
    };
    let ext = relatived
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_string();
    relatived.set_extension("");
    let mut name = relatived
        .components()
        .filter(|com| matches!(com, Component::Normal(_)))
        .filter_map(|seg| seg.as_os_str().to_str())
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("_");
    if !ext.is_empty() {
        name.push('_');
        name.push_str(&ext);
    }
    name
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
