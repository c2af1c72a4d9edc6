//! Path helpers: tool resolution, file-name sanitizing, recording discovery.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Strip characters that are unsafe in file names, keeping alphanumerics,
/// dash, underscore and dot. Whitespace becomes underscores.
pub fn sanitize_stem(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else if c.is_whitespace() {
                '_'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect();
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned
    }
}

/// Locate an external tool binary. A bare name is first looked up in a
/// `tools/` directory beside the executable, then left to PATH resolution.
pub fn resolve_tool(name: &str) -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join("tools").join(tool_file_name(name));
            if bundled.exists() {
                return bundled;
            }
        }
    }
    PathBuf::from(name)
}

fn tool_file_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Most recently modified file under `dir` whose extension is in
/// `extensions` (entries like ".mp4").
pub fn newest_with_extension(dir: &Path, extensions: &[String]) -> Option<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches_ext = path
            .extension()
            .map(|e| {
                let dotted = format!(".{}", e.to_string_lossy().to_lowercase());
                extensions.iter().any(|x| x.to_lowercase() == dotted)
            })
            .unwrap_or(false);
        if !matches_ext {
            continue;
        }
        let mtime = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match &newest {
            Some((best, _)) if *best >= mtime => {}
            _ => newest = Some((mtime, path.to_path_buf())),
        }
    }
    newest.map(|(_, p)| p)
}
