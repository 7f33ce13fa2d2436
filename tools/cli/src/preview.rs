//! Text detection for object previews.

use std::path::Path;

/// Previews show at most this many bytes.
pub const MAX_PREVIEW_SIZE: usize = 100 * 1024;

/// Bytes inspected when the name alone does not decide.
const BINARY_CHECK_SIZE: usize = 8192;

/// Extension-less names that are conventionally text.
const TEXT_FILENAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "Jenkinsfile",
    "Vagrantfile",
    "Gemfile",
    "Rakefile",
    "Procfile",
    "README",
    "LICENSE",
    "CHANGELOG",
    "AUTHORS",
    "CONTRIBUTORS",
    "COPYING",
    "INSTALL",
    "TODO",
    "NOTICE",
    ".gitignore",
    ".gitattributes",
    ".editorconfig",
    ".dockerignore",
];

/// Extensions the MIME table files under `application/` although they are text.
const TEXT_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "xml", "sh", "bash", "zsh", "fish", "ps1", "sql", "graphql",
    "gql", "proto", "tf", "hcl", "env", "ini", "cfg", "conf", "properties", "log", "rs", "py",
    "rb", "php", "ts", "tsx", "jsx", "js", "vue", "svelte", "kt", "scala", "swift", "go", "lua",
];

/// Classify a file by name: `Some(true)` for text, `Some(false)` for
/// binary, `None` when the content has to decide.
pub fn is_text_by_name(key: &str) -> Option<bool> {
    let name = key.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if TEXT_FILENAMES.contains(&name) {
        return Some(true);
    }

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;
    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return Some(true);
    }

    let mime = mime_guess::from_ext(&extension).first()?;
    Some(mime.type_() == mime_guess::mime::TEXT)
}

/// Content looks like text: no NUL byte and valid UTF-8 in the head.
pub fn is_text_content(content: &[u8]) -> bool {
    let head = &content[..content.len().min(BINARY_CHECK_SIZE)];
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character cut at the end of the head is still text.
        Err(e) => e.error_len().is_none(),
    }
}

/// Whether an object should be previewed as text.
pub fn is_text(key: &str, content: &[u8]) -> bool {
    is_text_by_name(key).unwrap_or_else(|| is_text_content(content))
}

/// Text to show for `content`, and whether it was cut short.
pub fn preview_text(content: &[u8]) -> (String, bool) {
    let truncated = content.len() > MAX_PREVIEW_SIZE;
    let shown = &content[..content.len().min(MAX_PREVIEW_SIZE)];
    (String::from_utf8_lossy(shown).into_owned(), truncated)
}
