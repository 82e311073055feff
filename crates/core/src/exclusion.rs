//! Pure path predicate deciding whether a candidate path is eligible for
//! crawling and indexing. Holds no I/O handle and performs no filesystem
//! access of its own.

use std::path::Path;

const EXCLUDED_DIR_NAMES: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    "env",
    "__pycache__",
    ".vscode",
    ".idea",
    "dist",
    "build",
    "out",
    "target",
    ".next",
    ".nuxt",
    ".cache",
    ".temp",
    ".tmp",
    "vendor",
    "packages",
    "bower_components",
];

const EXCLUDED_FILE_NAMES: &[&str] = &[
    "desktop.ini",
    "thumbs.db",
    "Thumbs.db",
    "ehthumbs.db",
    ".DS_Store",
    ".gitignore",
    ".gitattributes",
];

const EXCLUDED_FILENAME_PREFIXES: &[&str] = &["~$", "~WRL"];

const EXCLUDED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "msi", "sys", "com", "zip", "tar", "gz", "7z", "rar",
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "webp", "mp3", "mp4", "wav", "avi", "mov",
    "mkv", "flv", "iso", "dmg", "ttf", "otf", "woff", "woff2", "eot",
];

pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "md", "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "h", "cs", "json",
    "xml", "html", "css", "sql", "sh", "bat", "ps1", "yaml", "yml",
];

pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "docx", "doc", "pptx", "ppt", "xlsx", "xls", "csv", "pdf", "hwp",
];

/// OS-specific absolute path prefixes that are always excluded.
#[cfg(windows)]
const EXCLUDED_PATH_PREFIXES: &[&str] = &[
    "C:\\Windows",
    "C:\\$Recycle.Bin",
    "C:\\System Volume Information",
    "C:\\pagefile.sys",
    "C:\\hiberfil.sys",
];

#[cfg(not(windows))]
const EXCLUDED_PATH_PREFIXES: &[&str] = &["/proc", "/sys", "/dev"];

pub struct ExclusionFilter {
    user_globs: Vec<CaseInsensitiveGlob>,
}

impl ExclusionFilter {
    pub fn new(user_glob_patterns: &[String]) -> Self {
        Self {
            user_globs: user_glob_patterns
                .iter()
                .map(|p| CaseInsensitiveGlob::compile(p))
                .collect(),
        }
    }

    /// True if `path` should be crawled/indexed; false if any exclusion
    /// rule fires. Any single firing rule excludes the path — there is no
    /// override mechanism.
    pub fn include(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        if EXCLUDED_PATH_PREFIXES
            .iter()
            .any(|prefix| path_str.starts_with(prefix))
        {
            return false;
        }

        if let Some(parent) = path.parent() {
            for ancestor in parent.ancestors() {
                if let Some(name) = ancestor.file_name().and_then(|n| n.to_str()) {
                    if EXCLUDED_DIR_NAMES
                        .iter()
                        .any(|excluded| excluded.eq_ignore_ascii_case(name))
                    {
                        return false;
                    }
                }
            }
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };

        if EXCLUDED_FILE_NAMES.iter().any(|n| *n == file_name) {
            return false;
        }

        if EXCLUDED_FILENAME_PREFIXES
            .iter()
            .any(|prefix| file_name.starts_with(prefix))
        {
            return false;
        }

        if !is_valid_name(file_name) {
            return false;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if EXCLUDED_EXTENSIONS.iter().any(|e| *e == ext) {
            return false;
        }

        if self.user_globs.iter().any(|g| g.matches(&path_str)) {
            return false;
        }

        let is_supported = TEXT_EXTENSIONS.iter().any(|e| *e == ext)
            || DOCUMENT_EXTENSIONS.iter().any(|e| *e == ext);
        if !is_supported {
            return false;
        }

        true
    }

    /// Directory-level check used by the Crawler to prune an entire subtree
    /// without descending into it.
    pub fn include_dir(&self, dir_name: &str) -> bool {
        !EXCLUDED_DIR_NAMES
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(dir_name))
    }
}

/// First character must be alphanumeric or lie in a CJK Unicode range;
/// rejects dotfiles and control-prefixed names.
fn is_valid_name(name: &str) -> bool {
    match name.chars().next() {
        Some(c) => c.is_alphanumeric() || is_cjk(c),
        None => false,
    }
}

fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp) // CJK Unified Ideographs
        || (0x3040..=0x30FF).contains(&cp) // Hiragana/Katakana
        || (0xAC00..=0xD7A3).contains(&cp) // Hangul syllables
        || (0x3400..=0x4DBF).contains(&cp) // CJK Extension A
}

/// A compiled case-insensitive glob supporting `*` (any run of characters)
/// and `?` (any single character), translated to a regex once at construction.
struct CaseInsensitiveGlob {
    regex: regex::Regex,
}

impl CaseInsensitiveGlob {
    fn compile(pattern: &str) -> Self {
        let mut translated = String::with_capacity(pattern.len() * 2 + 8);
        translated.push('(');
        translated.push('?');
        translated.push('i');
        translated.push(')');
        translated.push('^');
        const REGEX_METACHARS: &str = r"\.+^$()[]{}|";
        for c in pattern.chars() {
            match c {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                _ if REGEX_METACHARS.contains(c) => {
                    translated.push('\\');
                    translated.push(c);
                }
                _ => translated.push(c),
            }
        }
        translated.push('$');
        let regex = regex::Regex::new(&translated)
            .unwrap_or_else(|_| regex::Regex::new("$.^").expect("unreachable pattern is valid"));
        Self { regex }
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn filter() -> ExclusionFilter {
        ExclusionFilter::new(&[])
    }

    #[test]
    fn allows_plain_text_file() {
        assert!(filter().include(&PathBuf::from("/home/user/docs/notes.txt")));
    }

    #[test]
    fn excludes_node_modules_subtree() {
        assert!(!filter().include(&PathBuf::from(
            "/home/user/project/node_modules/pkg/index.js"
        )));
    }

    #[test]
    fn excludes_known_filenames() {
        assert!(!filter().include(&PathBuf::from("/home/user/Thumbs.db")));
    }

    #[test]
    fn excludes_office_transient_prefix() {
        assert!(!filter().include(&PathBuf::from("/home/user/~$report.docx")));
    }

    #[test]
    fn excludes_unsupported_extension() {
        assert!(!filter().include(&PathBuf::from("/home/user/photo.jpg")));
    }

    #[test]
    fn excludes_dotfile_by_valid_name_check() {
        assert!(!filter().include(&PathBuf::from("/home/user/.bashrc.txt")));
    }

    #[test]
    fn allows_cjk_named_file() {
        assert!(filter().include(&PathBuf::from("/home/user/\u{bb38}\u{c11c}.txt")));
    }

    #[test]
    fn user_glob_excludes_match_case_insensitively() {
        let f = ExclusionFilter::new(&["*SECRET*".to_string()]);
        assert!(!f.include(&PathBuf::from("/home/user/my-secret-notes.txt")));
    }

    #[test]
    fn include_dir_prunes_excluded_basenames() {
        let f = filter();
        assert!(!f.include_dir(".git"));
        assert!(!f.include_dir("Node_Modules"));
        assert!(f.include_dir("src"));
    }
}
