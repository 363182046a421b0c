use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::augment::AugmentOptions;
use crate::error::{Error, Result};
use crate::injector;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub modified: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn enhance_dir(doc_dir: &Path, options: &AugmentOptions) -> Result<Summary> {
    process_dir(doc_dir, Mode::Enhance(options))
}

pub fn revert_dir(doc_dir: &Path) -> Result<Summary> {
    process_dir(doc_dir, Mode::Revert)
}

enum Mode<'a> {
    Enhance(&'a AugmentOptions),
    Revert,
}

fn process_dir(doc_dir: &Path, mode: Mode<'_>) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut stack: Vec<PathBuf> = vec![doc_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;

            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_symlink() && path.is_dir() {
                debug!("not following directory link {}", path.display());
                continue;
            }

            if path.extension() != Some(OsStr::new("html")) {
                continue;
            }
            if injector::should_skip_file(&path) {
                summary.skipped += 1;
                continue;
            }

            let page_path = page_path(doc_dir, &path);
            match process_html_file(&path, &page_path, &mode) {
                Ok(true) => {
                    debug!("updated {page_path}");
                    summary.modified += 1;
                }
                Ok(false) => summary.skipped += 1,
                Err(err) => {
                    warn!("failed to process {}: {err}", path.display());
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}

fn process_html_file(path: &Path, page_path: &str, mode: &Mode<'_>) -> Result<bool> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let updated = match mode {
        Mode::Enhance(options) => injector::inject(&content, page_path, options),
        Mode::Revert => injector::revert(&content),
    };

    match updated {
        Some(modified) => {
            fs::write(path, modified).map_err(|e| Error::io(path, e))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// URL path a file is served under when `root` is the site root, e.g.
/// `/guide/setup.html`.
pub fn page_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TOC_PAGE: &str = "<html><head></head><body><div id=\"toc\"><div id=\"toctitle\">Contents</div>\
        <ul class=\"sectlevel1\"></ul></div><div id=\"content\"></div></body></html>";

    #[test]
    fn page_path_is_relative_to_root() {
        let root = Path::new("/srv/docs");
        assert_eq!(page_path(root, Path::new("/srv/docs/guide/setup.html")), "/guide/setup.html");
        assert_eq!(page_path(root, Path::new("/srv/docs/index.html")), "/index.html");
        assert_eq!(page_path(root, root), "/");
    }

    #[test]
    fn enhances_and_reverts_a_tree() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("guide")).expect("mkdir");
        fs::write(root.join("index.html"), TOC_PAGE).expect("write");
        fs::write(root.join("guide/setup.html"), TOC_PAGE).expect("write");
        fs::write(root.join("search.html"), TOC_PAGE).expect("write");
        fs::write(root.join("site.css"), "body {}").expect("write");

        let summary = enhance_dir(root, &AugmentOptions::default()).expect("enhance");
        assert_eq!(
            summary,
            Summary {
                modified: 2,
                skipped: 1,
                failed: 0
            }
        );

        let index = fs::read_to_string(root.join("index.html")).expect("read");
        let setup = fs::read_to_string(root.join("guide/setup.html")).expect("read");
        assert!(index.contains("header-spring"));
        assert!(!index.contains("back-action"));
        assert!(setup.contains("back-action"));
        assert_eq!(fs::read_to_string(root.join("search.html")).expect("read"), TOC_PAGE);

        let again = enhance_dir(root, &AugmentOptions::default()).expect("enhance");
        assert_eq!(again.modified, 0);

        let reverted = revert_dir(root).expect("revert");
        assert_eq!(reverted.modified, 2);
        assert_eq!(fs::read_to_string(root.join("guide/setup.html")).expect("read"), TOC_PAGE);
    }

    #[cfg(unix)]
    #[test]
    fn directory_links_are_not_followed() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("guide")).expect("mkdir");
        fs::write(root.join("guide/setup.html"), TOC_PAGE).expect("write");
        std::os::unix::fs::symlink(root, root.join("guide/loop")).expect("symlink");

        let summary = enhance_dir(root, &AugmentOptions::default()).expect("enhance");
        assert_eq!(summary.modified, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn unreadable_root_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(matches!(revert_dir(&missing), Err(Error::Io { .. })));
    }
}
