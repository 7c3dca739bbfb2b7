use std::fs;
use std::path::Path;

use domain_vector::Document;
use eyre::{Result, WrapErr, eyre};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

fn has_extension(entry: &DirEntry, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    entry
        .path()
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Upload name of `path`: relative to `root`, `/`-separated.
fn upload_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read every text file under `root` whose extension is in `extensions`
/// (all files when empty), in path order. Files that are not UTF-8 are
/// skipped with a warning.
pub fn load_documents(root: &Path, extensions: &[String]) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(eyre!("{} is not a directory", root.display()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e, extensions))
    {
        let path = entry.path();
        let bytes = fs::read(path).wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                let name = upload_name(root, path);
                debug!(file = %name, bytes = text.len(), "Loaded document");
                documents.push(Document::from_upload(name, text));
            }
            Err(_) => warn!(file = %path.display(), "Skipping file that is not valid UTF-8"),
        }
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_documents_filters_and_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("animals")).unwrap();
        fs::write(dir.path().join("animals/cats.TXT"), "Cats purr.").unwrap();
        fs::write(dir.path().join("b.md"), "# Notes").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 159, 146, 150]).unwrap();
        fs::write(dir.path().join("binary.txt"), [0xffu8, 0xfe, 0x00]).unwrap();

        let docs = load_documents(dir.path(), &["txt".to_string(), "md".to_string()]).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(names, vec!["animals/cats.TXT", "b.md"]);
        assert_eq!(docs[0].id, "cats.TXT");
        assert_eq!(docs[0].text, "Cats purr.");
    }

    #[test]
    fn test_empty_extension_list_loads_everything_readable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rst"), "alpha").unwrap();
        fs::write(dir.path().join("b"), "beta").unwrap();

        let docs = load_documents(dir.path(), &[]).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(&dir.path().join("nope"), &[]).is_err());
    }
}
