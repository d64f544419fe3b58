//! Whole-file replacement through a sibling temp file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

/// Replace `path` with `contents` so readers see either the old or the new file.
///
/// The temp file is `<name>.tmp` next to the target, so a directory watcher
/// can tell it apart from the real document. Missing parent directories are
/// created.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let staged = staging_path(path)?;
    fs::write(&staged, contents).with_context(|| format!("stage {}", staged.display()))?;
    if let Err(err) = fs::rename(&staged, path) {
        let _ = fs::remove_file(&staged);
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    Ok(())
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("no file name in {}", path.display()))?;
    let mut staged = name.to_os_string();
    staged.push(".tmp");
    Ok(path.with_file_name(staged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_file_and_leaves_no_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("doc.json");

        write_atomic(&path, "one").expect("first write");
        write_atomic(&path, "two").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        let names: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc.json")]);
    }

    #[test]
    fn temp_file_keeps_full_name() {
        let staged = staging_path(Path::new("out/report.csv")).expect("staging");
        assert_eq!(staged, Path::new("out/report.csv.tmp"));
        assert!(staging_path(Path::new("/")).is_err());
    }
}
