//! Atomic file publication
//!
//! Every file phasegate publishes (run summaries, promoted phase artifacts)
//! becomes visible in a single step: content is written to a temporary file
//! in the destination directory, fsynced, then renamed over the target.
//! Readers therefore observe either the previous file or the complete new one.
//!
//! When the rename crosses filesystems (EXDEV), the content is copied into a
//! fresh temporary file next to the target and renamed from there.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Outcome of an atomic publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicWriteResult {
    /// Bytes made visible at the target path
    pub bytes_written: u64,
    /// Whether the cross-filesystem copy path was taken
    pub used_cross_filesystem_fallback: bool,
    pub warnings: Vec<String>,
}

/// Atomically write UTF-8 text, normalizing line endings to LF.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    write_bytes_atomic(path, normalized.as_bytes())
}

/// Atomically write raw bytes to `path`, creating the parent directory if needed.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult {
        bytes_written: content.len() as u64,
        ..AtomicWriteResult::default()
    };

    let parent = parent_dir(path);
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;
    temp_file
        .write_all(content)
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    let temp_path = temp_file.path().to_path_buf();
    match temp_file.persist(path.as_std_path()) {
        Ok(_) => {}
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            // Keep the temp file alive until the copy finished.
            let _keep = e.file;
            copy_into_place(&temp_path, path)?;
        }
        Err(e) => {
            return Err(anyhow::anyhow!(e.error))
                .with_context(|| format!("Failed to atomically write file: {path}"));
        }
    }

    Ok(result)
}

/// Promote an already-written file (e.g. a task's staging output) onto `target`.
///
/// The source is fsynced before the rename so the promoted file is durable.
/// On EXDEV the content is copied through a temporary file beside the target
/// and the source is removed afterwards.
pub fn promote_file_atomic(source: &Utf8Path, target: &Utf8Path) -> Result<AtomicWriteResult> {
    let file = fs::File::open(source.as_std_path())
        .with_context(|| format!("Failed to open staged file: {source}"))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync staged file: {source}"))?;
    let bytes_written = file.metadata().map(|m| m.len()).unwrap_or_default();
    drop(file);

    let mut result = AtomicWriteResult {
        bytes_written,
        ..AtomicWriteResult::default()
    };

    match fs::rename(source.as_std_path(), target.as_std_path()) {
        Ok(()) => {}
        Err(e) if is_cross_filesystem_error(&e) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            copy_into_place(source.as_std_path(), target)?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to promote {source} to {target}"));
        }
    }

    Ok(result)
}

fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    // EXDEV on Linux/macOS
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_filesystem_error(_err: &std::io::Error) -> bool {
    false
}

fn copy_into_place(source: &Path, target: &Utf8Path) -> Result<()> {
    let content =
        fs::read(source).context("Failed to read source file for cross-filesystem copy")?;

    let target_dir = parent_dir(target);
    let mut target_temp = NamedTempFile::new_in(target_dir)
        .with_context(|| format!("Failed to create temp file in target directory: {target_dir}"))?;
    target_temp
        .write_all(&content)
        .context("Failed to write content during cross-filesystem copy")?;
    target_temp
        .as_file()
        .sync_all()
        .context("Failed to fsync during cross-filesystem copy")?;
    target_temp
        .persist(target.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .context("Failed to persist during cross-filesystem copy")?;

    let _ = fs::remove_file(source);
    Ok(())
}

/// Read a text file, tolerating CRLF line endings.
pub fn read_file_with_crlf_tolerance(path: &Utf8Path) -> Result<String> {
    let content = fs::read_to_string(path.as_std_path())
        .with_context(|| format!("Failed to read file: {path}"))?;
    Ok(normalize_line_endings(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8_dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_write_creates_parent_and_content() {
        let temp = TempDir::new().unwrap();
        let path = utf8_dir(&temp).join("nested/dir/summary.json");

        let result = write_file_atomic(&path, "{\"a\":1}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert_eq!(result.bytes_written, 7);
        assert!(!result.used_cross_filesystem_fallback);
    }

    #[test]
    fn test_write_normalizes_line_endings() {
        let temp = TempDir::new().unwrap();
        let path = utf8_dir(&temp).join("report.md");

        write_file_atomic(&path, "line1\r\nline2\rline3\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "line1\nline2\nline3\n");
    }

    #[test]
    fn test_overwrite_replaces_whole_file() {
        let temp = TempDir::new().unwrap();
        let path = utf8_dir(&temp).join("out.json");

        write_file_atomic(&path, "a much longer first version").unwrap();
        write_file_atomic(&path, "short").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        write_bytes_atomic(&dir.join("x.bin"), &[1, 2, 3]).unwrap();

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_promote_moves_staged_file() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let staged = dir.join("ACME_20250101_analysis.json.tmp");
        let target = dir.join("ACME_20250101_analysis.json");
        fs::write(&staged, "{\"ok\":true}").unwrap();

        let result = promote_file_atomic(&staged, &target).unwrap();

        assert!(!staged.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"ok\":true}");
        assert_eq!(result.bytes_written, 11);
    }

    #[test]
    fn test_promote_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let err = promote_file_atomic(&dir.join("missing.tmp"), &dir.join("target")).unwrap_err();
        assert!(err.to_string().contains("missing.tmp"));
    }

    #[test]
    fn test_read_with_crlf_tolerance() {
        let temp = TempDir::new().unwrap();
        let path = utf8_dir(&temp).join("crlf.md");
        fs::write(&path, "a\r\nb\r\n").unwrap();

        assert_eq!(read_file_with_crlf_tolerance(&path).unwrap(), "a\nb\n");
    }
}
