//! Access to input and classpath archives.
//!
//! An archive is a jar/zip file, a directory tree of `.class` files, or a single
//! `.class` file. Jars are memory mapped and read through `zip`.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use memmap2::Mmap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Fingerprint of an input archive, so match state can be reattached to the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFile {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

impl InputFile {
    pub fn fingerprint(path: &Path) -> Result<Self> {
        let mut hasher = Sha256::new();
        let size = if path.is_dir() {
            let mut size = 0u64;
            for (name, bytes) in read_class_entries(path)? {
                hasher.update(name.as_bytes());
                hasher.update(&bytes);
                size += bytes.len() as u64;
            }
            size
        } else {
            let mut file =
                File::open(path).with_context(|| format!("Failed to open input: {}", path.display()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .with_context(|| format!("Failed to read input: {}", path.display()))?;
            hasher.update(&buf);
            buf.len() as u64
        };

        Ok(Self {
            path: path.to_path_buf(),
            size,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Where a lazily indexed class lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLocation {
    pub archive: PathBuf,
    pub entry: String,
}

/// Reads every `.class` entry of an archive, in a stable (sorted) order.
pub fn read_class_entries(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    if !path.exists() {
        anyhow::bail!("Input does not exist: {}", path.display());
    }

    if path.is_dir() {
        let mut out = Vec::new();
        for file in walk_class_files(path) {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read class file: {}", file.display()))?;
            out.push((relative_entry(path, &file), bytes));
        }
        return Ok(out);
    }

    if is_class_file(path) {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read class file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![(name, bytes)]);
    }

    let mmap = map_file(path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;

    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !name.ends_with(".class") || entry.is_dir() {
            continue;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read {name} from {}", path.display()))?;
        out.push((name, buf));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Lists the internal class names an archive provides without reading bodies.
pub fn index_class_names(path: &Path) -> Result<Vec<(String, ClassLocation)>> {
    if !path.exists() {
        anyhow::bail!("Classpath entry does not exist: {}", path.display());
    }

    let mut out = Vec::new();
    if path.is_dir() {
        for file in walk_class_files(path) {
            let entry = relative_entry(path, &file);
            out.push((
                entry.trim_end_matches(".class").to_string(),
                ClassLocation {
                    archive: path.to_path_buf(),
                    entry,
                },
            ));
        }
        return Ok(out);
    }

    let mmap = map_file(path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name();
        if !name.ends_with(".class") || name.ends_with("module-info.class") {
            continue;
        }
        out.push((
            name.trim_end_matches(".class").to_string(),
            ClassLocation {
                archive: path.to_path_buf(),
                entry: name.to_string(),
            },
        ));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Reads one class body located by [`index_class_names`].
pub fn read_entry(location: &ClassLocation) -> Result<Vec<u8>> {
    let path = location.archive.as_path();
    if path.is_dir() {
        let file = path.join(&location.entry);
        return std::fs::read(&file)
            .with_context(|| format!("Failed to read class file: {}", file.display()));
    }

    let mmap = map_file(path)?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;
    let mut entry = archive
        .by_name(&location.entry)
        .with_context(|| format!("Missing {} in {}", location.entry, path.display()))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file =
        File::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))?;
    // SAFETY: The file is opened read-only and outlives every borrow of the map.
    unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to mmap: {}", path.display()))
}

fn walk_class_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|p| p.is_file() && is_class_file(p))
        .collect();
    files.sort();
    files
}

fn relative_entry(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_class_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "class")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use zip::write::{FileOptions, ZipWriter};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "class_matcher_archive_{}_{}_{}",
            std::process::id(),
            n,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default())?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn jar_entries_are_sorted_and_filtered() -> Result<()> {
        let jar = temp_path("entries.jar");
        write_jar(
            &jar,
            &[
                ("b/B.class", b"bb"),
                ("META-INF/MANIFEST.MF", b""),
                ("a/A.class", b"a"),
            ],
        )?;

        let entries = read_class_entries(&jar)?;
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a/A.class", "b/B.class"]);
        assert_eq!(entries[1].1, b"bb".to_vec());

        let index = index_class_names(&jar)?;
        assert_eq!(index[0].0, "a/A");
        assert_eq!(read_entry(&index[1].1)?, b"bb".to_vec());

        std::fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn directory_archives_use_relative_entries() -> Result<()> {
        let dir = temp_path("classes");
        std::fs::create_dir_all(dir.join("pkg"))?;
        std::fs::write(dir.join("pkg/C.class"), b"c")?;
        std::fs::write(dir.join("notes.txt"), b"x")?;

        let index = index_class_names(&dir)?;
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].0, "pkg/C");
        assert_eq!(read_entry(&index[0].1)?, b"c".to_vec());

        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn fingerprint_changes_with_content() -> Result<()> {
        let a = temp_path("fp_a.jar");
        let b = temp_path("fp_b.jar");
        write_jar(&a, &[("a/A.class", b"1")])?;
        write_jar(&b, &[("a/A.class", b"2")])?;
        let fa = InputFile::fingerprint(&a)?;
        let fb = InputFile::fingerprint(&b)?;
        assert_eq!(fa.sha256.len(), 64);
        assert_ne!(fa.sha256, fb.sha256);
        std::fs::remove_file(a)?;
        std::fs::remove_file(b)?;
        Ok(())
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(read_class_entries(Path::new("/nonexistent/in.jar")).is_err());
    }
}
