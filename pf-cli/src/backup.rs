//! Data backup/restore/list (§9): archives the memory database (and
//! anything else under the data directory) into a single zip so an
//! operator can move a persona's memory to a new host. Mirrors the
//! original's tar.gz backup script, using a zip container instead.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Walks `data_dir` and writes every regular file into a zip archive at
/// `output_path`, using paths relative to `data_dir` as archive entries.
pub fn create_backup(data_dir: &Path, output_path: &Path) -> Result<()> {
    if !data_dir.exists() {
        anyhow::bail!("data directory not found: {}", data_dir.display());
    }

    let file = File::create(output_path)
        .with_context(|| format!("creating backup archive {}", output_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut entries = Vec::new();
    collect_files(data_dir, data_dir, &mut entries)?;

    for (abs_path, rel_name) in &entries {
        zip.start_file(rel_name, options)
            .with_context(|| format!("starting zip entry {rel_name}"))?;
        let mut contents = Vec::new();
        File::open(abs_path)
            .with_context(|| format!("reading {}", abs_path.display()))?
            .read_to_end(&mut contents)?;
        zip.write_all(&contents)?;
        println!("  + {rel_name}");
    }

    zip.finish().context("finalizing backup archive")?;
    let size_kb = std::fs::metadata(output_path)?.len() as f64 / 1024.0;
    println!("[BACKUP] Complete: {} ({:.1} KB)", output_path.display(), size_kb);
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(std::path::PathBuf, String)>) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((path, rel));
        }
    }
    Ok(())
}

/// Extracts every entry in `archive_path` into `target_dir`, recreating
/// the relative directory structure.
pub fn restore_backup(archive_path: &Path, target_dir: &Path) -> Result<()> {
    if !archive_path.exists() {
        anyhow::bail!("backup not found: {}", archive_path.display());
    }
    std::fs::create_dir_all(target_dir)?;

    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("reading zip archive")?;

    println!("[RESTORE] Restoring from: {}", archive_path.display());
    println!("[RESTORE] Target directory: {}", target_dir.display());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let dest = target_dir.join(&enclosed);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        File::create(&dest)?.write_all(&contents)?;
        println!("  + {} -> {}/", enclosed.display(), target_dir.display());
    }

    println!("[RESTORE] Complete!");
    Ok(())
}

/// Prints each entry's name and uncompressed size without extracting.
pub fn list_backup_contents(archive_path: &Path) -> Result<()> {
    if !archive_path.exists() {
        anyhow::bail!("backup not found: {}", archive_path.display());
    }
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("reading zip archive")?;

    println!("[LIST] Contents of {}:", archive_path.display());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let size_kb = entry.size() as f64 / 1024.0;
        println!("  {} ({:.1} KB)", entry.name(), size_kb);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn backup_then_restore_round_trips_file_contents() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("memory.db"), b"sqlite-bytes").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub").join("note.txt"), b"hello").unwrap();

        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("backup.zip");
        create_backup(src.path(), &archive_path).unwrap();

        let restore_dir = tempfile::tempdir().unwrap();
        restore_backup(&archive_path, restore_dir.path()).unwrap();

        assert_eq!(fs::read(restore_dir.path().join("memory.db")).unwrap(), b"sqlite-bytes");
        assert_eq!(fs::read(restore_dir.path().join("sub").join("note.txt")).unwrap(), b"hello");
    }

    #[test]
    fn list_reports_every_entry() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"aaa").unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let archive_path = archive_dir.path().join("backup.zip");
        create_backup(src.path(), &archive_path).unwrap();

        list_backup_contents(&archive_path).unwrap();
    }

    #[test]
    fn create_backup_fails_for_missing_data_dir() {
        let archive_dir = tempfile::tempdir().unwrap();
        let missing = archive_dir.path().join("does-not-exist");
        let out = archive_dir.path().join("out.zip");
        assert!(create_backup(&missing, &out).is_err());
    }
}
