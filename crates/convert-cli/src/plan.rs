use anyhow::{Result, bail};
use convert_batch::{
    ConversionOptions, FileDescriptor, FileRegistry, FileSystem, TransferMode, paths, strategy,
};
use std::path::PathBuf;

/// What a run would do for one queued file
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub display_name: String,
    pub destination: PathBuf,
    pub transfer: TransferMode,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub destination_dir: PathBuf,
    pub entries: Vec<PlanEntry>,
    /// Inputs the direction does not accept, plus duplicates
    pub skipped: Vec<PathBuf>,
}

/// Queue `files` the way a run would and resolve each destination
pub async fn build<F: FileSystem>(
    fs: &F,
    files: Vec<PathBuf>,
    options: &ConversionOptions,
) -> Result<Plan> {
    let direction = options.direction;
    let mut registry = FileRegistry::new();
    let mut skipped = Vec::new();

    for path in files {
        if !direction.accepts(&path) || registry.contains(&path) {
            skipped.push(path);
            continue;
        }
        let descriptor = match fs.file_size(&path).await {
            Ok(size) => FileDescriptor::new(path).with_size(size),
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                FileDescriptor::new(path)
            }
        };
        registry.add([descriptor]);
    }

    let Some(first) = registry.files().first() else {
        bail!("No {} inputs to convert", direction.name());
    };
    let default_dir = paths::parent_dir(&first.path);
    let Some(destination_dir) = fs.pick_directory(default_dir.as_deref()).await else {
        bail!("No usable destination directory");
    };

    let transfer = strategy::choose(direction, options.direct_to_disk);
    let entries = registry
        .files()
        .iter()
        .map(|file| PlanEntry {
            source: file.path.clone(),
            display_name: file.display_name.clone(),
            destination: paths::destination_path(&destination_dir, &file.path, direction),
            transfer,
            size_bytes: file.source_size_bytes,
        })
        .collect();

    Ok(Plan {
        destination_dir,
        entries,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_batch::{ConversionDirection, LocalFileSystem};
    use tempfile::TempDir;

    async fn touch(dir: &TempDir, name: &str, len: usize) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, vec![0u8; len]).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_plan_defaults_to_first_parent() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.pdf", 10).await;
        let b = touch(&dir, "b.PDF", 20).await;
        let notes = touch(&dir, "notes.txt", 1).await;

        let plan = build(
            &LocalFileSystem::new(),
            vec![a.clone(), notes.clone(), b.clone(), a.clone()],
            &ConversionOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(plan.destination_dir, dir.path());
        assert_eq!(plan.skipped, vec![notes, a.clone()]);
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].destination, dir.path().join("a.cbz"));
        assert_eq!(plan.entries[0].size_bytes, Some(10));
        assert_eq!(plan.entries[1].destination, dir.path().join("b.cbz"));
        assert_eq!(plan.entries[1].transfer, TransferMode::InMemory);
    }

    #[tokio::test]
    async fn test_plan_direct_only_for_pdf_inputs() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let vol = touch(&dir, "vol1.cbz", 5).await;
        let fs = LocalFileSystem::with_destination(out.path());

        let options = ConversionOptions {
            direction: ConversionDirection::ArchiveToPdf,
            direct_to_disk: true,
            ..Default::default()
        };
        let plan = build(&fs, vec![vol], &options).await.unwrap();
        assert_eq!(plan.entries[0].transfer, TransferMode::InMemory);
        assert_eq!(plan.entries[0].destination, out.path().join("vol1.pdf"));

        let pdf = touch(&dir, "book.pdf", 5).await;
        let options = ConversionOptions {
            direct_to_disk: true,
            ..Default::default()
        };
        let plan = build(&fs, vec![pdf], &options).await.unwrap();
        assert_eq!(plan.entries[0].transfer, TransferMode::DirectToDisk);
    }

    #[tokio::test]
    async fn test_plan_without_inputs_fails() {
        let result = build(
            &LocalFileSystem::new(),
            vec![PathBuf::from("/tmp/readme.md")],
            &ConversionOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
