//! Output naming, independent of the separator style of the input path

use crate::types::ConversionDirection;
use std::path::{Path, PathBuf};

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Last path component, splitting on both `/` and `\`
pub fn display_name(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.trim_end_matches(SEPARATORS)
        .rsplit(SEPARATORS)
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("file")
        .to_string()
}

/// Everything before the last separator, if there is one
pub fn parent_dir(path: &Path) -> Option<PathBuf> {
    let raw = path.to_string_lossy();
    let index = raw.rfind(SEPARATORS)?;
    if index == 0 {
        // Root on unix-style paths
        return Some(PathBuf::from(&raw[..1]));
    }
    Some(PathBuf::from(&raw[..index]))
}

/// Output file name for `source` in the given direction.
///
/// A recognised input extension is swapped for the target one; anything else
/// gets the target extension appended.
pub fn destination_name(source: &Path, direction: ConversionDirection) -> String {
    let name = display_name(source);
    let target = direction.target_extension();

    for ext in direction.source_extensions() {
        let suffix = format!(".{ext}");
        if name.len() <= suffix.len() {
            continue;
        }
        let split = name.len() - suffix.len();
        if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(&suffix) {
            return format!("{}.{target}", &name[..split]);
        }
    }

    format!("{name}.{target}")
}

/// Full destination path inside `destination_dir`
pub fn destination_path(
    destination_dir: &Path,
    source: &Path,
    direction: ConversionDirection,
) -> PathBuf {
    destination_dir.join(destination_name(source, direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_handles_both_separators() {
        assert_eq!(display_name(Path::new("/books/chapter.pdf")), "chapter.pdf");
        assert_eq!(
            display_name(Path::new(r"C:\books\chapter.pdf")),
            "chapter.pdf"
        );
        assert_eq!(display_name(Path::new("chapter.pdf")), "chapter.pdf");
        assert_eq!(display_name(Path::new("")), "file");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(
            parent_dir(Path::new("/books/chapter.pdf")),
            Some(PathBuf::from("/books"))
        );
        assert_eq!(
            parent_dir(Path::new(r"D:\scans\vol1.cbz")),
            Some(PathBuf::from(r"D:\scans"))
        );
        assert_eq!(parent_dir(Path::new("/chapter.pdf")), Some(PathBuf::from("/")));
        assert_eq!(parent_dir(Path::new("chapter.pdf")), None);
    }

    #[test]
    fn test_destination_name_swaps_extension() {
        let dir = ConversionDirection::PdfToArchive;
        assert_eq!(destination_name(Path::new("/a/chapter.pdf"), dir), "chapter.cbz");
        assert_eq!(destination_name(Path::new(r"C:\a\chapter.pdf"), dir), "chapter.cbz");
        assert_eq!(destination_name(Path::new("/a/CHAPTER.PDF"), dir), "CHAPTER.cbz");
        assert_eq!(destination_name(Path::new("/a/notes"), dir), "notes.cbz");

        let rev = ConversionDirection::ArchiveToPdf;
        assert_eq!(destination_name(Path::new("/a/vol.cbz"), rev), "vol.pdf");
        assert_eq!(destination_name(Path::new("/a/vol.CBR"), rev), "vol.pdf");
    }

    #[test]
    fn test_destination_name_keeps_inner_dots() {
        let dir = ConversionDirection::PdfToArchive;
        assert_eq!(
            destination_name(Path::new("/a/vol.1.final.pdf"), dir),
            "vol.1.final.cbz"
        );
        assert_eq!(destination_name(Path::new("/a/.pdf"), dir), ".pdf.cbz");
    }
}
