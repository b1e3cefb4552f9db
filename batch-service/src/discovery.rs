// Image Discovery
// Finds the dataset images a run expands into jobs

use crate::error::{ServiceError, ServiceResult};

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions (lowercase) treated as input images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "pgm", "ppm"];

/// Whether a path has one of the supported image extensions (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect image files under `dataset_dir`, sorted by path.
///
/// A missing directory or an empty result is a configuration error, so callers
/// can stop before any output directory is created.
pub fn discover_images(dataset_dir: &Path) -> ServiceResult<Vec<PathBuf>> {
    if !dataset_dir.is_dir() {
        return Err(ServiceError::configuration(format!(
            "Directory '{}' does not exist",
            dataset_dir.display()
        )));
    }

    let mut images: Vec<PathBuf> = WalkDir::new(dataset_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable dataset entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    if images.is_empty() {
        return Err(ServiceError::configuration(format!(
            "No image files found in '{}'",
            dataset_dir.display()
        )));
    }

    images.sort();
    tracing::debug!(count = images.len(), "discovered dataset images");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/photo.PNG")));
        assert!(is_image_file(Path::new("scan.pgm")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_discover_images_recursive_and_sorted() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let nested = root.join("set").join("b");
        fs::create_dir_all(&nested).unwrap();

        fs::write(root.join("z.jpg"), b"").unwrap();
        fs::write(root.join("a.png"), b"").unwrap();
        fs::write(nested.join("m.BMP"), b"").unwrap();
        fs::write(root.join("readme.md"), b"").unwrap();

        let images = discover_images(root).unwrap();
        assert_eq!(
            images,
            vec![root.join("a.png"), nested.join("m.BMP"), root.join("z.jpg")]
        );
    }

    #[test]
    fn test_discover_missing_directory() {
        let err = discover_images(Path::new("/nonexistent/dataset")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_discover_empty_directory() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("only.txt"), b"").unwrap();

        let err = discover_images(temp.path()).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
