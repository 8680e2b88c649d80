use crate::clahe::{Clahe, enhance};
use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder};
use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";
pub const PROCESSED_IMAGES_DIR: &str = "processed_images";
pub const PROCESSED_LABELS_DIR: &str = "processed_labels";
pub const LABEL_EXTENSION: &str = "txt";
pub const JPEG_QUALITY: u8 = 95;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input directory does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Outcome of one folder. `processed` holds the source paths that produced an output file.
#[derive(Debug, Default)]
pub struct FolderReport {
    pub processed: Vec<PathBuf>,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct SplitReport {
    pub split: String,
    pub images: FolderReport,
    pub labels_copied: usize,
    pub labels_missing: usize,
}

pub struct Pipeline {
    pub copy_labels: bool,
    pub show_progress: bool,
    clahe: Clahe,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Pipeline {
    pub fn new(copy_labels: bool, show_progress: bool) -> Self {
        Self {
            copy_labels,
            show_progress,
            clahe: Clahe::default(),
        }
    }

    pub fn with_clahe(mut self, clahe: Clahe) -> Self {
        self.clahe = clahe;
        self
    }

    /// Enhance every image in `input` and write it under the same name in `output`.
    ///
    /// Files that fail to read, decode or write are logged and skipped.
    pub fn process_folder(&self, input: &Path, output: &Path) -> Result<FolderReport, PipelineError> {
        if !input.is_dir() {
            return Err(PipelineError::MissingInput(input.to_path_buf()));
        }
        fs::create_dir_all(output).map_err(|source| PipelineError::CreateDir {
            path: output.to_path_buf(),
            source,
        })?;

        let files = list_images(input)?;
        let progress = self.progress_bar(files.len(), input);
        let mut report = FolderReport::default();

        for path in files {
            let Some(name) = path.file_name() else {
                continue;
            };
            let out_path = output.join(name);

            match self.process_file(&path, &out_path) {
                Ok(()) => {
                    tracing::debug!(path = %out_path.display(), "Processed and saved");
                    report.processed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not process image, skipping");
                    report.skipped += 1;
                }
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        Ok(report)
    }

    /// Process `<root>/<split>/images` into `<root>/<split>/processed_images`.
    ///
    /// Returns `Ok(None)` when the split has no images directory.
    pub fn process_split(&self, root: &Path, split: &str) -> Result<Option<SplitReport>, PipelineError> {
        let split_dir = root.join(split);
        let input = split_dir.join(IMAGES_DIR);
        if !input.is_dir() {
            tracing::warn!(split, path = %input.display(), "Split has no images directory, skipping");
            return Ok(None);
        }

        tracing::info!(split, "Processing split");
        let images = self.process_folder(&input, &split_dir.join(PROCESSED_IMAGES_DIR))?;

        let mut report = SplitReport {
            split: split.to_string(),
            ..Default::default()
        };

        if self.copy_labels {
            let labels_out = split_dir.join(PROCESSED_LABELS_DIR);
            fs::create_dir_all(&labels_out).map_err(|source| PipelineError::CreateDir {
                path: labels_out.clone(),
                source,
            })?;

            // `a.jpg` and `a.png` share one label file.
            let stems: BTreeSet<&OsStr> = images.processed.iter().filter_map(|p| p.file_stem()).collect();
            for stem in stems {
                if copy_label(stem, &split_dir.join(LABELS_DIR), &labels_out) {
                    report.labels_copied += 1;
                } else {
                    report.labels_missing += 1;
                }
            }
        }

        report.images = images;
        Ok(Some(report))
    }

    fn process_file(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let image = image::open(input)?;
        let enhanced = enhance(&image, &self.clahe);
        save(&enhanced, output)
    }

    fn progress_bar(&self, len: usize, input: &Path) -> ProgressBar {
        if self.show_progress {
            let bar = ProgressBar::new(len as u64);
            bar.set_message(input.display().to_string());
            bar
        } else {
            ProgressBar::hidden()
        }
    }
}

/// Sorted list of files in `dir` with an image extension, matched case-insensitively.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| PipelineError::NonUtf8Path(dir.to_path_buf()))?;
    let pattern = Path::new(&glob::Pattern::escape(dir_str)).join("*");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| PipelineError::NonUtf8Path(pattern.clone()))?;

    let mut files: Vec<PathBuf> = glob::glob(pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable directory entry, skipping");
                None
            }
        })
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Encode fully in memory first so a failed encode leaves no partial file behind.
fn save(image: &RgbImage, path: &Path) -> anyhow::Result<()> {
    let format = ImageFormat::from_path(path)?;
    let mut buf = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            image.write_with_encoder(encoder)?;
        }
        other => image.write_to(&mut buf, other)?,
    }

    fs::write(path, buf.into_inner())?;
    Ok(())
}

/// Copy `<labels>/<stem>.txt` into `out`. Returns false when there is no label.
fn copy_label(stem: &OsStr, labels: &Path, out: &Path) -> bool {
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(LABEL_EXTENSION);
    let src = labels.join(&name);

    if !src.is_file() {
        tracing::warn!(path = %src.display(), "Label not found, skipping");
        return false;
    }

    match fs::copy(&src, out.join(&name)) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(path = %src.display(), error = %e, "Could not copy label, skipping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a.jpg")));
        assert!(has_image_extension(Path::new("a.JPEG")));
        assert!(has_image_extension(Path::new("dir/b.Png")));
        assert!(!has_image_extension(Path::new("c.bmp")));
        assert!(!has_image_extension(Path::new("labels.txt")));
        assert!(!has_image_extension(Path::new("jpg")));
    }

    #[test]
    fn test_failed_encode_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("frame.gif");

        // GIF support is not compiled in, so encoding fails before anything is written.
        assert!(save(&RgbImage::new(4, 4), &target).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_copy_label_keeps_dotted_stems() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join(LABELS_DIR);
        let out = dir.path().join(PROCESSED_LABELS_DIR);
        fs::create_dir_all(&labels).unwrap();
        fs::create_dir_all(&out).unwrap();
        fs::write(labels.join("scan.v2.txt"), "0 0.5 0.5 0.1 0.1\n").unwrap();

        assert!(copy_label(OsStr::new("scan.v2"), &labels, &out));
        assert!(out.join("scan.v2.txt").is_file());
        assert!(!copy_label(OsStr::new("scan"), &labels, &out));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let err = Pipeline::default()
            .process_folder(Path::new("/definitely/not/here"), Path::new("/tmp/unused"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
    }
}
