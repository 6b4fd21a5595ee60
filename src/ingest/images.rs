//! Still-image sources: one image file, or every supported image in a folder.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{lowercase_extension, FrameSource, SourceStats, IMAGE_EXTENSIONS};
use crate::frame::Frame;

/// Iterates a fixed, sorted list of image files, one frame per call.
pub struct ImageListSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    origin: String,
}

impl ImageListSource {
    pub fn new(paths: Vec<PathBuf>, origin: impl Into<String>) -> Self {
        Self {
            paths,
            cursor: 0,
            frame_count: 0,
            origin: origin.into(),
        }
    }

    pub fn from_image<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::new(vec![path.to_path_buf()], path.display().to_string())
    }

    /// List supported images in `dir`, sorted by path. Fails when there are none.
    pub fn from_folder<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list image folder {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let supported = lowercase_extension(&path)
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
            if supported {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(anyhow!("no images found in folder: {}", dir.display()));
        }
        paths.sort();
        log::info!("ImageListSource: {} images in {}", paths.len(), dir.display());
        Ok(Self::new(paths, dir.display().to_string()))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageListSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;

        let image = image::open(&path)
            .with_context(|| format!("could not read image {}", path.display()))?
            .to_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::new(image, self.frame_count).with_origin(path)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.origin.clone(),
        }
    }
}
