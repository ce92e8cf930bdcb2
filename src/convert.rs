//! Converting source images into containers.
use std::path::{Path, PathBuf};

use crate::adapters::{SourceAdapter, SourceImage};
use crate::container::{CONTAINER_EXTENSION, SaveOptions};
use crate::handle::Mzarr;
use crate::metadata::Attributes;
use crate::pyramid::PyramidKind;
use crate::Result;

/// Options shared by single and batch conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Round values to integers and downsample without inventing labels.
    pub segmentation: bool,
    /// Store the base level lossy as well.
    pub lossy: bool,
    pub num_levels: usize,
    pub kind: PyramidKind,
    pub overwrite: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        let save = SaveOptions::default();
        Self {
            segmentation: false,
            lossy: false,
            num_levels: save.num_levels,
            kind: save.kind,
            overwrite: save.overwrite,
        }
    }
}

impl ConvertOptions {
    fn save_options(&self, image: &SourceImage) -> SaveOptions {
        let mut attrs = Attributes::new();
        attrs.insert("spacing".to_string(), image.spacing.clone().into());
        SaveOptions::default()
            .with_attrs(attrs)
            .with_num_levels(self.num_levels)
            .with_kind(self.kind)
            .with_segmentation(self.segmentation)
            .with_lossless(!self.lossy)
            .with_overwrite(self.overwrite)
    }
}

/// Convert the source at `src` into a container at `dst`.
pub fn convert_file(
    adapter: &dyn SourceAdapter,
    src: &Path,
    dst: &Path,
    options: &ConvertOptions,
) -> Result<()> {
    let image = if options.segmentation {
        adapter.load_segmentation(src)?
    } else {
        adapter.load(src)?
    };
    let save_options = options.save_options(&image);
    let mut handle = Mzarr::from_volume(image.volume);
    handle.save(dst, &save_options)?;
    log::info!("converted {} to {}", src.display(), dst.display());
    handle.close()
}

/// Outcome of a batch conversion.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Containers written.
    pub converted: Vec<PathBuf>,
    /// Sources that failed, with the error.
    pub failed: Vec<(PathBuf, crate::Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Convert every source found in `src_dir` into `dst_dir/{name}.mzarr`.
///
/// A failing source is logged and recorded; the remaining sources are still converted.
pub fn convert_dir(
    adapter: &dyn SourceAdapter,
    src_dir: &Path,
    dst_dir: &Path,
    options: &ConvertOptions,
) -> Result<BatchReport> {
    let sources = adapter.discover(src_dir)?;
    std::fs::create_dir_all(dst_dir)?;
    log::info!(
        "converting {} {} sources from {}",
        sources.len(),
        adapter.name(),
        src_dir.display()
    );

    let mut report = BatchReport::default();
    for source in sources {
        let dst = dst_dir.join(format!("{}.{CONTAINER_EXTENSION}", source.name));
        match convert_file(adapter, &source.path, &dst, options) {
            Ok(()) => report.converted.push(dst),
            Err(e) => {
                log::warn!("failed to convert {}: {e}", source.path.display());
                report.failed.push((source.path, e));
            }
        }
    }
    Ok(report)
}
