//! Image decoding and a restartable, in-order image cursor.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use log::debug;
use ndarray::{ArrayD, IxDyn};

use crate::architecture::ArchitectureSpec;
use crate::error::{Error, Result};
use crate::normalize::ChannelLayout;

/// Turns an image file into a preprocessed network input.
pub trait ImageLoader {
    fn load(
        &self,
        path: &Path,
        spec: &ArchitectureSpec,
        layout: ChannelLayout,
    ) -> Result<ArrayD<f32>>;
}

/// Decodes RGB images from disk, resizes them to the architecture input size
/// and applies the architecture preprocessing. No augmentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskImageLoader;

impl ImageLoader for DiskImageLoader {
    fn load(
        &self,
        path: &Path,
        spec: &ArchitectureSpec,
        layout: ChannelLayout,
    ) -> Result<ArrayD<f32>> {
        let decoded = image::open(path).map_err(|source| Error::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let (height, width) = spec.input_size;
        let rgb = decoded
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .to_rgb8();

        let mut tensor = ArrayD::<f32>::zeros(IxDyn(&layout.image_shape(height, width)));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (row, col) = (y as usize, x as usize);
            for channel in 0..3 {
                let value = spec.preprocessing.apply(pixel[channel], channel);
                match layout {
                    ChannelLayout::ChannelsLast => tensor[[row, col, channel]] = value,
                    ChannelLayout::ChannelsFirst => tensor[[channel, row, col]] = value,
                }
            }
        }
        Ok(tensor)
    }
}

/// Yields preprocessed images in path order, one at a time.
///
/// Images are decoded lazily on the first pass and cached, so [`reset`]
/// restarts the sequence without touching storage again.
///
/// [`reset`]: ImageCursor::reset
pub struct ImageCursor<'a, L: ImageLoader + ?Sized> {
    paths: Vec<PathBuf>,
    loader: &'a L,
    spec: &'a ArchitectureSpec,
    layout: ChannelLayout,
    cache: Vec<ArrayD<f32>>,
    position: usize,
}

impl<'a, L: ImageLoader + ?Sized> ImageCursor<'a, L> {
    pub fn new(
        paths: Vec<PathBuf>,
        loader: &'a L,
        spec: &'a ArchitectureSpec,
        layout: ChannelLayout,
    ) -> Self {
        Self {
            cache: Vec::with_capacity(paths.len()),
            paths,
            loader,
            spec,
            layout,
            position: 0,
        }
    }

    /// Rewind to the first image.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Next image in order, or `None` once every path has been yielded.
    pub fn next_image(&mut self) -> Result<Option<&ArrayD<f32>>> {
        if self.position >= self.paths.len() {
            return Ok(None);
        }
        if self.position == self.cache.len() {
            let path = &self.paths[self.position];
            debug!("decoding {}", path.display());
            let image = self.loader.load(path, self.spec, self.layout)?;
            self.cache.push(image);
        }
        self.position += 1;
        Ok(Some(&self.cache[self.position - 1]))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Images decoded so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
