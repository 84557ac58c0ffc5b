//! Image I/O operations service
//!
//! File access for the pipeline: reading uploads, writing results and
//! preparing the working directories. Nothing here creates directories
//! implicitly; a missing upload or output directory is an error.

use crate::error::{NoBackError, Result};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, RgbImage};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// The format is taken from the extension first and sniffed from the
    /// content if that fails, so a PNG saved under a `.jpg` name still loads.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use noback::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("uploads/input_image.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Content is not a decodable image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(NoBackError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = fs::read(path_ref)
                    .map_err(|io_err| NoBackError::file_io_error("read image data", path_ref, &io_err))?;

                image::load_from_memory(&data).map_err(|content_err| {
                    log::debug!(
                        "Content-based detection failed for {} ({} bytes): {}",
                        path_ref.display(),
                        data.len(),
                        content_err
                    );
                    NoBackError::image_load_error(path_ref, &content_err)
                })
            },
        }
    }

    /// Write raw upload bytes, overwriting any previous file
    ///
    /// # Errors
    /// - Parent directory missing or not writable
    pub fn save_upload<P: AsRef<Path>>(bytes: &[u8], path: P) -> Result<()> {
        let path_ref = path.as_ref();
        fs::write(path_ref, bytes)
            .map_err(|e| NoBackError::file_io_error("write upload", path_ref, &e))?;
        log::debug!("Saved upload ({} bytes) to {}", bytes.len(), path_ref.display());
        Ok(())
    }

    /// Encode an RGB image as JPEG and write it, overwriting any previous file
    ///
    /// # Errors
    /// - Parent directory missing or not writable
    /// - JPEG encoding failures
    pub fn save_jpeg<P: AsRef<Path>>(image: &RgbImage, path: P, quality: u8) -> Result<()> {
        let path_ref = path.as_ref();
        let file = fs::File::create(path_ref)
            .map_err(|e| NoBackError::file_io_error("create output file", path_ref, &e))?;
        let mut writer = BufWriter::new(file);

        JpegEncoder::new_with_quality(&mut writer, quality)
            .encode_image(image)
            .map_err(|e| {
                NoBackError::processing_stage_error(
                    "image save",
                    &format!("Failed to save as JPEG: {e}"),
                    Some(&format!("path: {}", path_ref.display())),
                )
            })?;

        writer
            .flush()
            .map_err(|e| NoBackError::file_io_error("flush output file", path_ref, &e))?;
        Ok(())
    }

    /// Create the given directories (and their parents) if missing
    ///
    /// # Errors
    /// - Directory creation failures
    pub fn ensure_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
        for dir in dirs {
            let dir = dir.as_ref();
            fs::create_dir_all(dir)
                .map_err(|e| NoBackError::file_io_error("create directory", dir, &e))?;
        }
        Ok(())
    }
}
