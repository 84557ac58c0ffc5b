//! Shared helpers for integration tests

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use noback::{MockBackend, SegmentationPipeline, ServerConfig};
use std::io::Cursor;
use std::path::Path;

pub(crate) const BOUNDARY: &str = "noback-test-boundary";

/// Configuration rooted in `root`, with both working directories created
pub(crate) fn config_in(root: &Path) -> ServerConfig {
    let upload_dir = root.join("uploads");
    let output_dir = root.join("NoBackImages");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    ServerConfig::builder()
        .upload_dir(upload_dir)
        .output_dir(output_dir)
        .build()
        .unwrap()
}

pub(crate) fn pipeline(config: ServerConfig, backend: MockBackend) -> SegmentationPipeline {
    SegmentationPipeline::new(config, Box::new(backend)).unwrap()
}

pub(crate) fn solid_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

pub(crate) fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub(crate) fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode(
        &DynamicImage::ImageRgb8(solid_image(width, height, color)),
        ImageFormat::Jpeg,
    )
}

/// Channel-wise closeness, allowing for JPEG artefacts
pub(crate) fn close_to(pixel: Rgb<u8>, expected: [u8; 3], tolerance: u8) -> bool {
    pixel
        .0
        .iter()
        .zip(expected.iter())
        .all(|(&a, &b)| a.abs_diff(b) <= tolerance)
}

/// A `multipart/form-data` body with a single file field
pub(crate) fn multipart_file(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// A `multipart/form-data` body with a single text field
pub(crate) fn multipart_text(field: &str, value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

pub(crate) fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
