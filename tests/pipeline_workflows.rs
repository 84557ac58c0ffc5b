//! End-to-end pipeline workflows on real files

mod common;

use common::{close_to, config_in, encode, jpeg_bytes, pipeline, solid_image};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use noback::{MockBackend, ServerConfig};
use tempfile::TempDir;

#[test]
fn test_upload_round_trip_preserves_dimensions() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let mut pipeline = pipeline(config.clone(), MockBackend::new());

    for (width, height) in [(64, 64), (37, 11), (1, 1), (640, 480)] {
        let result = pipeline
            .process_upload(&jpeg_bytes(width, height, [120, 130, 140]))
            .unwrap();
        assert_eq!(result.dimensions(), (width, height));
        assert_eq!(result.original_dimensions, (width, height));

        let written = image::open(config.output_path()).unwrap();
        assert_eq!(written.dimensions(), (width, height));
    }
}

#[test]
fn test_confident_foreground_keeps_whole_image() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let mut pipeline = pipeline(config.clone(), MockBackend::constant(0.99));

    let result = pipeline
        .process_upload(&jpeg_bytes(48, 32, [30, 160, 220]))
        .unwrap();

    assert_eq!(result.mask.statistics().background_pixels, 0);
    let output = image::open(config.output_path()).unwrap().to_rgb8();
    assert!(output.pixels().all(|&p| close_to(p, [30, 160, 220], 12)));
}

#[test]
fn test_threshold_is_strict() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let mut pipeline = pipeline(config, MockBackend::constant(0.5));

    let result = pipeline
        .process_upload(&jpeg_bytes(24, 24, [250, 250, 250]))
        .unwrap();

    assert_eq!(result.mask.statistics().foreground_pixels, 0);
    assert!(result.image.pixels().all(|p| p.0 == [0, 0, 0]));
}

#[test]
fn test_custom_threshold_changes_mask() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.mask_threshold = 0.05;
    let mut pipeline = pipeline(config, MockBackend::new());

    let result = pipeline
        .process_upload(&jpeg_bytes(64, 64, [100, 100, 100]))
        .unwrap();

    // Every mock probability (0.1 or 0.9) clears a 0.05 threshold
    assert_eq!(result.mask.statistics().background_pixels, 0);
}

#[test]
fn test_png_with_alpha_is_flattened_to_rgb() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let mut pipeline = pipeline(config.clone(), MockBackend::constant(0.9));

    let rgba = RgbaImage::from_pixel(20, 10, Rgba([10, 220, 90, 0]));
    let upload = encode(&DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

    let result = pipeline.process_upload(&upload).unwrap();
    assert_eq!(result.dimensions(), (20, 10));
    assert!(result.image.pixels().all(|p| p.0 == [10, 220, 90]));

    // The upload keeps its original bytes even though it is named .jpg
    assert_eq!(std::fs::read(config.upload_path()).unwrap(), upload);
}

#[test]
fn test_nchw_model_output_is_accepted() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let backend = MockBackend::constant(0.8).with_output_shape((1, 1, 64, 64));
    let mut pipeline = pipeline(config, backend);

    let result = pipeline
        .process_upload(&jpeg_bytes(33, 17, [200, 0, 0]))
        .unwrap();
    assert_eq!(result.mask.statistics().background_pixels, 0);
}

#[test]
fn test_process_file_writes_to_given_path() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let mut pipeline = pipeline(config, MockBackend::new());

    let input = dir.path().join("portrait.png");
    let output = dir.path().join("portrait_nobg.jpg");
    solid_image(80, 60, [70, 80, 90]).save(&input).unwrap();

    let result = pipeline.process_file(&input, &output).unwrap();
    assert!(result.timings.image_encode_ms.is_some());
    assert!(result.timings.total_ms >= result.timings.inference_ms);

    let written = image::open(&output).unwrap().to_rgb8();
    assert_eq!(written.dimensions(), (80, 60));
    assert!(close_to(*written.get_pixel(0, 0), [0, 0, 0], 12));
    assert!(close_to(*written.get_pixel(40, 30), [70, 80, 90], 12));
}

#[test]
fn test_default_paths_are_fixed() {
    let config = ServerConfig::default();
    assert!(config.upload_path().ends_with("uploads/input_image.jpg"));
    assert!(config.output_path().ends_with("NoBackImages/output_image.jpg"));
    assert_eq!(config.output_url(), "/NoBackImages/output_image.jpg");
}
