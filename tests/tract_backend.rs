//! Tract backend driven by a small ONNX graph built in memory

#![cfg(feature = "tract")]

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use noback::{
    BackendType, InferenceBackend, ModelManager, SegmentationPipeline, ServerConfig, TractBackend,
};
use prost::Message;
use tract_onnx::pb::{
    type_proto, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TypeProto,
    ValueInfoProto,
};

/// `y = ReduceMean(x, axes=[3], keepdims=1)`: the channel mean as a
/// `[1, 64, 64, 1]` probability map
fn channel_mean_model() -> Vec<u8> {
    let float_tensor = || TypeProto {
        denotation: String::new(),
        value: Some(type_proto::Value::TensorType(type_proto::Tensor {
            elem_type: 1,
            shape: None,
        })),
    };

    let axes = AttributeProto {
        name: "axes".into(),
        r#type: 7,
        ints: vec![3],
        ..Default::default()
    };
    let keepdims = AttributeProto {
        name: "keepdims".into(),
        r#type: 2,
        i: 1,
        ..Default::default()
    };
    let node = NodeProto {
        input: vec!["x".into()],
        output: vec!["y".into()],
        op_type: "ReduceMean".into(),
        attribute: vec![axes, keepdims],
        ..Default::default()
    };
    let graph = GraphProto {
        node: vec![node],
        name: "channel_mean".into(),
        input: vec![ValueInfoProto {
            name: "x".into(),
            r#type: Some(float_tensor()),
            ..Default::default()
        }],
        output: vec![ValueInfoProto {
            name: "y".into(),
            r#type: Some(float_tensor()),
            ..Default::default()
        }],
        ..Default::default()
    };

    ModelProto {
        ir_version: 7,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        graph: Some(graph),
        ..Default::default()
    }
    .encode_to_vec()
}

fn write_model(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("back_removal.onnx");
    std::fs::write(&path, channel_mean_model()).unwrap();
    path
}

#[test]
fn test_tract_infer_output_shape() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ModelManager::from_path(write_model(dir.path())).unwrap();
    let mut backend = TractBackend::with_model_manager(manager);

    let load_time = backend.initialize(&ServerConfig::default()).unwrap();
    assert!(load_time.is_some());
    assert!(backend.is_initialized());

    let mut input = Array4::<f32>::zeros((1, 64, 64, 3));
    input[[0, 10, 20, 0]] = 3.0;
    input[[0, 10, 20, 1]] = 6.0;
    input[[0, 10, 20, 2]] = 9.0;

    let output = backend.infer(&input).unwrap();
    assert_eq!(output.dim(), (1, 64, 64, 1));
    assert!((output[[0, 10, 20, 0]] - 6.0).abs() < 1e-5);
    assert!(output[[0, 0, 0, 0]].abs() < 1e-6);
}

#[test]
fn test_tract_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::builder()
        .model_path(write_model(dir.path()))
        .backend_type(BackendType::Tract)
        .pixel_scale(1.0 / 255.0)
        .build()
        .unwrap();
    let mut pipeline = SegmentationPipeline::from_config(config).unwrap();
    assert!(pipeline.model_load_time().is_some());

    // Dark left half (mean ~0.1) is background, bright right half (mean ~0.9) is kept
    let image = RgbImage::from_fn(300, 200, |x, _| {
        if x < 150 {
            Rgb([25, 25, 25])
        } else {
            Rgb([230, 230, 230])
        }
    });

    let result = pipeline
        .process_image(&DynamicImage::ImageRgb8(image))
        .unwrap();

    assert_eq!(result.dimensions(), (300, 200));
    assert_eq!(result.image.get_pixel(10, 100), &Rgb([0, 0, 0]));
    assert_eq!(result.image.get_pixel(290, 100), &Rgb([230, 230, 230]));
}
