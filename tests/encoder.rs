mod common;

use clipsearch::config::Device;
use clipsearch::encoder::{CLIP_IMAGE_SIZE, preprocess};
use clipsearch::{ClipEncoder, Error, ImageEncoder};
use common::*;
use rstest::*;

#[rstest]
#[case::square(224, 224)]
#[case::tiny(1, 1)]
#[case::landscape(640, 480)]
#[case::portrait(300, 1000)]
#[case::wide(300, 10)]
#[case::tall(10, 300)]
fn preprocess_shape_is_fixed(#[case] width: i32, #[case] height: i32) {
    let image = tagged_image(128, width, height);

    let tensor = preprocess(&image).unwrap();

    let n = CLIP_IMAGE_SIZE as usize;
    assert_eq!(tensor.shape(), &[1, 3, n, n]);
}

#[rstest]
fn preprocess_normalizes_with_clip_statistics() {
    let image = tagged_image(255, 50, 50);

    let tensor = preprocess(&image).unwrap();

    // 红色通道为 255，其余为 0
    let r = tensor[[0, 0, 100, 100]];
    let g = tensor[[0, 1, 100, 100]];
    assert!((r - (1. - 0.48145466) / 0.26862954).abs() < 1e-3, "{r}");
    assert!((g - (0. - 0.4578275) / 0.26130258).abs() < 1e-3, "{g}");
}

#[rstest]
fn preprocess_is_deterministic() {
    let image = tagged_image(42, 123, 77);
    assert_eq!(preprocess(&image).unwrap(), preprocess(&image).unwrap());
}

#[rstest]
#[case::by_name("openai/clip-vit-base-patch32")]
#[case::by_path("/nonexistent/visual.onnx")]
fn missing_model_fails_to_load(#[case] model: &str) {
    let dir = tempfile::tempdir().unwrap();

    let err = ClipEncoder::initialize(model, Device::Cpu, dir.path()).err().unwrap();

    assert!(matches!(err, Error::ModelLoad { .. }));
    assert!(!err.is_item_failure());
}

#[rstest]
fn corrupt_model_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.onnx");
    std::fs::write(&path, b"this is not an onnx graph").unwrap();

    let err = ClipEncoder::initialize(path.to_str().unwrap(), Device::Cpu, dir.path())
        .err()
        .unwrap();

    assert!(matches!(err, Error::ModelLoad { .. }));
}

#[rstest]
#[case(16, 12)]
#[case(1000, 3)]
#[case(2, 900)]
fn embedding_dimension_is_fixed(#[case] width: i32, #[case] height: i32) {
    let encoder = FakeEncoder { dimension: 512 };

    let embedding = encoder.embed(&tagged_image(9, width, height)).unwrap();

    assert_eq!(embedding.len(), encoder.dimension());
}
