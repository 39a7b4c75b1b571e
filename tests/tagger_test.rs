use pixtag::{
    processor::{ImagePreprocessor, ImageProcessor},
    tagger::{Device, ScoreOutput, TaggerModel},
    tags::LabelTags,
};

mod common;
use common::{local_model_dir, setup};

// These tests need the model files; they pass trivially without them.

#[test]
fn test_load_model() {
    let Some(dir) = local_model_dir() else { return };
    let model = TaggerModel::load(dir.join("model.onnx"), &Device::cpu()).unwrap();
    assert!(matches!(
        model.output_kind(),
        ScoreOutput::Prediction | ScoreOutput::Logits
    ));
}

#[test]
fn test_load_missing_model() {
    assert!(TaggerModel::load("does-not-exist/model.onnx", &Device::cpu()).is_err());
}

#[test]
fn test_predict() {
    let Some(dir) = local_model_dir() else { return };
    setup();
    let mut model = TaggerModel::load(dir.join("model.onnx"), &Device::cpu()).unwrap();
    let labels = LabelTags::load(dir.join("selected_tags.csv")).unwrap();
    let processor = ImagePreprocessor::default();

    let image = image::open("tests/assets/test_image.jpg").unwrap();
    let input_tensor = processor.process(&image).unwrap();

    let predictions = model.predict(input_tensor).unwrap();
    assert_eq!(predictions.len(), 1); // Batch size of 1
    assert_eq!(predictions[0].len(), labels.len()); // Number of tags
    assert!(predictions[0].iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_predict_batch() {
    let Some(dir) = local_model_dir() else { return };
    setup();
    let mut model = TaggerModel::load(dir.join("model.onnx"), &Device::cpu()).unwrap();
    let processor = ImagePreprocessor::default();

    let image = image::open("tests/assets/test_image.jpg").unwrap();
    let batch = processor.process_batch(vec![&image, &image]).unwrap();

    let predictions = model.predict(batch).unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].len(), predictions[1].len());
}
