use image::{ImageBuffer, Rgb};
use rand::Rng;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

#[allow(dead_code)]
static SETUP: Once = Once::new();

#[allow(dead_code)]
fn generate_test_image(path: &Path) {
    let mut img = ImageBuffer::new(100, 100);
    for pixel in img.pixels_mut() {
        *pixel = Rgb([128u8, 128u8, 128u8]);
    }
    img.save(path).unwrap();
}

#[allow(dead_code)]
pub fn setup() {
    SETUP.call_once(|| {
        let assets_dir = Path::new("tests/assets");
        if !assets_dir.exists() {
            fs::create_dir_all(assets_dir).unwrap();
        }

        let image_path = assets_dir.join("test_image.jpg");
        if !image_path.exists() {
            generate_test_image(&image_path);
        }
    });
}

/// Writes a small noise PNG at `path`.
#[allow(dead_code)]
pub fn write_noise_image(path: &Path) {
    let mut rng = rand::rng();
    let mut img = ImageBuffer::new(32, 24);
    for pixel in img.pixels_mut() {
        *pixel = Rgb([rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()]);
    }
    img.save(path).unwrap();
}

/// Creates `names` as noise images under `dir` and returns their paths.
#[allow(dead_code)]
pub fn image_folder(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            write_noise_image(&path);
            path
        })
        .collect()
}

/// Model directory used by tests that need the real model, if present.
#[allow(dead_code)]
pub fn local_model_dir() -> Option<PathBuf> {
    let dir = std::env::var_os("PIXTAG_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pixai-tagger-v0.9-onnx"));
    (dir.join("model.onnx").is_file() && dir.join("selected_tags.csv").is_file()).then_some(dir)
}
