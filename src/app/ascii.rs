use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ratatui::layout::Rect;

const ASCII_CHARS: [char; 11] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@', '$'];

/// Size of the preview in cells, keeping the aspect ratio of the image.
///
/// Terminal cells are about twice as tall as wide, so rows count double.
pub fn fit_cells(image_width: u32, image_height: u32, area: Rect) -> (u32, u32) {
    if image_width == 0 || image_height == 0 || area.width == 0 || area.height == 0 {
        return (0, 0);
    }
    let max_w = area.width as f32;
    let max_h = area.height as f32 * 2.0;
    let scale = (max_w / image_width as f32).min(max_h / image_height as f32);

    let width = (image_width as f32 * scale).round().max(1.0) as u32;
    let height = (image_height as f32 * scale / 2.0).round().max(1.0) as u32;
    (width.min(area.width as u32), height.min(area.height as u32))
}

/// Converts an image to ASCII art that fits within the given dimensions.
pub fn create_ascii_art(image: &DynamicImage, area: Rect) -> String {
    let (width, height) = fit_cells(image.width(), image.height(), area);
    if width == 0 || height == 0 {
        return String::new();
    }

    let resized_image = image.resize_exact(width, height, FilterType::Triangle);
    let mut ascii_art = String::with_capacity(((width + 1) * height) as usize);

    for y in 0..resized_image.height() {
        for x in 0..resized_image.width() {
            let pixel = resized_image.get_pixel(x, y);
            let gray =
                (pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114) as u8;
            let char_index = (gray as f32 / 255.0 * (ASCII_CHARS.len() - 1) as f32).round() as usize;
            ascii_art.push(ASCII_CHARS[char_index]);
        }
        ascii_art.push('\n');
    }

    ascii_art
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_fit_cells_keeps_aspect() {
        let area = Rect::new(0, 0, 80, 20);
        // Square image: limited by height, 20 rows hold 40 "pixels".
        assert_eq!(fit_cells(100, 100, area), (40, 20));
        // Wide image: limited by width.
        assert_eq!(fit_cells(800, 100, area), (80, 5));
        assert_eq!(fit_cells(0, 10, area), (0, 0));
    }

    #[test]
    fn test_ascii_art_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        let art = create_ascii_art(&img, Rect::new(0, 0, 8, 4));
        let lines: Vec<&str> = art.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.chars().all(|c| c == '$')));
    }
}
