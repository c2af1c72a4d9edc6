// Adapters - Concrete implementations of the port contracts

pub mod capture_screen;
pub mod decode_ffmpeg;
pub mod exec_ffmpeg;
pub mod fetch_ytdlp;
pub mod ocr_easyocr;
pub mod ocr_tesseract;

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Upscale and binarize a killfeed crop before recognition. Small HUD text
/// reads markedly better at 2x with a hard threshold.
pub(crate) fn preprocess_for_ocr(image: &GrayImage, scale: f32, threshold: u8) -> GrayImage {
    let scaled = if scale > 1.0 {
        let w = (image.width() as f32 * scale) as u32;
        let h = (image.height() as f32 * scale) as u32;
        imageops::resize(image, w.max(1), h.max(1), FilterType::Lanczos3)
    } else {
        image.clone()
    };
    let mut binary = scaled;
    for pixel in binary.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= threshold { 255 } else { 0 };
    }
    binary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_scales_and_binarizes() {
        let mut image = GrayImage::new(4, 4);
        image.put_pixel(0, 0, image::Luma([200]));
        image.put_pixel(1, 1, image::Luma([100]));
        let out = preprocess_for_ocr(&image, 2.0, 180);
        assert_eq!(out.width(), 8);
        assert_eq!(out.height(), 8);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
