use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to merge speckles into areas
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

/// Binary mask: 255 where the level is at least `threshold`, 0 elsewhere
pub fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = img.clone();
    for pixel in mask.pixels_mut() {
        *pixel = if pixel[0] >= threshold { Luma([255]) } else { Luma([0]) };
    }
    mask
}
