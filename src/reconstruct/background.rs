//! Background colour estimation from corner samples.

use crate::layout::RgbColor;
use image::{GenericImageView, Pixel};

/// Estimate a page's background colour.
///
/// Samples the four pixels `inset` pixels in from each corner and returns the
/// most frequent of them; ties go to the sample seen first (top-left, then
/// top-right, bottom-left, bottom-right). The inset is shrunk on images too
/// small for it so the samples always land inside. An empty image is white.
pub fn estimate_background<I>(image: &I, inset: u32) -> RgbColor
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8>,
{
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return RgbColor::WHITE;
    }

    let ix = inset.min((w - 1) / 2);
    let iy = inset.min((h - 1) / 2);
    let samples = [
        (ix, iy),
        (w - 1 - ix, iy),
        (ix, h - 1 - iy),
        (w - 1 - ix, h - 1 - iy),
    ];

    let mut counts: Vec<(RgbColor, usize)> = Vec::with_capacity(samples.len());
    for (x, y) in samples {
        let color = RgbColor::from(image.get_pixel(x, y).to_rgb());
        match counts.iter_mut().find(|(c, _)| *c == color) {
            Some((_, n)) => *n += 1,
            None => counts.push((color, 1)),
        }
    }

    // max_by_key keeps the last maximum, so walk in reverse to prefer the first.
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, n)| *n)
        .map_or(RgbColor::WHITE, |(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn uniform_image_is_its_own_background() {
        let img = RgbImage::from_pixel(100, 80, Rgb([12, 34, 56]));
        assert_eq!(estimate_background(&img, 10), RgbColor::new(12, 34, 56));
    }

    #[test]
    fn majority_of_corners_wins() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        // Cover the top-left sample with a dark logo.
        for y in 0..30 {
            for x in 0..30 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        assert_eq!(estimate_background(&img, 10), RgbColor::WHITE);
    }

    #[test]
    fn tie_prefers_first_sample() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([0, 0, 255]));
        for y in 0..100 {
            for x in 0..50 {
                img.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        // Two red corners on the left, two blue on the right.
        assert_eq!(estimate_background(&img, 10), RgbColor::new(255, 0, 0));
    }

    #[test]
    fn tiny_and_empty_images() {
        let img = RgbImage::from_pixel(3, 3, Rgb([9, 9, 9]));
        assert_eq!(estimate_background(&img, 10), RgbColor::new(9, 9, 9));
        let one = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        assert_eq!(estimate_background(&one, 10), RgbColor::new(1, 2, 3));
        let empty = RgbImage::new(0, 0);
        assert_eq!(estimate_background(&empty, 10), RgbColor::WHITE);
    }

    #[test]
    fn rgba_input_ignores_alpha() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([200, 100, 50, 7]));
        assert_eq!(estimate_background(&img, 10), RgbColor::new(200, 100, 50));
    }
}
