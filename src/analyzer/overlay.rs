use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Transparent drawing surface laid over the displayed video
#[derive(Debug, Clone)]
pub struct OverlaySurface {
    image: RgbaImage,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// Resize to the display size and wipe everything drawn so far
    pub fn reset(&mut self, width: u32, height: u32) {
        if self.image.dimensions() == (width, height) {
            self.clear();
        } else {
            self.image = RgbaImage::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Fill a rectangle, clipped to the surface
    pub fn highlight(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width == 0 || height == 0 {
            return;
        }
        draw_filled_rect_mut(
            &mut self.image,
            Rect::at(x, y).of_size(width, height),
            color,
        );
    }

    pub fn is_clear(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }

    pub fn painted_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p.0[3] != 0).count()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Blend the overlay onto a copy of the displayed frame
pub fn compose_overlay(frame: &RgbaImage, overlay: &OverlaySurface) -> RgbaImage {
    let mut composed = if frame.dimensions() == overlay.dimensions() {
        frame.clone()
    } else {
        let (w, h) = overlay.dimensions();
        imageops::resize(frame, w, h, imageops::FilterType::Triangle)
    };
    imageops::overlay(&mut composed, overlay.as_image(), 0, 0);
    composed
}
