use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Bytes per RGBA sample
pub const CHANNELS: usize = 4;

/// Reduced-resolution RGBA snapshot of a source frame
///
/// Snapshots are immutable once captured; the pixel buffer is shared so a
/// snapshot can be handed between the sampler, the detector and the session
/// without copying.
#[derive(Debug, Clone)]
pub struct PixelSnapshot {
    /// Instant the frame was read back from the source
    pub captured_at: Instant,
    /// Raw RGBA bytes, row-major, `width * height * 4` long
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl PixelSnapshot {
    /// Wrap a raw RGBA buffer. Returns `None` when the buffer length does not
    /// match the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if data.len() != width as usize * height as usize * CHANNELS {
            return None;
        }

        Some(Self {
            captured_at: Instant::now(),
            data: Arc::new(data),
            width,
            height,
        })
    }

    /// Take ownership of a rasterized surface
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            captured_at: Instant::now(),
            data: Arc::new(image.into_raw()),
            width,
            height,
        }
    }

    /// Solid-colour snapshot, mostly useful for seeding and tests
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();

        Self {
            captured_at: Instant::now(),
            data: Arc::new(data),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA sample at (x, y); callers stay inside the grid
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Copy back into an image buffer (e.g. for compositing an export)
    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Check whether two snapshots can be compared pixel by pixel
    pub fn same_dimensions(&self, other: &PixelSnapshot) -> bool {
        self.dimensions() == other.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_size_validation() {
        assert!(PixelSnapshot::new(4, 2, vec![0u8; 4 * 2 * 4]).is_some());
        assert!(PixelSnapshot::new(4, 2, vec![0u8; 10]).is_none());
        assert!(PixelSnapshot::new(0, 2, Vec::new()).is_none());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut data = vec![0u8; 3 * 2 * 4];
        // row 1 of a 3-wide image, column 2
        let i = (3 + 2) * 4;
        data[i..i + 4].copy_from_slice(&[10, 20, 30, 255]);

        let snapshot = PixelSnapshot::new(3, 2, data).unwrap();
        assert_eq!(snapshot.pixel(2, 1), [10, 20, 30, 255]);
        assert_eq!(snapshot.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_filled_and_image_conversion() {
        let snapshot = PixelSnapshot::filled(5, 3, [1, 2, 3, 4]);
        assert_eq!(snapshot.data().len(), 5 * 3 * 4);
        assert_eq!(snapshot.pixel(4, 2), [1, 2, 3, 4]);

        let image = snapshot.to_image();
        assert_eq!(image.dimensions(), (5, 3));

        let back = PixelSnapshot::from_image(image);
        assert!(back.same_dimensions(&snapshot));
        assert_eq!(back.data(), snapshot.data());
    }
}
