use crate::error::{MapeoError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Where motion happened over a whole clip
///
/// Hits are counted on the sampled grid: every motion cell marks the
/// `cell x cell` block it stands for. Rendering smooths the counts, stretches
/// them to the full colour range and scales the result to the output size.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionHeatmap {
    width: u32,
    height: u32,
    cell: u32,
    output_size: (u32, u32),
    hits: Vec<u32>,
}

impl MotionHeatmap {
    pub fn new(width: u32, height: u32, cell: u32) -> Self {
        Self {
            width,
            height,
            cell: cell.max(1),
            output_size: (width, height),
            hits: vec![0; width as usize * height as usize],
        }
    }

    /// Render at this size instead of the grid size
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.output_size = (width, height);
        }
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    /// Cells outside the grid are skipped
    pub fn add_cells(&mut self, cells: &[(u32, u32)]) {
        for &(x, y) in cells {
            if x >= self.width || y >= self.height {
                continue;
            }
            let right = x.saturating_add(self.cell).min(self.width);
            let bottom = y.saturating_add(self.cell).min(self.height);
            for row in y..bottom {
                let start = row as usize * self.width as usize;
                for slot in &mut self.hits[start + x as usize..start + right as usize] {
                    *slot += 1;
                }
            }
        }
    }

    pub fn hits(&self, x: u32, y: u32) -> u32 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.hits[y as usize * self.width as usize + x as usize]
    }

    pub fn peak(&self) -> u32 {
        self.hits.iter().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.peak() == 0
    }

    /// Smoothed intensity in 0..=255 on the grid, min-max stretched
    pub fn intensity(&self) -> GrayImage {
        let peak = self.peak();
        if peak == 0 || self.width == 0 || self.height == 0 {
            return GrayImage::new(self.width, self.height);
        }

        let raw = GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(self.hits(x, y) as u64 * 255 / peak as u64) as u8])
        });
        let blurred = gaussian_blur_f32(&raw, self.cell as f32);

        let (low, high) = blurred
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if high == low {
            return blurred;
        }
        let span = (high - low) as u32;
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let v = blurred.get_pixel(x, y)[0] - low;
            Luma([(v as u32 * 255 / span) as u8])
        })
    }

    /// Colour rendering at the output size
    pub fn render(&self) -> RgbImage {
        let intensity = self.intensity();
        let coloured = RgbImage::from_fn(intensity.width(), intensity.height(), |x, y| {
            jet(intensity.get_pixel(x, y)[0])
        });

        let (out_w, out_h) = self.output_size;
        if coloured.dimensions() == (out_w, out_h) || coloured.width() == 0 {
            coloured
        } else {
            imageops::resize(&coloured, out_w, out_h, FilterType::Triangle)
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png = Cursor::new(Vec::new());
        self.render()
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| MapeoError::system(format!("Failed to encode heatmap: {}", e)))?;
        Ok(png.into_inner())
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_png()?)?;
        debug!("Heatmap written to {}", path.display());
        Ok(())
    }
}

/// Blue through cyan, yellow and red
fn jet(value: u8) -> Rgb<u8> {
    let t = value as f32 / 255.0;
    let channel = |offset: f32| {
        let v = 1.5 - (4.0 * t - offset).abs();
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}
