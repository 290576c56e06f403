use super::*;
use crate::error::DetectionError;
use crate::frame::PixelSnapshot;
use crate::session::SessionStatus;
use crate::source::MemorySource;
use image::{Rgba, RgbaImage};

fn detector() -> MotionDetector {
    MotionDetector::new(DetectionParams {
        threshold: 30,
        step: 4,
        highlight: Rgba([16, 185, 129, 89]),
    })
}

#[test]
fn test_sampler_rejects_out_of_range_scale() {
    assert!(FrameSampler::new(0.0).is_err());
    assert!(FrameSampler::new(-0.5).is_err());
    assert!(FrameSampler::new(1.01).is_err());
    assert!(FrameSampler::new(f64::NAN).is_err());
    assert!(FrameSampler::new(1.0).is_ok());
}

#[test]
fn test_sampler_dimensions_floor_and_clamp() {
    let sampler = FrameSampler::new(0.2).unwrap();
    assert_eq!(sampler.reduced_dimensions(640, 480), (128, 96));
    assert_eq!(sampler.reduced_dimensions(1, 1), (1, 1));
    assert_eq!(sampler.reduced_dimensions(4, 9), (1, 1));

    let source = MemorySource::with_frames([RgbaImage::new(1, 1)]);
    let snapshot = sampler.sample(&source).unwrap();
    assert_eq!(snapshot.dimensions(), (1, 1));
}

#[test]
fn test_sampler_returns_none_without_frame() {
    let sampler = FrameSampler::new(0.5).unwrap();
    let source = MemorySource::new();
    assert!(sampler.sample(&source).is_none());
}

#[test]
fn test_sampler_reduces_queued_frame() {
    let sampler = FrameSampler::new(0.5).unwrap();
    let frame = RgbaImage::from_pixel(20, 10, Rgba([200, 100, 50, 255]));
    let source = MemorySource::with_frames([frame]);

    let snapshot = sampler.sample(&source).unwrap();
    assert_eq!(snapshot.dimensions(), (10, 5));
    assert_eq!(snapshot.pixel(3, 3), [200, 100, 50, 255]);
}

#[test]
fn test_identical_snapshots_have_no_motion() {
    let a = PixelSnapshot::filled(16, 16, [90, 90, 90, 255]);
    let b = PixelSnapshot::filled(16, 16, [90, 90, 90, 255]);
    let mut overlay = OverlaySurface::new(64, 64);
    overlay.highlight(0, 0, 10, 10, Rgba([255, 0, 0, 255]));

    let motion = detector()
        .detect_and_render(&a, &b, &mut overlay, 64, 64)
        .unwrap();

    assert_eq!(motion, 0);
    assert!(overlay.is_clear());
}

#[test]
fn test_threshold_boundary_is_strict() {
    let previous = PixelSnapshot::filled(4, 4, [100, 100, 100, 255]);

    // 10 + 10 + 10 == threshold: not motion
    let at_threshold = PixelSnapshot::filled(4, 4, [110, 110, 110, 255]);
    assert_eq!(detector().motion_cells(&previous, &at_threshold).unwrap().len(), 0);

    // 31 > threshold: one grid point on a 4x4 snapshot with step 4
    let above = PixelSnapshot::filled(4, 4, [111, 110, 110, 255]);
    assert_eq!(detector().motion_cells(&previous, &above).unwrap().len(), 1);
}

#[test]
fn test_alpha_changes_are_ignored() {
    let previous = PixelSnapshot::filled(8, 8, [10, 10, 10, 0]);
    let current = PixelSnapshot::filled(8, 8, [10, 10, 10, 255]);
    assert_eq!(detector().motion_cells(&previous, &current).unwrap().len(), 0);
}

#[test]
fn test_grid_walk_counts_every_stride_point() {
    let previous = PixelSnapshot::filled(10, 10, [0, 0, 0, 255]);
    let current = PixelSnapshot::filled(10, 10, [255, 255, 255, 255]);
    // x, y in {0, 4, 8}
    assert_eq!(detector().motion_cells(&previous, &current).unwrap().len(), 9);

    let cells = detector().motion_cells(&previous, &current).unwrap();
    assert!(cells.contains(&(8, 8)));
    assert!(!cells.contains(&(9, 9)));
}

#[test]
fn test_dimension_mismatch_fails_fast() {
    let previous = PixelSnapshot::filled(8, 8, [0, 0, 0, 255]);
    let current = PixelSnapshot::filled(16, 8, [0, 0, 0, 255]);
    let mut overlay = OverlaySurface::new(32, 32);
    overlay.highlight(0, 0, 4, 4, Rgba([255, 0, 0, 255]));

    let err = detector()
        .detect_and_render(&previous, &current, &mut overlay, 32, 32)
        .unwrap_err();

    assert_eq!(
        err,
        DetectionError::DimensionMismatch {
            previous_width: 8,
            previous_height: 8,
            current_width: 16,
            current_height: 8,
        }
    );
    assert!(!overlay.is_clear());
}

#[test]
fn test_highlight_rectangles_scale_to_display() {
    let previous = PixelSnapshot::filled(4, 4, [0, 0, 0, 255]);
    let current = PixelSnapshot::filled(4, 4, [255, 255, 255, 255]);
    let mut overlay = OverlaySurface::new(1, 1);

    // one cell at (0, 0); display is 10x the snapshot so the rect is 40x40
    let motion = detector()
        .detect_and_render(&previous, &current, &mut overlay, 40, 40)
        .unwrap();

    assert_eq!(motion, 1);
    assert_eq!(overlay.dimensions(), (40, 40));
    assert_eq!(overlay.painted_pixels(), 40 * 40);
    assert_eq!(overlay.as_image().get_pixel(39, 39), &Rgba([16, 185, 129, 89]));
}

#[test]
fn test_highlight_rectangles_have_minimum_size() {
    let previous = PixelSnapshot::filled(100, 100, [0, 0, 0, 255]);
    let mut data = PixelSnapshot::filled(100, 100, [0, 0, 0, 255]).to_image();
    data.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
    let current = PixelSnapshot::from_image(data);
    let mut overlay = OverlaySurface::new(1, 1);

    // display smaller than the snapshot: step * 0.1 rounds up to 1, clamped to 3
    let motion = detector()
        .detect_and_render(&previous, &current, &mut overlay, 10, 10)
        .unwrap();

    assert_eq!(motion, 1);
    assert_eq!(overlay.painted_pixels(), 9);
}

#[test]
fn test_overlay_does_not_accumulate() {
    let still = PixelSnapshot::filled(8, 8, [0, 0, 0, 255]);
    let moved = PixelSnapshot::filled(8, 8, [200, 200, 200, 255]);
    let mut overlay = OverlaySurface::new(8, 8);

    detector()
        .detect_and_render(&still, &moved, &mut overlay, 8, 8)
        .unwrap();
    assert!(!overlay.is_clear());

    detector()
        .detect_and_render(&moved, &moved, &mut overlay, 8, 8)
        .unwrap();
    assert!(overlay.is_clear());
}

#[test]
fn test_compose_overlay_blends_highlight() {
    let frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
    let mut overlay = OverlaySurface::new(4, 4);
    overlay.highlight(0, 0, 2, 2, Rgba([255, 255, 255, 255]));

    let composed = compose_overlay(&frame, &overlay);
    assert_eq!(composed.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    assert_eq!(composed.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
}

#[test]
fn test_clip_summary_statistics() {
    let sampler = FrameSampler::new(1.0).unwrap();
    let mut builder = ClipSummaryBuilder::new(sampler, detector());

    let dark = PixelSnapshot::filled(8, 8, [0, 0, 0, 255]);
    let bright = PixelSnapshot::filled(8, 8, [255, 255, 255, 255]);

    // motion per frame: 0 (seed), 4, 0, 4
    builder.push_snapshot(dark.clone());
    builder.push_snapshot(bright.clone());
    builder.push_snapshot(bright);
    builder.push_snapshot(dark);
    assert_eq!(builder.frames(), 4);

    let summary = builder.finish(2.0).summary;
    assert_eq!(summary.total_frames, 4);
    assert_eq!(summary.duration_seconds, 2.0);
    assert_eq!(summary.total_detections, 8);
    assert_eq!(summary.frames_with_detections, 2);
    assert_eq!(summary.average_motion_per_frame, 2.0);
    assert_eq!(summary.average_motion_when_active, 4.0);
    assert_eq!(summary.peak_motion_in_single_frame, 4);
    assert_eq!(summary.estimated_motion_seconds, 4.0);
    assert_eq!(summary.motion_per_second, vec![4, 4]);
    assert_eq!(summary.status, SessionStatus::Done);
}

#[test]
fn test_clip_summary_without_frame_rate() {
    let sampler = FrameSampler::new(0.5).unwrap();
    let mut builder = ClipSummaryBuilder::new(sampler, detector());
    builder.push_frame(&RgbaImage::new(16, 16));

    let analysis = builder.finish(0.0);
    assert_eq!(analysis.summary.total_frames, 1);
    assert_eq!(analysis.summary.duration_seconds, 0.0);
    assert_eq!(analysis.summary.estimated_motion_seconds, 0.0);
    assert!(analysis.summary.motion_per_second.is_empty());
    assert!(analysis.detections.is_empty());
    assert!(analysis.heatmap.is_none());
}

#[test]
fn test_clip_detections_use_frame_coordinates() {
    // 16x16 frames sampled at half size: grid points 0 and 4 map back to 0 and 8
    let sampler = FrameSampler::new(0.5).unwrap();
    let mut builder = ClipSummaryBuilder::new(sampler, detector());
    builder.push_frame(&RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255])));
    builder.push_frame(&RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255])));
    builder.push_frame(&RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 255])));

    let analysis = builder.finish(25.0);
    assert_eq!(analysis.detections.len(), 4);
    assert!(analysis.detections.iter().all(|d| d.frame_idx == 3));
    assert!(analysis.detections.contains(&Detection {
        frame_idx: 3,
        x: 8,
        y: 8
    }));
    assert!(analysis.detections.iter().all(|d| d.x % 8 == 0 && d.y % 8 == 0));

    let heatmap = analysis.heatmap.expect("motion should produce a heatmap");
    assert_eq!(heatmap.dimensions(), (8, 8));
    assert_eq!(heatmap.output_size(), (16, 16));
    assert_eq!(heatmap.render().dimensions(), (16, 16));
}

#[test]
fn test_heatmap_accumulates_cell_blocks() {
    let mut heatmap = MotionHeatmap::new(16, 16, 4);
    assert!(heatmap.is_empty());

    heatmap.add_cells(&[(0, 0), (0, 0), (12, 12), (20, 20)]);
    assert_eq!(heatmap.hits(0, 0), 2);
    assert_eq!(heatmap.hits(3, 3), 2);
    assert_eq!(heatmap.hits(4, 4), 0);
    assert_eq!(heatmap.hits(15, 15), 1);
    assert_eq!(heatmap.peak(), 2);
    assert!(!heatmap.is_empty());
}

#[test]
fn test_heatmap_render_is_hot_where_motion_repeats() {
    let mut heatmap = MotionHeatmap::new(16, 16, 4);
    heatmap.add_cells(&[(0, 0), (0, 0), (12, 12)]);

    let intensity = heatmap.intensity();
    assert!(intensity.get_pixel(1, 1)[0] > 150);
    assert!(intensity.get_pixel(8, 8)[0] < 60);

    let rendered = heatmap.clone().with_output_size(32, 24).render();
    assert_eq!(rendered.dimensions(), (32, 24));

    let plain = heatmap.render();
    let hot = plain.get_pixel(1, 1);
    let cold = plain.get_pixel(8, 8);
    assert!(hot[0] > hot[2]);
    assert!(cold[2] > cold[0]);

    let png = heatmap.to_png().unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}
