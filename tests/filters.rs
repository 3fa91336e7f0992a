use std::collections::HashSet;

use thermatoonpix::filter::jet_lut;
use thermatoonpix::{
    cartoonize, pixelate, thermalize, Cartoonizer, FilterKind, FilterSettings, Frame, Pixelator,
    PixelSettings, ProcessError, Transform,
};

fn gradient(width: u32, height: u32) -> Frame {
    Frame::from_fn(width, height, |x, y| {
        [
            (x * 255 / width) as u8,
            (y * 255 / height) as u8,
            ((x + y) * 3 % 256) as u8,
        ]
    })
    .unwrap()
}

#[test]
fn all_filters_keep_the_frame_shape() {
    let settings = FilterSettings::default();
    for (w, h) in [(1, 1), (7, 3), (33, 17), (64, 48)] {
        let frame = gradient(w, h);
        for kind in FilterKind::ALL {
            let out = kind.build(&settings).apply(&frame).unwrap();
            assert_eq!(out.dimensions(), (w, h), "{kind} on {w}x{h}");
            // Filtering a filtered frame keeps the shape too.
            let again = kind.build(&settings).apply(&out).unwrap();
            assert_eq!(again.dimensions(), (w, h), "{kind} twice on {w}x{h}");
        }
    }
}

#[test]
fn flat_frame_cartoon_has_no_edges() {
    let frame = Frame::filled(40, 30, [90, 140, 200]).unwrap();
    let cartoon = Cartoonizer::default();

    let mask = cartoon.edge_mask(&frame);
    assert!(mask.as_bytes().iter().all(|&v| v == 255));
    assert_eq!(cartoonize(&frame), cartoon.color_base(&frame));
}

#[test]
fn pixel_art_is_blocky_with_a_bounded_palette() {
    let frame = gradient(80, 64);
    let out = Pixelator::new(PixelSettings {
        block_size: 8,
        num_colors: 5,
        seed: Some(11),
        ..PixelSettings::default()
    })
    .pixelate(&frame)
    .unwrap();

    // 80x64 with block 8 divides evenly, so every 8x8 block is one color.
    for by in 0..8 {
        for bx in 0..10 {
            let first = out.pixel(bx * 8, by * 8);
            for y in 0..8 {
                for x in 0..8 {
                    assert_eq!(out.pixel(bx * 8 + x, by * 8 + y), first);
                }
            }
        }
    }

    let palette: HashSet<[u8; 3]> = out.as_bytes().chunks(3).map(|p| [p[0], p[1], p[2]]).collect();
    assert!(palette.len() <= 5, "{} colors", palette.len());
}

#[test]
fn pixelate_rejects_degenerate_parameters() {
    let frame = gradient(16, 16);
    assert!(matches!(
        pixelate(&frame, 0, 4),
        Err(ProcessError::TransformFailure { filter: "pixel", .. })
    ));
    assert!(matches!(
        pixelate(&frame, 4, 0),
        Err(ProcessError::TransformFailure { filter: "pixel", .. })
    ));
}

#[test]
fn thermal_is_deterministic_and_uses_the_palette() {
    let frame = gradient(30, 20);
    let first = thermalize(&frame);
    assert_eq!(first, thermalize(&frame));

    let lut: HashSet<[u8; 3]> = jet_lut().iter().copied().collect();
    assert!(first
        .as_bytes()
        .chunks(3)
        .all(|p| lut.contains(&[p[0], p[1], p[2]])));
}
