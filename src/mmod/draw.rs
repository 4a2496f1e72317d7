// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use image::{Rgb, RgbImage};

use super::objects::{Detection, Rect};

const MATCH_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy of `image` with a one-pixel outline around every detection.
pub fn draw_detections(image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for det in detections {
        outline(&mut canvas, det.rect, MATCH_COLOUR);
    }
    canvas
}

fn outline(canvas: &mut RgbImage, rect: Rect, colour: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    if rect.width == 0 || rect.height == 0 || rect.x >= w || rect.y >= h {
        return;
    }
    let x1 = (rect.x + rect.width - 1).min(w - 1);
    let y1 = (rect.y + rect.height - 1).min(h - 1);
    for x in rect.x..=x1 {
        canvas.put_pixel(x, rect.y, colour);
        canvas.put_pixel(x, y1, colour);
    }
    for y in rect.y..=y1 {
        canvas.put_pixel(rect.x, y, colour);
        canvas.put_pixel(x1, y, colour);
    }
}
