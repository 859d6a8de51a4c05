use std::io::Cursor;

use image::{imageops, ImageFormat, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;

/// Letters and digits that survive blur and noise without being confused
/// with one another (no 0/O, 1/I).
pub const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const NOISE_LINES: usize = 5;
const NOISE_DOTS: usize = 120;

pub fn random_text(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| *CHARSET.choose(&mut rng).unwrap_or(&b'A') as char)
        .collect()
}

/// Case-insensitive; an empty expectation never matches.
pub fn matches(expected: &str, given: &str) -> bool {
    !expected.is_empty() && expected.eq_ignore_ascii_case(given.trim())
}

/// Render `text` as a PNG of `width` x `height` pixels.
pub fn render_png(text: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let image = render(text, width, height);
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn render(text: &str, width: u32, height: u32) -> RgbImage {
    let mut rng = rand::thread_rng();
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for _ in 0..NOISE_LINES {
        let from = (rng.gen_range(0..width) as i64, rng.gen_range(0..height) as i64);
        let to = (rng.gen_range(0..width) as i64, rng.gen_range(0..height) as i64);
        draw_line(&mut img, from, to, Rgb([160, 160, 160]));
    }

    let chars: Vec<char> = text.chars().collect();
    if !chars.is_empty() {
        let margin = width / 10;
        let slot = (width.saturating_sub(2 * margin) / chars.len() as u32).max(1);
        let scale = (slot / (GLYPH_W + 1)).min(height / (GLYPH_H + 2)).max(1);
        let top = height.saturating_sub(GLYPH_H * scale) / 2;

        for (i, c) in chars.iter().enumerate() {
            let Some(rows) = glyph(*c) else { continue };
            let x = (margin + i as u32 * slot) as i64 + rng.gen_range(-2..=2);
            let y = top as i64 + rng.gen_range(-3..=3);
            let color = Rgb([rng.gen_range(0..90), rng.gen_range(0..90), rng.gen_range(0..90)]);
            draw_glyph(&mut img, &rows, (x, y), scale, color);
        }
    }

    for _ in 0..NOISE_DOTS {
        let (x, y) = (rng.gen_range(0..width), rng.gen_range(0..height));
        img.put_pixel(x, y, Rgb([120, 120, 120]));
    }

    imageops::blur(&img, 0.6)
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_glyph(img: &mut RgbImage, rows: &[u8; 7], origin: (i64, i64), scale: u32, color: Rgb<u8>) {
    let scale = scale as i64;
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_W {
            if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                continue;
            }
            let px = origin.0 + col as i64 * scale;
            let py = origin.1 + row as i64 * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    put(img, px + dx, py + dy, color);
                }
            }
        }
    }
}

// Bresenham
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 5x7 bitmap, one byte per row, low five bits used, MSB on the left.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        _ => return None,
    };
    Some(rows)
}
