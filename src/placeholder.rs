//! Deterministic placeholder illustrations.
//!
//! The terminal tier of the image cascade: an abstract composition
//! rendered locally and encoded as a PNG, with the palette and shape
//! layout keyed by a hash of the input title. The same title always
//! produces byte-identical output, and distinct titles get visibly
//! distinct palettes, so a book full of placeholders still has variety.

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Square canvas edge in pixels.
pub const CANVAS_SIZE: u32 = 512;

const SHAPE_COUNT: usize = 15;
const BORDER_MARGIN: u32 = 30;

/// Stable seed derived from the title.
#[must_use]
pub fn placeholder_seed(title: &str) -> u64 {
    let digest = Sha256::digest(title.as_bytes());
    let bytes: [u8; 8] = digest[..8].try_into().unwrap_or([0; 8]);
    u64::from_be_bytes(bytes)
}

/// Background and accent colors for a title: a dark, muted background and
/// a brighter accent sharing the same hue.
#[must_use]
pub fn palette(title: &str) -> ([u8; 3], [u8; 3]) {
    let hue = (placeholder_seed(title) % 360) as f64;
    (hsv_to_rgb(hue, 0.30, 0.20), hsv_to_rgb(hue, 0.50, 0.70))
}

/// Render the placeholder composition for `title` as PNG bytes.
#[must_use]
pub fn render_placeholder(title: &str) -> Vec<u8> {
    let seed = placeholder_seed(title);
    let (background, accent) = palette(title);
    let mut canvas = Canvas::new(CANVAS_SIZE, CANVAS_SIZE, background);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..SHAPE_COUNT {
        let alpha = rng.gen_range(0.08..0.30);
        match rng.gen_range(0..3u8) {
            0 => {
                let cx = rng.gen_range(0..CANVAS_SIZE) as i64;
                let cy = rng.gen_range(0..CANVAS_SIZE) as i64;
                let radius = rng.gen_range(30..140) as i64;
                canvas.fill_circle(cx, cy, radius, accent, alpha);
            }
            1 => {
                let x1 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let y1 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let x2 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let y2 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let thickness = rng.gen_range(1..=4);
                canvas.line(x1, y1, x2, y2, thickness, accent, alpha);
            }
            _ => {
                let x1 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let y1 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let x2 = rng.gen_range(0..CANVAS_SIZE) as i64;
                let y2 = rng.gen_range(0..CANVAS_SIZE) as i64;
                canvas.rect_outline(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2), accent, alpha);
            }
        }
    }

    // Legacy-style framed border.
    let margin = BORDER_MARGIN as i64;
    let edge = (CANVAS_SIZE as i64) - margin - 1;
    for inset in 0..2 {
        canvas.rect_outline(margin + inset, margin + inset, edge - inset, edge - inset, accent, 1.0);
    }

    canvas.encode_png()
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    fn new(width: u32, height: u32, background: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            pixels.extend_from_slice(&background);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: [u8; 3], alpha: f64) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let index = ((y as u32 * self.width + x as u32) * 3) as usize;
        for channel in 0..3 {
            let old = f64::from(self.pixels[index + channel]);
            let new = f64::from(color[channel]);
            self.pixels[index + channel] = (old * (1.0 - alpha) + new * alpha).round() as u8;
        }
    }

    fn fill_circle(&mut self, cx: i64, cy: i64, radius: i64, color: [u8; 3], alpha: f64) {
        let r_sq = radius * radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= r_sq {
                    self.blend(cx + dx, cy + dy, color, alpha);
                }
            }
        }
    }

    fn line(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, thickness: i64, color: [u8; 3], alpha: f64) {
        // Bresenham with a square brush.
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x1, y1);
        loop {
            for by in 0..thickness {
                for bx in 0..thickness {
                    self.blend(x + bx, y + by, color, alpha);
                }
            }
            if x == x2 && y == y2 {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x += sx;
            }
            if doubled <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn rect_outline(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, color: [u8; 3], alpha: f64) {
        for x in x1..=x2 {
            self.blend(x, y1, color, alpha);
            self.blend(x, y2, color, alpha);
        }
        for y in y1..=y2 {
            self.blend(x1, y, color, alpha);
            self.blend(x2, y, color, alpha);
        }
    }

    /// Encode as an 8-bit RGB PNG: IHDR, one zlib IDAT of filter-0
    /// scanlines, IEND.
    fn encode_png(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.pixels.len() + self.height as usize);
        let stride = (self.width * 3) as usize;
        for row in self.pixels.chunks(stride) {
            raw.push(0); // filter type: None
            raw.extend_from_slice(row);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &raw).expect("in-memory zlib write");
        let idat = encoder.finish().expect("in-memory zlib finish");

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&self.width.to_be_bytes());
        ihdr.extend_from_slice(&self.height.to_be_bytes());
        // bit depth 8, color type 2 (truecolor), compression 0, filter 0,
        // interlace 0
        ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

        let mut png = Vec::with_capacity(idat.len() + 64);
        png.extend_from_slice(b"\x89PNG\r\n\x1a\n");
        write_chunk(&mut png, b"IHDR", &ihdr);
        write_chunk(&mut png, b"IDAT", &idat);
        write_chunk(&mut png, b"IEND", &[]);
        png
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> [u8; 3] {
    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    [
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    ]
}
