// flockscan-preprocess/src/lib.rs
// ============================================================
// Frame canonicalisation for flockscan
// Turns an arbitrary-size RGB/BGR frame (or an image file) into
// the 1×128×128 grayscale tensor in [-1, 1] the network eats.
// ------------------------------------------------------------
// Pipeline: bytes → gray u8 → centre square → 128² → f32 [-1,1]
// ------------------------------------------------------------
// Public API
//   * Preprocessor::run(&FrameView)   – in-memory frame
//   * Preprocessor::run_path(path)    – decode via `image`
//   * gray / crop / resize / normalize helpers, all pure
// ============================================================

//! flockscan – preprocessing layer
//!
//! Every step takes explicit width, height and stride parameters so the
//! byte-level arithmetic can be tested in isolation.  The output is an
//! [`ndarray::Array3<f32>`] in CHW order with a single channel.

use image::{imageops, imageops::FilterType, GrayImage};
use log::debug;
use ndarray::Array3;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Side of the canonical square tensor.
pub const INPUT_SIZE: u32 = 128;

/// Bytes per interleaved colour pixel.
const BPP: usize = 3;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Byte order of an interleaved 3-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Borrowed interleaved 8-bit colour frame.
///
/// `stride` is the number of bytes per row and may exceed `width * 3`
/// when the producer pads its rows.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub order: ChannelOrder,
}

impl<'a> FrameView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: u32, order: ChannelOrder) -> Self {
        Self { data, width, height, stride, order }
    }

    /// Tightly packed frame, `stride == width * 3`.
    pub fn packed(data: &'a [u8], width: u32, height: u32, order: ChannelOrder) -> Self {
        Self::new(data, width, height, width * BPP as u32, order)
    }

    /// Check that every pixel the transform touches lies inside `data`.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PreprocessError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let row_bytes = self.width as usize * BPP;
        let stride = self.stride as usize;
        if stride < row_bytes {
            return Err(PreprocessError::InvalidFrame(format!(
                "stride {} shorter than row of {} bytes",
                stride, row_bytes
            )));
        }
        let needed = stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(PreprocessError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} stride {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                stride,
                needed
            )));
        }
        Ok(())
    }
}

/// BT.601 luma, rounded to nearest and clamped to 0..=255.
#[inline]
pub fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299f32 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    (y.clamp(0.0, 255.0) + 0.5) as u8
}

/// Collapse a validated frame into a packed `width * height` gray plane.
pub fn frame_to_gray(frame: &FrameView) -> Result<Vec<u8>> {
    frame.validate()?;
    let (w, h) = (frame.width as usize, frame.height as usize);
    let stride = frame.stride as usize;

    let mut gray = Vec::with_capacity(w * h);
    for y in 0..h {
        let row = &frame.data[y * stride..y * stride + w * BPP];
        for px in row.chunks_exact(BPP) {
            let v = match frame.order {
                ChannelOrder::Rgb => rgb_to_gray(px[0], px[1], px[2]),
                ChannelOrder::Bgr => rgb_to_gray(px[2], px[1], px[0]),
            };
            gray.push(v);
        }
    }
    Ok(gray)
}

/// Centre square crop window `(x0, y0, side)` for a `width × height` plane.
///
/// Centres use floor division, so for odd sizes the window leans towards
/// the top-left.  The window always lies inside the plane.
pub fn crop_window(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    let x0 = width / 2 - side / 2;
    let y0 = height / 2 - side / 2;
    (x0, y0, side)
}

/// Copy the centre square out of a packed gray plane.
pub fn center_crop_square(gray: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (x0, y0, side) = crop_window(width, height);
    let (w, x0, y0, side) = (width as usize, x0 as usize, y0 as usize, side as usize);

    let mut out = Vec::with_capacity(side * side);
    for y in 0..side {
        let start = (y0 + y) * w + x0;
        out.extend_from_slice(&gray[start..start + side]);
    }
    out
}

/// Triangle (tent) filter resize of a square gray plane.
///
/// When shrinking, the tent widens by the scale ratio, so every source
/// pixel contributes with an area weight; this is not 2-tap bilinear.
pub fn resize_square(square: Vec<u8>, side: u32, dst_side: u32) -> Result<Vec<u8>> {
    let img = GrayImage::from_raw(side, side, square).ok_or_else(|| {
        PreprocessError::InvalidFrame(format!("square plane does not hold {}x{} pixels", side, side))
    })?;
    if side == dst_side {
        return Ok(img.into_raw());
    }
    Ok(imageops::resize(&img, dst_side, dst_side, FilterType::Triangle).into_raw())
}

/// Map 0..=255 onto [-1, 1] and pack as a `(1, side, side)` tensor.
pub fn normalize(pixels: &[u8], side: u32) -> Array3<f32> {
    let side = side as usize;
    Array3::from_shape_fn((1, side, side), |(_, y, x)| {
        (pixels[y * side + x] as f32 / 255.0 - 0.5) / 0.5
    })
}

/// Converts colour frames into the canonical network input.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    side: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(INPUT_SIZE)
    }
}

impl Preprocessor {
    /// Create a pre‑processor that outputs a `1×side×side` tensor.
    pub fn new(side: u32) -> Self {
        Self { side }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// In-memory frame path.
    pub fn run(&self, frame: &FrameView) -> Result<Array3<f32>> {
        // 1. collapse to gray
        let gray = frame_to_gray(frame)?;

        // 2. centre square
        let (_, _, side) = crop_window(frame.width, frame.height);
        let square = center_crop_square(&gray, frame.width, frame.height);

        // 3. tent-filter resize to the canonical side
        let resized = resize_square(square, side, self.side)?;

        debug!(
            "preprocess {}x{} ({:?}) -> crop {} -> {}x{}",
            frame.width, frame.height, frame.order, side, self.side, self.side
        );

        // 4. normalize to [-1, 1]
        Ok(normalize(&resized, self.side))
    }

    /// Decode an image file (forced to RGB8) and run it through [`Self::run`].
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<Array3<f32>> {
        let path = path.as_ref();
        let rgb = image::open(path)
            .map_err(|source| PreprocessError::Decode { path: path.to_path_buf(), source })?
            .to_rgb8();
        let (w, h) = rgb.dimensions();
        let frame = FrameView::packed(rgb.as_raw(), w, h, ChannelOrder::Rgb);
        self.run(&frame)
    }
}
