//! # Frame Encoder
//!
//! Turns a borrowed raw frame into an owned JPEG. Rows are copied out of the
//! (possibly padded) source buffer into a tightly packed RGB8 image, or L8 for
//! grayscale, which is what the JPEG encoder accepts.

use std::fmt;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::capture::engine::{PixelFormat, RawFrame};
use crate::core::frame_slot::EncodedFrame;

/// Default JPEG quality, matching what browsers receive from most MJPEG
/// cameras.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Why a single frame could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    InvalidDimensions { width: u32, height: u32 },
    BufferTooSmall { expected: usize, actual: usize },
    StrideTooSmall { stride: usize, row_bytes: usize },
    Compression(String),
    EmptyPayload,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidDimensions { width, height } => {
                write!(f, "invalid frame dimensions {width}x{height}")
            }
            EncodeError::BufferTooSmall { expected, actual } => {
                write!(f, "frame buffer too small: need {expected} bytes, got {actual}")
            }
            EncodeError::StrideTooSmall { stride, row_bytes } => {
                write!(f, "stride {stride} is smaller than a row of {row_bytes} bytes")
            }
            EncodeError::Compression(reason) => write!(f, "JPEG compression failed: {reason}"),
            EncodeError::EmptyPayload => write!(f, "encoder produced an empty payload"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// JPEG encoder with a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// Quality is clamped to the JPEG range 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one frame.
    pub fn encode(&self, frame: &RawFrame<'_>) -> Result<EncodedFrame, EncodeError> {
        let (pixels, color) = normalize(frame)?;

        let mut out = Vec::with_capacity(pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&pixels, frame.width, frame.height, color)
            .map_err(|e| EncodeError::Compression(e.to_string()))?;

        EncodedFrame::jpeg(out, frame.width, frame.height).ok_or(EncodeError::EmptyPayload)
    }
}

/// Copy the visible part of every row into a packed RGB8 or L8 buffer.
fn normalize(frame: &RawFrame<'_>) -> Result<(Vec<u8>, ExtendedColorType), EncodeError> {
    let (width, height) = (frame.width as usize, frame.height as usize);
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions {
            width: frame.width,
            height: frame.height,
        });
    }

    let bpp = frame.format.bytes_per_pixel();
    let row_bytes = width * bpp;
    if frame.stride < row_bytes {
        return Err(EncodeError::StrideTooSmall {
            stride: frame.stride,
            row_bytes,
        });
    }

    // The last row need not be padded out to the full stride.
    let expected = frame.stride * (height - 1) + row_bytes;
    if frame.data.len() < expected {
        return Err(EncodeError::BufferTooSmall {
            expected,
            actual: frame.data.len(),
        });
    }

    let rows = frame
        .data
        .chunks(frame.stride)
        .take(height)
        .map(|row| &row[..row_bytes]);

    let packed = match frame.format {
        PixelFormat::Gray8 => {
            let mut out = Vec::with_capacity(width * height);
            rows.for_each(|row| out.extend_from_slice(row));
            return Ok((out, ExtendedColorType::L8));
        }
        PixelFormat::Rgb => {
            let mut out = Vec::with_capacity(width * height * 3);
            rows.for_each(|row| out.extend_from_slice(row));
            out
        }
        PixelFormat::Bgr => swizzle(rows, width * height, 3, [2, 1, 0]),
        PixelFormat::Rgba => swizzle(rows, width * height, 4, [0, 1, 2]),
        PixelFormat::Bgra => swizzle(rows, width * height, 4, [2, 1, 0]),
    };
    Ok((packed, ExtendedColorType::Rgb8))
}

fn swizzle<'a>(
    rows: impl Iterator<Item = &'a [u8]>,
    pixels: usize,
    bpp: usize,
    order: [usize; 3],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels * 3);
    for row in rows {
        for px in row.chunks_exact(bpp) {
            out.extend_from_slice(&[px[order[0]], px[order[1]], px[order[2]]]);
        }
    }
    out
}
