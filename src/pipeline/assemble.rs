//! Spread assembly: fold captured pages into document pages.
//!
//! The viewer hands back an asymmetric stream — one cover, then pairs of
//! left/right canvases, any of which may be Absent after capture retries
//! ran dry. The assembler turns that into fixed document pages:
//!
//! * left Absent → the whole pair is dropped. This loses a present right
//!   capture too; that mirrors the archive viewer's own pairing behaviour
//!   and is surfaced loudly as a skip warning rather than silently
//!   repaired.
//! * right Absent → the left page passes through untouched as a lone page.
//! * both present → stitched side-by-side onto an opaque white canvas and
//!   re-encoded with the configured format/quality.
//!
//! Stitching never scales or crops: the canvas is `left.width +
//! right.width` wide and `max(left.height, right.height)` tall, so a
//! shorter image leaves a white band under it.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use tracing::warn;

use crate::config::ImageFormat;
use crate::error::IssueError;
use crate::pipeline::capture::PageCapture;

/// One finished page, ready for the document sink.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// What a (left, right) pair produced.
#[derive(Debug)]
pub enum SpreadOutcome {
    /// The left capture was Absent; nothing was emitted.
    Skipped,
    /// Only the left page survived; passed through unchanged.
    Single(DocumentPage),
    /// Both pages present, stitched into one spread.
    Stitched(DocumentPage),
}

impl SpreadOutcome {
    /// Progress units this outcome represents (single pages committed).
    pub fn units(&self) -> u64 {
        match self {
            SpreadOutcome::Skipped => 0,
            SpreadOutcome::Single(_) => 1,
            SpreadOutcome::Stitched(_) => 2,
        }
    }

    pub fn into_page(self) -> Option<DocumentPage> {
        match self {
            SpreadOutcome::Skipped => None,
            SpreadOutcome::Single(page) | SpreadOutcome::Stitched(page) => Some(page),
        }
    }
}

/// Stitching configuration for one issue.
pub struct SpreadAssembler {
    format: ImageFormat,
    quality: u8,
}

impl SpreadAssembler {
    pub fn new(format: ImageFormat, quality: u8) -> Self {
        SpreadAssembler { format, quality }
    }

    /// The cover (or any page committed alone): pass the bytes through
    /// untouched. Returns `None` for an Absent capture.
    pub fn first_page(&self, capture: &PageCapture) -> Result<Option<DocumentPage>, IssueError> {
        let Some(bytes) = capture.bytes.as_ref() else {
            return Ok(None);
        };
        let (width, height) = dimensions(bytes, capture.index)?;
        Ok(Some(DocumentPage {
            bytes: bytes.clone(),
            width,
            height,
        }))
    }

    /// Apply the pair policy to a (left, right) capture pair.
    pub fn pair(
        &self,
        left: &PageCapture,
        right: &PageCapture,
    ) -> Result<SpreadOutcome, IssueError> {
        let Some(left_bytes) = left.bytes.as_ref() else {
            // Explicit data loss: the right capture, even if present, is
            // dropped with the pair.
            warn!(
                "Spread at canvas {} lost (left page absent{})",
                left.index,
                if right.is_absent() { "" } else { ", right page discarded" }
            );
            return Ok(SpreadOutcome::Skipped);
        };

        let Some(right_bytes) = right.bytes.as_ref() else {
            let (width, height) = dimensions(left_bytes, left.index)?;
            return Ok(SpreadOutcome::Single(DocumentPage {
                bytes: left_bytes.clone(),
                width,
                height,
            }));
        };

        let stitched = self.stitch(left_bytes, right_bytes, left.index)?;
        Ok(SpreadOutcome::Stitched(stitched))
    }

    /// Compose left and right side-by-side on a white canvas and re-encode.
    fn stitch(
        &self,
        left_bytes: &[u8],
        right_bytes: &[u8],
        index: u32,
    ) -> Result<DocumentPage, IssueError> {
        let left = decode(left_bytes, index)?.to_rgb8();
        let right = decode(right_bytes, index + 1)?.to_rgb8();

        let width = left.width() + right.width();
        let height = left.height().max(right.height());

        // Opaque white base so neither transparency nor a height mismatch
        // leaves undefined pixels.
        let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        image::imageops::replace(&mut canvas, &left, 0, 0);
        image::imageops::replace(&mut canvas, &right, i64::from(left.width()), 0);

        let bytes = self.encode(canvas, index)?;
        Ok(DocumentPage {
            bytes,
            width,
            height,
        })
    }

    fn encode(&self, canvas: RgbImage, index: u32) -> Result<Vec<u8>, IssueError> {
        let image = DynamicImage::ImageRgb8(canvas);
        let mut out = Cursor::new(Vec::new());
        let result = match self.format {
            ImageFormat::Jpeg => {
                image.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
            }
            ImageFormat::Png => image.write_with_encoder(PngEncoder::new(&mut out)),
        };
        result.map_err(|e| IssueError::Image {
            index,
            detail: e.to_string(),
        })?;
        Ok(out.into_inner())
    }
}

fn decode(bytes: &[u8], index: u32) -> Result<DynamicImage, IssueError> {
    image::load_from_memory(bytes).map_err(|e| IssueError::Image {
        index,
        detail: e.to_string(),
    })
}

/// Read image dimensions without a full pixel decode.
fn dimensions(bytes: &[u8], index: u32) -> Result<(u32, u32), IssueError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| IssueError::Image {
            index,
            detail: e.to_string(),
        })?;
    reader.into_dimensions().map_err(|e| IssueError::Image {
        index,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn jpeg_capture(index: u32, width: u32, height: u32, shade: u8) -> PageCapture {
        let img = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 95))
            .unwrap();
        PageCapture {
            index,
            bytes: Some(out.into_inner()),
        }
    }

    fn assembler() -> SpreadAssembler {
        SpreadAssembler::new(ImageFormat::Jpeg, 90)
    }

    #[test]
    fn absent_left_skips_the_pair() {
        let outcome = assembler()
            .pair(&PageCapture::absent(2), &PageCapture::absent(3))
            .unwrap();
        assert!(matches!(outcome, SpreadOutcome::Skipped));
        assert_eq!(outcome.units(), 0);

        // A present right page is dropped with the pair.
        let outcome = assembler()
            .pair(&PageCapture::absent(2), &jpeg_capture(3, 10, 14, 80))
            .unwrap();
        assert!(matches!(outcome, SpreadOutcome::Skipped));
    }

    #[test]
    fn absent_right_passes_left_through_untouched() {
        let left = jpeg_capture(4, 10, 14, 80);
        let left_bytes = left.bytes.clone().unwrap();

        let outcome = assembler().pair(&left, &PageCapture::absent(5)).unwrap();
        assert_eq!(outcome.units(), 1);
        let page = outcome.into_page().unwrap();
        assert_eq!(page.bytes, left_bytes);
        assert_eq!((page.width, page.height), (10, 14));
    }

    #[test]
    fn both_present_stitches_side_by_side() {
        let outcome = assembler()
            .pair(&jpeg_capture(2, 10, 14, 40), &jpeg_capture(3, 12, 10, 200))
            .unwrap();
        assert_eq!(outcome.units(), 2);
        let page = outcome.into_page().unwrap();
        assert_eq!(page.width, 22);
        assert_eq!(page.height, 14);

        let decoded = image::load_from_memory(&page.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (22, 14));
        // Shorter right image leaves a near-white band below it.
        let band = decoded.to_rgb8().get_pixel(15, 13).0;
        assert!(band.iter().all(|&c| c > 230), "band pixel: {band:?}");
        // Left pixels kept their (dark) shade.
        let left_px = decoded.to_rgb8().get_pixel(3, 3).0;
        assert!(left_px.iter().all(|&c| c < 90), "left pixel: {left_px:?}");
    }

    #[test]
    fn png_format_reencodes_as_png() {
        let assembler = SpreadAssembler::new(ImageFormat::Png, 90);
        let outcome = assembler
            .pair(&jpeg_capture(2, 4, 4, 10), &jpeg_capture(3, 4, 4, 240))
            .unwrap();
        let page = outcome.into_page().unwrap();
        assert!(page.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn first_page_passes_through_and_reports_dimensions() {
        let capture = jpeg_capture(1, 8, 6, 120);
        let original = capture.bytes.clone().unwrap();

        let page = assembler().first_page(&capture).unwrap().unwrap();
        assert_eq!(page.bytes, original);
        assert_eq!((page.width, page.height), (8, 6));

        assert!(assembler().first_page(&PageCapture::absent(1)).unwrap().is_none());
    }

    #[test]
    fn corrupt_present_bytes_are_a_structural_error() {
        let broken = PageCapture {
            index: 2,
            bytes: Some(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        };
        let err = assembler().pair(&broken, &jpeg_capture(3, 4, 4, 0)).unwrap_err();
        assert!(matches!(err, IssueError::Image { index: 2, .. }));
    }
}
