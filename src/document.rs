//! The output-document collaborator contract and its PDF implementation.
//!
//! The downloader drives a [`DocumentSink`] one page at a time —
//! `set_page_size`, `draw_image`, `show_page` per page, one `save` at the
//! end — so an issue is never buffered whole in memory. [`PdfWriter`]
//! implements the contract by streaming objects straight into a minimal
//! PDF: each page becomes an image XObject (JPEG data embedded verbatim via
//! `DCTDecode`; anything else is transcoded to JPEG first) plus a one-line
//! content stream, and `save` appends the page tree, cross-reference table
//! and trailer.
//!
//! Writes go to a `.tmp` sibling and are renamed into place on `save`, so a
//! crashed or retried attempt never leaves a half-written PDF at the final
//! path; an unsaved writer removes its temp file on drop.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

use crate::error::DocumentError;

/// Quality used when a non-JPEG page has to be transcoded for embedding.
const TRANSCODE_JPEG_QUALITY: u8 = 90;

/// The paged-document writer contract.
///
/// Call order per page: `set_page_size` → `draw_image` → `show_page`.
/// `save` finalises the document; afterwards the sink must not be reused.
pub trait DocumentSink: Send {
    /// Set the size of the page currently being built, in pixels.
    fn set_page_size(&mut self, width: u32, height: u32) -> Result<(), DocumentError>;

    /// Place an image at the page origin, covering `width` × `height`.
    fn draw_image(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), DocumentError>;

    /// Commit the current page and start a fresh one.
    fn show_page(&mut self) -> Result<(), DocumentError>;

    /// Finalise and persist the document.
    fn save(&mut self) -> Result<(), DocumentError>;
}

/// Creates one [`DocumentSink`] per issue (and per retry attempt).
pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn DocumentSink>, DocumentError>;
}

/// [`SinkFactory`] producing [`PdfWriter`]s.
pub struct PdfSinkFactory;

impl SinkFactory for PdfSinkFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn DocumentSink>, DocumentError> {
        Ok(Box::new(PdfWriter::create(path)?))
    }
}

/// Streaming one-page-at-a-time PDF writer.
pub struct PdfWriter {
    file: BufWriter<File>,
    path: PathBuf,
    tmp_path: PathBuf,
    /// Byte offset of every written object, keyed by object id.
    offsets: BTreeMap<u32, u64>,
    /// Object ids of committed pages, in page order.
    page_ids: Vec<u32>,
    /// Next free object id. Ids 1 (catalog) and 2 (page tree) are reserved
    /// and written during `save`.
    next_id: u32,
    /// Running byte position in the output file.
    position: u64,
    page_size: Option<(u32, u32)>,
    /// XObject id and draw dimensions of the image placed on the current page.
    pending_image: Option<(u32, u32, u32)>,
    saved: bool,
}

impl PdfWriter {
    /// Open a writer targeting `path`; bytes accumulate in `path.tmp` until
    /// [`DocumentSink::save`] renames it into place.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let tmp_path = path.with_extension("pdf.tmp");
        let file = BufWriter::new(File::create(&tmp_path)?);

        let mut writer = PdfWriter {
            file,
            path,
            tmp_path,
            offsets: BTreeMap::new(),
            page_ids: Vec::new(),
            next_id: 3,
            position: 0,
            page_size: None,
            pending_image: None,
            saved: false,
        };
        // Binary marker comment keeps transfer tools from treating the file
        // as text.
        writer.write_raw(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n")?;
        Ok(writer)
    }

    /// Number of pages committed so far.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), DocumentError> {
        self.file.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn write_object(&mut self, id: u32, body: &str) -> Result<(), DocumentError> {
        self.offsets.insert(id, self.position);
        self.write_raw(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes())
    }

    fn write_stream_object(
        &mut self,
        id: u32,
        dict: &str,
        data: &[u8],
    ) -> Result<(), DocumentError> {
        self.offsets.insert(id, self.position);
        self.write_raw(format!("{id} 0 obj\n{dict}\nstream\n").as_bytes())?;
        self.write_raw(data)?;
        self.write_raw(b"\nendstream\nendobj\n")
    }
}

impl DocumentSink for PdfWriter {
    fn set_page_size(&mut self, width: u32, height: u32) -> Result<(), DocumentError> {
        self.page_size = Some((width, height));
        Ok(())
    }

    fn draw_image(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), DocumentError> {
        // JPEG embeds verbatim through DCTDecode; anything else (e.g. PNG
        // spreads) is transcoded once here.
        let jpeg: std::borrow::Cow<'_, [u8]> = if bytes.starts_with(&[0xFF, 0xD8]) {
            std::borrow::Cow::Borrowed(bytes)
        } else {
            debug!("Transcoding non-JPEG page image ({} bytes) for embedding", bytes.len());
            let decoded = image::load_from_memory(bytes)?.to_rgb8();
            let mut out = Cursor::new(Vec::new());
            let encoder = JpegEncoder::new_with_quality(&mut out, TRANSCODE_JPEG_QUALITY);
            image::DynamicImage::ImageRgb8(decoded).write_with_encoder(encoder)?;
            std::borrow::Cow::Owned(out.into_inner())
        };

        let id = self.alloc_id();
        let dict = format!(
            "<< /Type /XObject /Subtype /Image /Width {width} /Height {height} \
/ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>",
            jpeg.len()
        );
        self.write_stream_object(id, &dict, &jpeg)?;
        self.pending_image = Some((id, width, height));
        Ok(())
    }

    fn show_page(&mut self) -> Result<(), DocumentError> {
        let (page_w, page_h) = self
            .page_size
            .ok_or(DocumentError::Protocol("show_page before set_page_size"))?;
        let (image_id, draw_w, draw_h) = self
            .pending_image
            .take()
            .ok_or(DocumentError::Protocol("show_page before draw_image"))?;

        let name = format!("Im{}", self.page_ids.len());
        let content = format!("q\n{draw_w} 0 0 {draw_h} 0 0 cm\n/{name} Do\nQ\n");

        let content_id = self.alloc_id();
        self.write_stream_object(
            content_id,
            &format!("<< /Length {} >>", content.len()),
            content.as_bytes(),
        )?;

        let page_id = self.alloc_id();
        self.write_object(
            page_id,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {page_w} {page_h}] \
/Resources << /XObject << /{name} {image_id} 0 R >> >> /Contents {content_id} 0 R >>"
            ),
        )?;
        self.page_ids.push(page_id);
        Ok(())
    }

    fn save(&mut self) -> Result<(), DocumentError> {
        if self.saved {
            return Err(DocumentError::Protocol("save called twice"));
        }

        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        self.write_object(
            2,
            &format!(
                "<< /Type /Pages /Kids [ {kids} ] /Count {} >>",
                self.page_ids.len()
            ),
        )?;
        self.write_object(1, "<< /Type /Catalog /Pages 2 0 R >>")?;

        // Cross-reference table: one fixed-width 20-byte line per object,
        // in object-id order.
        let xref_position = self.position;
        let size = self.next_id;
        self.write_raw(format!("xref\n0 {size}\n").as_bytes())?;
        self.write_raw(b"0000000000 65535 f \n")?;
        for id in 1..size {
            let offset = self.offsets[&id];
            self.write_raw(format!("{offset:010} 00000 n \n").as_bytes())?;
        }
        self.write_raw(
            format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_position}\n%%EOF\n")
                .as_bytes(),
        )?;

        self.file.flush()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.saved = true;
        debug!("Saved {} pages to {}", self.page_ids.len(), self.path.display());
        Ok(())
    }
}

impl Drop for PdfWriter {
    fn drop(&mut self) {
        // A discarded attempt leaves no partial file behind.
        if !self.saved {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn tiny_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
            .unwrap();
        out.into_inner()
    }

    fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 10]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn write_page(writer: &mut PdfWriter, bytes: &[u8], w: u32, h: u32) {
        writer.set_page_size(w, h).unwrap();
        writer.draw_image(bytes, w, h).unwrap();
        writer.show_page().unwrap();
    }

    #[test]
    fn writes_a_structurally_sound_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.pdf");

        let mut writer = PdfWriter::create(&path).unwrap();
        write_page(&mut writer, &tiny_jpeg(8, 12), 8, 12);
        write_page(&mut writer, &tiny_jpeg(16, 12), 16, 12);
        assert_eq!(writer.page_count(), 2);
        writer.save().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/Filter /DCTDecode"));
        assert!(text.contains("/MediaBox [0 0 16 12]"));
        assert!(text.ends_with("%%EOF\n"));
        // Both JPEG payloads are embedded verbatim.
        assert_eq!(text.matches("/Subtype /Image").count(), 2);
    }

    #[test]
    fn transcodes_png_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.pdf");

        let mut writer = PdfWriter::create(&path).unwrap();
        write_page(&mut writer, &tiny_png(6, 6), 6, 6);
        writer.save().unwrap();

        let text = String::from_utf8_lossy(&std::fs::read(&path).unwrap()).to_string();
        // PNG never lands in the file directly; it is embedded as DCTDecode.
        assert!(text.contains("/Filter /DCTDecode"));
        assert!(!text.contains("/FlateDecode"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.pdf");

        let mut writer = PdfWriter::create(&path).unwrap();
        write_page(&mut writer, &tiny_jpeg(4, 4), 4, 4);
        writer.save().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let xref_at = text.rfind("xref\n").unwrap();
        // Skip "xref", the subsection header, and the free entry; every
        // in-use entry's offset must land on "N 0 obj".
        for line in text[xref_at..].lines().skip(3).take(5) {
            let offset: usize = line[..10].parse().unwrap();
            let tail = &bytes[offset..offset + 8];
            let tail = String::from_utf8_lossy(tail);
            assert!(tail.contains("0 obj"), "offset {offset} points at {tail:?}");
        }
    }

    #[test]
    fn unsaved_writer_cleans_up_its_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issue.pdf");
        let tmp = path.with_extension("pdf.tmp");

        {
            let mut writer = PdfWriter::create(&path).unwrap();
            write_page(&mut writer, &tiny_jpeg(4, 4), 4, 4);
            assert!(tmp.exists());
            // Dropped without save — a failed attempt.
        }
        assert!(!tmp.exists());
        assert!(!path.exists());
    }

    #[test]
    fn show_page_requires_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PdfWriter::create(dir.path().join("x.pdf")).unwrap();
        writer.set_page_size(10, 10).unwrap();
        assert!(matches!(
            writer.show_page(),
            Err(DocumentError::Protocol(_))
        ));
    }
}
