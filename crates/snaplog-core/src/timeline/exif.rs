//! Capture time embedded in image binaries.

use super::parse::parse_text;
use chrono::{DateTime, FixedOffset};
use exif::{In, Reader, Tag, Value};
use log::debug;
use std::io::Cursor;

/// Tags consulted in order.
const DATE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTime];

/// Read `DateTimeOriginal`, then `DateTime`, from JPEG/TIFF/HEIF/PNG/WebP
/// bytes. Unreadable containers yield `None`.
pub fn read_capture_time(bytes: &[u8], offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(err) => {
            debug!("no readable exif (bytes={}, err={})", bytes.len(), err);
            return None;
        }
    };
    DATE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        let Value::Ascii(chunks) = &field.value else {
            return None;
        };
        chunks
            .iter()
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .find_map(|text| parse_text(text.trim_end_matches('\0'), offset))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_image_bytes_have_no_capture_time() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        assert_eq!(read_capture_time(b"definitely not an image", offset), None);
        assert_eq!(read_capture_time(&[], offset), None);
    }
}
