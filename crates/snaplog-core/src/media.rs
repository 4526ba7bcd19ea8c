//! Image payload handling: data-URL decoding, format sniffing and conversion
//! into generation-service attachments.

use crate::error::SnaplogCoreError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use snaplog_protocol::{ImagePayload, PhotoData, PhotoInput};
use std::borrow::Cow;

/// Mime type used when the format cannot be recognised.
const DEFAULT_MIME: &str = "image/jpeg";

/// Guess an image mime type from its leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..] if brand.len() >= 4 => {
            match &brand[..4] {
                b"heic" | b"heix" | b"hevc" | b"hevx" => Some("image/heic"),
                b"mif1" | b"msf1" | b"heif" => Some("image/heif"),
                b"avif" => Some("image/avif"),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Split a `data:image/...;base64,` URL into its mime type and raw bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), String> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| "data URL must start with `data:`".to_string())?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URL has no payload separator".to_string())?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| "data URL payload must be base64".to_string())?;
    if !mime.starts_with("image/") {
        return Err(format!("unsupported media type `{mime}`"));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| format!("invalid base64 payload: {err}"))?;
    if bytes.is_empty() {
        return Err("empty image payload".to_string());
    }
    Ok((mime.to_string(), bytes))
}

/// Encode raw bytes as a data URL, sniffing the mime type.
pub fn encode_data_url(bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes).unwrap_or(DEFAULT_MIME);
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Validate a photo and build the attachment sent to the generation service.
pub fn image_payload(photo: &PhotoInput) -> Result<ImagePayload, SnaplogCoreError> {
    let invalid = |reason: String| SnaplogCoreError::InvalidImage {
        index: photo.original_index,
        reason,
    };
    let url = match &photo.data {
        PhotoData::Bytes(bytes) if bytes.is_empty() => {
            return Err(invalid("empty image payload".to_string()));
        }
        PhotoData::Bytes(bytes) => encode_data_url(bytes),
        PhotoData::DataUrl(url) => {
            decode_data_url(url).map_err(invalid)?;
            url.trim().to_string()
        }
        PhotoData::Url(url) if url.trim().is_empty() => {
            return Err(invalid("empty image url".to_string()));
        }
        PhotoData::Url(url) => url.trim().to_string(),
    };
    Ok(ImagePayload { url })
}

/// Raw bytes available locally for metadata inspection.
pub fn local_bytes(photo: &PhotoInput) -> Option<Cow<'_, [u8]>> {
    match &photo.data {
        PhotoData::Bytes(bytes) => Some(Cow::Borrowed(bytes.as_slice())),
        PhotoData::DataUrl(url) => decode_data_url(url).ok().map(|(_, bytes)| Cow::Owned(bytes)),
        PhotoData::Url(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mime(JPEG_HEADER), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n"), Some("image/png"));
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime(b"\0\0\0\x18ftypheic\0\0"), Some("image/heic"));
        assert_eq!(sniff_mime(b"plain text"), None);
    }

    #[test]
    fn bytes_become_data_urls() {
        let photo = PhotoInput::new(0, PhotoData::Bytes(JPEG_HEADER.to_vec()));
        let payload = image_payload(&photo).expect("payload");
        assert!(payload.url.starts_with("data:image/jpeg;base64,"));
        let (mime, bytes) = decode_data_url(&payload.url).expect("decode");
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, JPEG_HEADER.to_vec());
    }

    #[test]
    fn rejects_malformed_payloads_with_index() {
        let empty = PhotoInput::new(3, PhotoData::Bytes(Vec::new()));
        let err = image_payload(&empty).unwrap_err();
        assert!(matches!(err, SnaplogCoreError::InvalidImage { index: 3, .. }));

        let not_base64 = PhotoInput::new(1, PhotoData::DataUrl("data:image/png;base64,@@@".into()));
        assert!(image_payload(&not_base64).is_err());

        let not_image = PhotoInput::new(2, PhotoData::DataUrl("data:text/plain;base64,aGk=".into()));
        assert!(image_payload(&not_image).is_err());
    }

    #[test]
    fn remote_urls_have_no_local_bytes() {
        let photo = PhotoInput::new(0, PhotoData::Url("https://example.com/a.jpg".into()));
        assert!(local_bytes(&photo).is_none());
        assert_eq!(
            image_payload(&photo).expect("payload").url,
            "https://example.com/a.jpg"
        );
    }
}
