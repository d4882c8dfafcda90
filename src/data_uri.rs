use base64::{Engine, engine::general_purpose};
use thiserror::Error;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUriError {
    #[error("not a data URI")]
    MissingScheme,

    #[error("data URI has no payload separator")]
    MissingPayload,

    #[error("only base64-encoded data URIs are supported")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Build a data URI from an already base64-encoded payload.
pub fn from_base64(mime_type: &str, payload: &str) -> String {
    format!("data:{};base64,{}", mime_type, payload)
}

pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    from_base64(mime_type, &general_purpose::STANDARD.encode(bytes))
}

pub fn decode(uri: &str) -> Result<DataUri, DataUriError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUriError::MissingScheme)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::MissingPayload)?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default().trim().to_string();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUriError::NotBase64);
    }

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| DataUriError::InvalidBase64(e.to_string()))?;

    Ok(DataUri { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_decode_keeps_bytes_and_mime() {
        let uri = encode(JPEG_MIME, &[0xFF, 0xD8, 0xFF, 0x00]);
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let decoded = decode(&uri).unwrap();
        assert_eq!(decoded.mime_type, "image/jpeg");
        assert_eq!(decoded.bytes, vec![0xFF, 0xD8, 0xFF, 0x00]);
    }

    #[test]
    fn test_decode_rejects_plain_urls() {
        assert_eq!(
            decode("https://example.com/image.jpg"),
            Err(DataUriError::MissingScheme)
        );
    }

    #[test]
    fn test_decode_rejects_percent_encoded_payloads() {
        assert_eq!(decode("data:text/plain,hello"), Err(DataUriError::NotBase64));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert_eq!(
            decode("data:image/jpeg;base64"),
            Err(DataUriError::MissingPayload)
        );
    }

    #[test]
    fn test_decode_reports_bad_base64() {
        assert!(matches!(
            decode("data:image/jpeg;base64,@@@"),
            Err(DataUriError::InvalidBase64(_))
        ));
    }
}
