use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn is_data_uri(raw: &str) -> bool {
    raw.trim_start()
        .get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

pub fn encode(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Encodes with the mime type sniffed from the image header, falling back to
/// `application/octet-stream` for unrecognized content.
pub fn encode_sniffed(bytes: &[u8]) -> String {
    encode(bytes, sniff_mime(bytes))
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

pub fn decode(raw: &str) -> Result<DataUri> {
    let value = raw.trim();
    if !is_data_uri(value) {
        bail!("not a data URI");
    }
    let Some((header, payload)) = value[5..].split_once(',') else {
        bail!("data URI is missing its payload separator");
    };
    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or("text/plain")
        .to_ascii_lowercase();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        bail!("only base64 data URIs are supported");
    }
    let bytes = BASE64
        .decode(payload.trim())
        .context("data URI payload is not valid base64")?;
    Ok(DataUri { mime_type, bytes })
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    if lowered.contains("png") {
        return "png";
    }
    "bin"
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, encode_sniffed, extension_for_mime, is_data_uri};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    #[test]
    fn encode_then_decode_keeps_mime_and_bytes() -> anyhow::Result<()> {
        let uri = encode(b"hello", "image/jpeg");
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        let decoded = decode(&uri)?;
        assert_eq!(decoded.mime_type, "image/jpeg");
        assert_eq!(decoded.bytes, b"hello".to_vec());
        Ok(())
    }

    #[test]
    fn sniffed_upload_gets_png_mime() {
        let uri = encode_sniffed(PNG_MAGIC);
        assert!(uri.starts_with("data:image/png;base64,"));
        let unknown = encode_sniffed(b"not an image");
        assert!(unknown.starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn decode_rejects_non_base64_and_non_data_uris() {
        assert!(decode("https://cdn.example/a.png").is_err());
        assert!(decode("data:text/plain,hello").is_err());
        assert!(decode("data:image/png;base64").is_err());
        assert!(decode("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn data_uri_detection_is_case_insensitive() {
        assert!(is_data_uri("DATA:image/png;base64,AAAA"));
        assert!(!is_data_uri("blob:strata/1"));
        assert!(!is_data_uri("dat"));
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }
}
