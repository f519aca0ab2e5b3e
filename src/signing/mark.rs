use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use crate::errors::AppError;

/// Longest signer name accepted for a text mark.
pub const MAX_SIGNER_NAME_CHARS: usize = 120;

/// The visual artifact burned into a document.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureMark {
    /// A drawn signature, as decoded PNG or JPEG bytes.
    Image { bytes: Vec<u8> },
    /// A typed name, rendered with a signing timestamp.
    Text { signer_name: String },
}

impl SignatureMark {
    /// Decode an image mark from its transport form: either bare base64 or a
    /// `data:image/...;base64,` URL as produced by a browser canvas.
    pub fn image_from_encoded(encoded: &str) -> Result<Self, AppError> {
        let payload = match encoded.trim().strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| AppError::BadInput("data URL has no payload".to_string()))?;
                if !header.ends_with(";base64") {
                    return Err(AppError::BadInput(
                        "signature image data URL must be base64 encoded".to_string(),
                    ));
                }
                data
            }
            None => encoded.trim(),
        };

        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = B64
            .decode(compact.as_bytes())
            .map_err(|e| AppError::BadInput(format!("signature image is not valid base64: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::BadInput("signature image is empty".to_string()));
        }
        match image::guess_format(&bytes) {
            Ok(image::ImageFormat::Png) | Ok(image::ImageFormat::Jpeg) => {}
            _ => {
                return Err(AppError::BadInput(
                    "signature image must be PNG or JPEG".to_string(),
                ));
            }
        }
        Ok(SignatureMark::Image { bytes })
    }

    pub fn text(signer_name: &str) -> Result<Self, AppError> {
        let name = signer_name.trim();
        if name.is_empty() {
            return Err(AppError::BadInput("signer name is empty".to_string()));
        }
        if name.chars().count() > MAX_SIGNER_NAME_CHARS {
            return Err(AppError::BadInput(format!(
                "signer name longer than {MAX_SIGNER_NAME_CHARS} characters"
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(AppError::BadInput("signer name contains control characters".to_string()));
        }
        Ok(SignatureMark::Text {
            signer_name: name.to_string(),
        })
    }

    /// Build a mark from the loosely-typed fields a signing request carries.
    ///
    /// Callers should send exactly one of `image` or `typed_name`. When both
    /// arrive the image is used and the name ignored. With neither, the
    /// requester's own display name becomes a text mark.
    pub fn from_payload(
        image: Option<&str>,
        typed_name: Option<&str>,
        fallback_name: Option<&str>,
    ) -> Result<Self, AppError> {
        let image = image.filter(|s| !s.trim().is_empty());
        let typed_name = typed_name.filter(|s| !s.trim().is_empty());

        match (image, typed_name) {
            (Some(encoded), name) => {
                if name.is_some() {
                    log::warn!("Signing request carried both an image and a typed name; using the image");
                }
                Self::image_from_encoded(encoded)
            }
            (None, Some(name)) => Self::text(name),
            (None, None) => match fallback_name.filter(|s| !s.trim().is_empty()) {
                Some(name) => Self::text(name),
                None => Err(AppError::BadInput(
                    "a signature image or typed name is required".to_string(),
                )),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignatureMark::Image { .. } => "image",
            SignatureMark::Text { .. } => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    // 8-byte PNG signature followed by junk; enough for format sniffing.
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_data_url_and_bare_base64_decode_the_same() {
        let encoded = B64.encode(PNG_MAGIC);
        let from_url = SignatureMark::image_from_encoded(&format!("data:image/png;base64,{encoded}")).unwrap();
        let bare = SignatureMark::image_from_encoded(&encoded).unwrap();
        assert_eq!(from_url, bare);
        assert_eq!(from_url, SignatureMark::Image { bytes: PNG_MAGIC.to_vec() });
    }

    #[test]
    fn test_invalid_image_payloads_are_bad_input() {
        let gif = B64.encode(b"GIF89a not allowed");
        for payload in [
            "data:image/png;base64,***",
            "data:image/png,plain",
            "data:image/png;base64",
            gif.as_str(),
        ] {
            let err = SignatureMark::image_from_encoded(payload).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadInput, "{payload}");
        }
    }

    #[test]
    fn test_image_wins_over_typed_name() {
        let encoded = B64.encode(PNG_MAGIC);
        let mark = SignatureMark::from_payload(Some(&encoded), Some("Ada"), None).unwrap();
        assert_eq!(mark.kind(), "image");
    }

    #[test]
    fn test_typed_name_then_fallback() {
        let typed = SignatureMark::from_payload(None, Some("  Ada Lovelace "), Some("Owner")).unwrap();
        assert_eq!(typed, SignatureMark::Text { signer_name: "Ada Lovelace".to_string() });

        let fallback = SignatureMark::from_payload(Some(""), None, Some("Owner")).unwrap();
        assert_eq!(fallback, SignatureMark::Text { signer_name: "Owner".to_string() });

        let err = SignatureMark::from_payload(None, Some("   "), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn test_text_rejects_control_and_overlong_names() {
        assert!(SignatureMark::text("Ada\nLovelace").is_err());
        assert!(SignatureMark::text(&"x".repeat(MAX_SIGNER_NAME_CHARS + 1)).is_err());
        assert!(SignatureMark::text(&"x".repeat(MAX_SIGNER_NAME_CHARS)).is_ok());
    }
}
