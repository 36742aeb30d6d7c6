//! Request fingerprints.

use sandpiper_types::ExtractionRequest;
use sha2::{Digest, Sha256};

/// 32-hex-character fingerprint of an extraction request.
///
/// The digest is the first 16 bytes of SHA-256 over the canonical string
/// `url|kind|selector|wait|opts`. The rendering is a cross-instance
/// contract: every process sharing a store must produce identical keys for
/// identical requests.
pub fn fingerprint(request: &ExtractionRequest) -> String {
    let canonical = request.canonical_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpiper_types::{
        ExtractionKind, ExtractionOptions, HtmlOptions, WaitPolicy,
    };

    #[test]
    fn fingerprint_is_32_hex_chars() {
        let req = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1");
        let key = fingerprint(&req);
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn equal_canonical_strings_produce_equal_digests() {
        let a = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1")
            .with_options(ExtractionOptions::Html(HtmlOptions {
                multiple: true,
                clean_html: true,
                ..Default::default()
            }));
        let b = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1")
            .with_options(ExtractionOptions::Html(HtmlOptions {
                clean_html: true,
                multiple: true,
                ..Default::default()
            }));
        assert_eq!(a.canonical_string(), b.canonical_string());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn any_field_change_changes_the_key() {
        let base = ExtractionRequest::new("https://ex.com/", ExtractionKind::Html, "h1");
        let key = fingerprint(&base);

        let mut other = base.clone();
        other.selector = "h2".to_string();
        assert_ne!(fingerprint(&other), key);

        let mut other = base.clone();
        other.wait = WaitPolicy::NetworkIdle;
        assert_ne!(fingerprint(&other), key);

        let mut other = base.clone();
        other.kind = ExtractionKind::Css;
        other.options = ExtractionOptions::default_for(ExtractionKind::Css);
        assert_ne!(fingerprint(&other), key);
    }
}
