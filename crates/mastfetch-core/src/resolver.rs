//! Resolve archive product metadata into S3 key paths.
//!
//! The STScI public bucket mirrors the archive at
//! `s3://stpubdata/jwst/public/{program_id}/{filename}` where program_id is
//! the zero-padded 5-digit proposal number.

use serde::{Deserialize, Serialize};

/// Key prefix for public JWST data in the mirror bucket.
pub const S3_PREFIX: &str = "jwst/public";

/// One data product as reported by the upstream archive query service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Build an S3 key for a single product file.
///
/// The program id is taken from `program_id` when given, otherwise extracted
/// from the `jwNNNNN` prefix of the source id or the filename. Returns `None`
/// when no program id can be determined.
pub fn resolve_s3_key(
    filename: &str,
    source_id: Option<&str>,
    program_id: Option<&str>,
) -> Option<String> {
    let pid = extract_program_id(program_id, source_id, filename)?;
    Some(format!("{S3_PREFIX}/{pid:0>5}/{filename}"))
}

/// Resolve S3 keys for a product list. Products whose key cannot be
/// determined are dropped with a warning.
pub fn resolve_keys_from_products(products: &[Product]) -> Vec<(Product, String)> {
    let mut resolved = Vec::with_capacity(products.len());
    for product in products {
        match resolve_s3_key(
            &product.filename,
            product.source_id.as_deref(),
            product.program_id.as_deref(),
        ) {
            Some(key) => resolved.push((product.clone(), key)),
            None => {
                tracing::warn!(filename = %product.filename, "skipping product without resolvable S3 key");
            }
        }
    }
    tracing::info!(
        resolved = resolved.len(),
        total = products.len(),
        "resolved products to S3 keys"
    );
    resolved
}

fn extract_program_id(
    program_id: Option<&str>,
    source_id: Option<&str>,
    filename: &str,
) -> Option<String> {
    // Explicit program id wins; strip any non-digit prefix ("jw02733" -> "02733").
    if let Some(pid) = program_id {
        let digits: String = pid.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return Some(digits);
        }
    }
    if let Some(sid) = source_id {
        if let Some(pid) = program_from_jw_prefix(sid) {
            return Some(pid);
        }
    }
    program_from_jw_prefix(filename)
}

/// Extract the 5-digit program number from a `jwNNNNN...` identifier.
fn program_from_jw_prefix(s: &str) -> Option<String> {
    let rest = s
        .strip_prefix("jw")
        .or_else(|| s.strip_prefix("JW"))
        .or_else(|| s.strip_prefix("Jw"))
        .or_else(|| s.strip_prefix("jW"))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 5 {
        Some(digits[..5].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_filename_prefix() {
        let key = resolve_s3_key("jw02733-o001_t001_nircam_clear-f090w_i2d.fits", None, None);
        assert_eq!(
            key.as_deref(),
            Some("jwst/public/02733/jw02733-o001_t001_nircam_clear-f090w_i2d.fits")
        );
    }

    #[test]
    fn explicit_program_id_wins_and_is_padded() {
        let key = resolve_s3_key("file.fits", Some("jw09999-o1"), Some("2733"));
        assert_eq!(key.as_deref(), Some("jwst/public/02733/file.fits"));
    }

    #[test]
    fn program_id_from_source_id() {
        let key = resolve_s3_key("file.fits", Some("jw01345-o001_t002"), None);
        assert_eq!(key.as_deref(), Some("jwst/public/01345/file.fits"));
    }

    #[test]
    fn unresolvable_returns_none() {
        assert!(resolve_s3_key("calibration.fits", Some("hst-123"), None).is_none());
        assert!(resolve_s3_key("jw12.fits", None, None).is_none());
    }

    #[test]
    fn product_list_drops_unresolvable() {
        let products = vec![
            Product {
                filename: "jw02733_a_i2d.fits".into(),
                url: None,
                source_id: None,
                program_id: None,
                size: Some(10),
            },
            Product {
                filename: "mystery.fits".into(),
                url: None,
                source_id: None,
                program_id: None,
                size: None,
            },
        ];
        let resolved = resolve_keys_from_products(&products);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].1, "jwst/public/02733/jw02733_a_i2d.fits");
    }
}
