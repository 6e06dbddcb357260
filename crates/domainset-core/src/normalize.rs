//! Domain-name canonicalization
//!
//! ## Purpose
//!
//! Every domain that enters the cache (list lines during a load, query
//! arguments at lookup time) goes through the same canonical form:
//! lowercase ASCII, Punycode for non-ASCII labels, no trailing dot.
//! Membership checks are exact string matches on that form, so lookups and
//! loads agree regardless of how the input was spelled.
//!
//! ## Hardening
//!
//! Curated blocklists are assembled from many hands and occasionally carry
//! spoofing artifacts: full-width dots, zero-width joiners, bidi control
//! characters. Those are mapped or stripped *before* the UTS #46 pass so a
//! visually-identical entry cannot slip past an exact-match probe.

use crate::error::{Error, Result};

/// Maximum total length of a canonical domain, per RFC 1035.
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// Normalizes domain names to their canonical lowercase ASCII form.
///
/// Rejects domain names with empty labels; a single trailing dot (FQDN
/// marker) is removed rather than rejected. See [`DomainNormalizer::normalize`]
/// for the full pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomainNormalizer;

impl DomainNormalizer {
    /// Create a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalize a domain name:
    /// - Trims surrounding whitespace
    /// - Maps Unicode dot-like characters (U+3002, U+FF0E, U+FF61) to `.`
    /// - Strips default-ignorable zero-width and bidi control characters
    /// - Removes a single trailing dot
    /// - Applies UTS #46 processing (STD3 ASCII rules, hyphen checks, bidi
    ///   rule, non-transitional) producing lowercase ASCII with Punycode
    ///   labels
    /// - Validates total (≤253) and label (1..=63) lengths and the LDH
    ///   grammar
    ///
    /// Returns the normalized ASCII domain without a trailing dot.
    pub fn normalize(&self, input: &str) -> Result<String> {
        let s = input.trim();
        if s.is_empty() {
            return Err(Error::normalize("empty domain"));
        }

        let s: String = s
            .chars()
            .map(map_dot_like)
            .filter(|c| !is_invisible(*c))
            .collect();
        if s.is_empty() {
            return Err(Error::normalize("empty domain after stripping invisibles"));
        }

        // Remove a single trailing dot if present (FQDN marker).
        let s = s.strip_suffix('.').unwrap_or(&s);
        if s.is_empty() {
            return Err(Error::normalize("domain has no labels"));
        }
        if s.starts_with('.') || s.ends_with('.') {
            return Err(Error::normalize("domain has a leading or trailing dot"));
        }
        if s.contains("..") {
            return Err(Error::normalize("domain contains an empty label"));
        }

        // UTS #46 to ASCII (Punycode), strict: STD3 rules, hyphen
        // restrictions, DNS length verification, non-transitional.
        let ascii = idna::domain_to_ascii_strict(s)
            .map_err(|err| Error::normalize(format!("uts46 to-ascii: {err}")))?;
        let ascii = ascii.to_ascii_lowercase();

        for label in ascii.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(Error::normalize(format!(
                    "label \"{label}\" length {} out of range 1..={MAX_LABEL_LEN}",
                    label.len()
                )));
            }
            if !is_ldh_label(label) {
                return Err(Error::normalize(format!(
                    "label \"{label}\" contains invalid ASCII characters"
                )));
            }
        }
        if ascii.len() > MAX_DOMAIN_LEN {
            return Err(Error::normalize(format!(
                "domain length {} exceeds {MAX_DOMAIN_LEN} characters",
                ascii.len()
            )));
        }

        Ok(ascii)
    }
}

/// Maps Unicode full-stop-like characters to an ASCII dot.
fn map_dot_like(c: char) -> char {
    match c {
        '\u{3002}' | '\u{FF0E}' | '\u{FF61}' => '.',
        other => other,
    }
}

/// Whether `c` belongs to the stripped set of default-ignorable and control
/// characters usable for obfuscation in domains.
fn is_invisible(c: char) -> bool {
    matches!(c,
        // ASCII C0 controls and DEL
        '\u{00}'..='\u{1F}' | '\u{7F}'
        // Zero-width characters and joiners
        | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'
        // Bidi controls
        | '\u{202A}'..='\u{202E}')
}

/// Checks that an ASCII label uses allowed characters per STD3.
///
/// Allows the `xn--` Punycode prefix; the label must otherwise start and end
/// alphanumeric, with hyphens permitted in the interior.
fn is_ldh_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let Some((&last, _)) = bytes.split_last() else {
        return false;
    };
    if !is_alnum(last) {
        return false;
    }
    if !is_alnum(bytes[0]) && !label.starts_with("xn--") {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
