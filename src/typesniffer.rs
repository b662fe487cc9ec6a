//! Content type sniffing for served files.
//!
//! Binary formats are recognised by their magic numbers (via `infer`), HTML
//! and XML by their leading markup, and SVG by a leading `<svg` tag that may
//! follow an XML prolog, comments or a doctype. Everything without binary
//! control bytes is text.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 1024;

pub const SVG_MIME_TYPE: &str = "image/svg+xml";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

static SVG_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static SVG_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?si)\A\s*(?:(<!DOCTYPE\s+svg([\s:]+.*?>|>))\s*)*<svg\b").expect("valid regex")
});
static SVG_TAG_IN_XML: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?si)\A<\?xml\b.*?\?>\s*(?:(<!DOCTYPE\s+svg([\s:]+.*?>|>))\s*)*<svg\b")
        .expect("valid regex")
});

const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Result of [`detect_content_type`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SniffedType {
    content_type: String,
}

impl SniffedType {
    pub fn is_text(&self) -> bool {
        self.content_type.contains("text/")
    }

    pub fn is_image(&self) -> bool {
        self.content_type.contains("image/")
    }

    pub fn is_svg_image(&self) -> bool {
        self.content_type.contains(SVG_MIME_TYPE)
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.contains("application/pdf")
    }

    pub fn is_video(&self) -> bool {
        self.content_type.contains("video/")
    }

    pub fn is_audio(&self) -> bool {
        self.content_type.contains("audio/")
    }

    /// Content type without parameters
    pub fn mime_type(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or(&self.content_type)
            .trim()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn matches_html(data: &[u8]) -> bool {
    HTML_SIGNATURES.iter().any(|sig| {
        data.len() > sig.len()
            && data[..sig.len()].eq_ignore_ascii_case(sig)
            && matches!(data[sig.len()], b' ' | b'>')
    })
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}

fn sniff(data: &[u8]) -> String {
    let start = data.iter().position(|&b| !is_whitespace(b)).unwrap_or(data.len());
    let markup = &data[start..];

    if matches_html(markup) {
        return "text/html; charset=utf-8".to_string();
    }
    if markup.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8".to_string();
    }
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    if !data.iter().copied().any(is_binary_byte) {
        return "text/plain; charset=utf-8".to_string();
    }
    APPLICATION_OCTET_STREAM.to_string()
}

/// Detect the content type of the leading bytes of a file
pub fn detect_content_type(data: &[u8]) -> SniffedType {
    if data.is_empty() {
        return SniffedType {
            content_type: "text/unknown".to_string(),
        };
    }
    let data = &data[..data.len().min(SNIFF_LEN)];
    let mut content_type = sniff(data);

    let by_html = content_type.contains("text/plain") || content_type.contains("text/html");
    let by_xml = content_type.contains("text/xml");
    if by_html || by_xml {
        let stripped = SVG_COMMENT.replace_all(data, &b""[..]);
        let start = stripped.iter().position(|&b| !is_whitespace(b)).unwrap_or(stripped.len());
        let stripped = &stripped[start..];
        if (by_html && SVG_TAG.is_match(stripped)) || (by_xml && SVG_TAG_IN_XML.is_match(stripped)) {
            content_type = SVG_MIME_TYPE.to_string();
        }
    }

    SniffedType { content_type }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_unknown_text() {
        let t = detect_content_type(b"");
        assert_eq!(t.content_type(), "text/unknown");
        assert!(t.is_text());
    }

    #[test]
    fn test_plain_text() {
        let t = detect_content_type(b"fn main() {}\n");
        assert!(t.is_text());
        assert_eq!(t.mime_type(), "text/plain");
        assert!(!t.is_image());
    }

    #[test]
    fn test_binary() {
        let t = detect_content_type(&[0u8, 1, 2, 3, 0xff]);
        assert_eq!(t.content_type(), APPLICATION_OCTET_STREAM);
        assert!(!t.is_text());
    }

    #[test]
    fn test_images_and_pdf() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert!(detect_content_type(png).is_image());
        assert_eq!(detect_content_type(png).mime_type(), "image/png");

        let pdf = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n";
        assert!(detect_content_type(pdf).is_pdf());
    }

    #[test]
    fn test_svg_detection() {
        let cases: &[&[u8]] = &[
            b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>",
            b"  <svg>",
            b"<!-- comment --><svg></svg>",
            b"<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\"><svg></svg>",
            b"<?xml version=\"1.0\"?>\n<!-- c -->\n<svg></svg>",
        ];
        for case in cases {
            let t = detect_content_type(case);
            assert!(t.is_svg_image(), "{:?}", String::from_utf8_lossy(case));
            assert!(t.is_image());
        }

        assert!(!detect_content_type(b"<svgfoo>").is_svg_image());
        assert!(!detect_content_type(b"text then <svg></svg>").is_svg_image());
        assert!(!detect_content_type(b"<?xml version=\"1.0\"?><html></html>").is_svg_image());
    }
}
