//! Page body decoding
//!
//! Pages are served in whatever encoding the site uses; GBK and Shift_JIS
//! wikis are common. The body is decoded before parsing so that a legacy
//! charset never costs a page its content or links.

use encoding_rs::{Encoding, UTF_8};

/// How far into the body a `<meta>` charset declaration is looked for
const META_SNIFF_LEN: usize = 1024;

/// Decodes a page body into text
///
/// The encoding comes from, in order: a byte order mark, the `charset`
/// parameter of the Content-Type header, a `<meta>` charset declaration near
/// the start of the document, and finally UTF-8. Malformed sequences are
/// replaced with U+FFFD rather than rejected.
///
/// # Arguments
///
/// * `body` - Raw page bytes
/// * `content_type` - The response's Content-Type header, if any
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| meta_charset(body).and_then(|label| Encoding::for_label(label.as_bytes())))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!("Replaced malformed {} sequences in page body", used.name());
    }
    text.into_owned()
}

/// The `charset` parameter of a Content-Type value
fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// A charset declared by `<meta charset>` or `<meta http-equiv>`
fn meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(META_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(|c| c == '"' || c == '\'' || c == ' ')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        .collect();

    (!label.is_empty()).then_some(label)
}
