use crate::error::DecodeError;
use crate::policy::{decode_base64_text, PRIVACY_HEADER};

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Header map with lowercased keys.
pub type Headers = HashMap<String, String>;

const MAX_NESTING: usize = 16;

lazy_static! {
    // name, optional RFC 2231 section index, optional `*` marking an encoded value
    static ref PARAM_PATTERN: Regex = Regex::new(
        r#"(?i);\s*([a-z0-9_.-]+)(?:\*(\d+))?(\*)?\s*=\s*(?:"([^"]*)"|([^;\s]*))"#
    )
    .unwrap();
}

/// Split a raw message (or MIME part) into its header block and body.
///
/// Continuation lines are folded into the previous value. Repeated headers
/// are joined with a space, except `X-Privacy-Policy` where the first one
/// wins.
pub fn split_message(raw: &str) -> (Headers, String) {
    let policy_key = PRIVACY_HEADER.to_lowercase();
    let mut headers: Headers = HashMap::new();
    let mut body = String::new();
    let mut in_headers = true;
    let mut last_header_key: Option<String> = None;

    for line in raw.lines() {
        if in_headers {
            if line.trim().is_empty() {
                in_headers = false;
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(ref key) = last_header_key {
                    if let Some(existing_value) = headers.get_mut(key) {
                        existing_value.push(' ');
                        existing_value.push_str(line.trim());
                    }
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();

                if let Some(existing_value) = headers.get(&key) {
                    if key == policy_key {
                        log::warn!("Ignoring repeated {PRIVACY_HEADER} header");
                        last_header_key = None;
                        continue;
                    }
                    let combined_value = format!("{} {}", existing_value, value);
                    headers.insert(key.clone(), combined_value);
                } else {
                    headers.insert(key.clone(), value);
                }
                last_header_key = Some(key);
            }
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }

    (headers, body)
}

/// A single non-multipart body part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    pub headers: Headers,
    pub body: String,
}

impl MimePart {
    /// Lowercased media type without parameters, `text/plain` when absent.
    pub fn content_type(&self) -> String {
        self.headers
            .get("content-type")
            .map(|value| media_type(value))
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "text/plain".to_string())
    }

    /// `Content-Disposition` filename, else the `Content-Type` name.
    pub fn filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|value| header_param(value, "filename"))
            .or_else(|| {
                self.headers
                    .get("content-type")
                    .and_then(|value| header_param(value, "name"))
            })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body with the base64 transfer encoding removed.
    ///
    /// Other transfer encodings (quoted-printable included) are returned as
    /// they are.
    pub fn decoded_payload(&self) -> Result<String, DecodeError> {
        let encoding = self
            .header("content-transfer-encoding")
            .map(|value| value.trim().to_lowercase());

        match encoding.as_deref() {
            Some("base64") => decode_base64_text(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    pub fn payload(&self) -> String {
        self.decoded_payload().unwrap_or_else(|e| {
            log::warn!("Undecodable {} part: {e}", self.content_type());
            self.body.clone()
        })
    }
}

/// Flatten a message into its leaf parts, depth first.
///
/// A message that is not multipart is returned as a single part carrying
/// the top-level headers.
pub fn leaf_parts(headers: &Headers, body: &str) -> Vec<MimePart> {
    let mut parts = Vec::new();
    collect_parts(headers, body, 0, &mut parts);
    parts
}

fn collect_parts(headers: &Headers, body: &str, depth: usize, parts: &mut Vec<MimePart>) {
    let boundary = headers
        .get("content-type")
        .filter(|value| media_type(value).starts_with("multipart/"))
        .and_then(|value| header_param(value, "boundary"));

    match boundary {
        Some(boundary) if depth < MAX_NESTING => {
            for section in split_sections(body, &boundary) {
                let (part_headers, part_body) = split_message(&section);
                collect_parts(&part_headers, &part_body, depth + 1, parts);
            }
        }
        _ => parts.push(MimePart {
            headers: headers.clone(),
            body: body.to_string(),
        }),
    }
}

/// Sections between `--boundary` delimiters. The preamble and anything
/// after `--boundary--` are dropped.
fn split_sections(body: &str, boundary: &str) -> Vec<String> {
    let delimiter = format!("--{boundary}");
    let close = format!("--{boundary}--");
    let mut sections = Vec::new();
    let mut current: Option<String> = None;

    for line in body.lines() {
        let trimmed = line.trim_end();
        if trimmed == close {
            break;
        }
        if trimmed == delimiter {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(String::new());
            continue;
        }
        if let Some(section) = current.as_mut() {
            section.push_str(line);
            section.push('\n');
        }
    }

    if let Some(section) = current {
        sections.push(section);
    }
    sections
}

pub fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Look up a parameter of a structured header such as `Content-Type`.
///
/// Handles plain `name=value`, RFC 2231 extended `name*=utf-8''a%20b` and
/// continued `name*0=`/`name*1*=` forms. Continuations take precedence over
/// an extended value, which takes precedence over a plain one.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    let mut plain: Option<String> = None;
    let mut extended: Option<String> = None;
    let mut sections: Vec<(u32, bool, String)> = Vec::new();

    for caps in PARAM_PATTERN.captures_iter(value) {
        if !caps[1].eq_ignore_ascii_case(name) {
            continue;
        }
        let raw = caps
            .get(4)
            .or_else(|| caps.get(5))
            .map(|m| m.as_str())
            .unwrap_or("");
        let encoded = caps.get(3).is_some();

        match caps.get(2).and_then(|index| index.as_str().parse::<u32>().ok()) {
            Some(index) => sections.push((index, encoded, raw.to_string())),
            None if encoded => extended = Some(decode_extended(raw)),
            None => plain = Some(raw.to_string()),
        }
    }

    let found = if sections.is_empty() {
        extended.or(plain)
    } else {
        sections.sort_by_key(|(index, _, _)| *index);
        let mut bytes = Vec::new();
        for (index, encoded, raw) in &sections {
            match (encoded, index) {
                (false, _) => bytes.extend_from_slice(raw.as_bytes()),
                (true, 0) => bytes.extend(percent_decode(strip_charset(raw))),
                (true, _) => bytes.extend(percent_decode(raw)),
            }
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    };

    found
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn decode_extended(raw: &str) -> String {
    String::from_utf8_lossy(&percent_decode(strip_charset(raw))).into_owned()
}

// charset'language'value
fn strip_charset(raw: &str) -> &str {
    let mut pieces = raw.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(_), Some(_), Some(value)) => value,
        _ => raw,
    }
}

fn percent_decode(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &value[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = "Content-Type: multipart/mixed; boundary=\"outer\"\r
\r
This is the preamble.\r
--outer\r
Content-Type: multipart/alternative; boundary=inner\r
\r
--inner\r
Content-Type: text/plain\r
\r
Hello\r
--inner\r
Content-Type: text/html; charset=utf-8\r
\r
<p>Hello</p>\r
--inner--\r
--outer\r
Content-Type: application/octet-stream; name=\"data.bin\"\r
Content-Transfer-Encoding: base64\r
\r
aGVsbG8gd29y\r
bGQ=\r
--outer--\r
epilogue\r
";

    #[test]
    fn test_split_message_folds_and_joins() {
        let (headers, body) =
            split_message("Subject: one\r\n two\r\nReceived: a\r\nReceived: b\r\n\r\nbody\r\n");

        assert_eq!(headers["subject"], "one two");
        assert_eq!(headers["received"], "a b");
        assert_eq!(body, "body\n");
    }

    #[test]
    fn test_repeated_policy_header_keeps_first() {
        let (headers, _) = split_message(
            "X-Privacy-Policy: Zmlyc3Q=\r\nx-privacy-policy: c2Vjb25k\r\n  Zm9sZGVk\r\n\r\n",
        );
        assert_eq!(headers["x-privacy-policy"], "Zmlyc3Q=");
    }

    #[test]
    fn test_leaf_parts_nested() {
        let (headers, body) = split_message(NESTED);
        let parts = leaf_parts(&headers, &body);

        let types: Vec<String> = parts.iter().map(|p| p.content_type()).collect();
        assert_eq!(
            types,
            vec!["text/plain", "text/html", "application/octet-stream"]
        );
        assert_eq!(parts[0].body, "Hello\n");
        assert_eq!(parts[2].filename().as_deref(), Some("data.bin"));
        assert_eq!(parts[2].payload(), "hello world");
    }

    #[test]
    fn test_single_part_message() {
        let (headers, body) = split_message("Subject: hi\n\nbody\n");
        let parts = leaf_parts(&headers, &body);

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type(), "text/plain");
        assert!(parts[0].filename().is_none());
    }

    #[test]
    fn test_undecodable_payload_falls_back_to_body() {
        let mut part = MimePart::default();
        part.headers
            .insert("content-transfer-encoding".to_string(), "BASE64".to_string());
        part.body = "%%%".to_string();

        assert!(part.decoded_payload().is_err());
        assert_eq!(part.payload(), "%%%");
    }

    #[test]
    fn test_header_param_forms() {
        assert_eq!(
            header_param("attachment; filename=\"Setup.exe\"", "filename").as_deref(),
            Some("Setup.exe")
        );
        assert_eq!(
            header_param("application/pdf; NAME=report.pdf; x=1", "name").as_deref(),
            Some("report.pdf")
        );
        // `name` must not match inside `filename`
        assert!(header_param("attachment; filename=a.txt", "name").is_none());
        assert!(header_param("attachment", "filename").is_none());
    }

    #[test]
    fn test_header_param_rfc2231() {
        assert_eq!(
            header_param("attachment; filename*=UTF-8''na%C3%AFve%20tool.exe", "filename")
                .as_deref(),
            Some("naïve tool.exe")
        );
        assert_eq!(
            header_param(
                "attachment; filename*1=\"ter.exe\"; filename*0=\"Ins\"; filename*2*=%2Ebat",
                "filename"
            )
            .as_deref(),
            Some("Inster.exe.bat")
        );
        assert_eq!(
            header_param(
                "attachment; filename=\"plain.txt\"; filename*=utf-8'en'encoded.exe",
                "filename"
            )
            .as_deref(),
            Some("encoded.exe")
        );
    }

    #[test]
    fn test_percent_decode_leaves_stray_percent() {
        assert_eq!(percent_decode("100%"), b"100%".to_vec());
        assert_eq!(percent_decode("%4"), b"%4".to_vec());
        assert_eq!(percent_decode("%zz%41"), b"%zzA".to_vec());
    }
}
