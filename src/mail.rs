use crate::error::DecodeError;
use crate::history::EmailSummary;
use crate::mime::{self, MimePart};
use crate::policy::{self, decode_base64_text, looks_like_policy, Policy, PRIVACY_HEADER};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const PRIVACY_MIME_TYPE: &str = "application/xml+privacy-policy";
pub const POLICY_FILENAME: &str = "privacy-policy.xml";
const POLICY_DESCRIPTION: &str = "Email Privacy Policy Metadata";
const LINE_WIDTH: usize = 76;

lazy_static! {
    static ref BODY_POLICY_PATTERN: Regex =
        Regex::new(r"(?s)<!--\s*PRIVACY-POLICY-START(.*?)PRIVACY-POLICY-END\s*-->").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(name: &str) -> Self {
        Attachment {
            name: name.to_string(),
            content_type: None,
        }
    }
}

/// Where an embedded policy was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    /// Base64 value of the `X-Privacy-Policy` header.
    Header(String),
    /// Markup carried in a dedicated MIME part.
    MimePart(String),
    /// Markup between `PRIVACY-POLICY-START`/`END` in an HTML comment.
    BodyComment(String),
}

impl PolicySource {
    pub fn resolve(&self) -> Result<Policy, DecodeError> {
        match self {
            PolicySource::Header(encoded) => policy::decode(encoded),
            PolicySource::MimePart(markup) | PolicySource::BodyComment(markup) => {
                Ok(policy::parse_markup(markup))
            }
        }
    }

    pub fn origin(&self) -> &'static str {
        match self {
            PolicySource::Header(_) => "header",
            PolicySource::MimePart(_) => "MIME part",
            PolicySource::BodyComment(_) => "body comment",
        }
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.origin())
    }
}

/// Where a policy is present and whether it can be read back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyIntegrity {
    pub has_header: bool,
    pub has_mime_part: bool,
    pub extractable: bool,
    pub policy: Option<Policy>,
    pub errors: Vec<String>,
}

/// How `attach_policy` embeds a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachMethod {
    Header,
    Mime,
    Both,
}

impl AttachMethod {
    fn header(self) -> bool {
        matches!(self, AttachMethod::Header | AttachMethod::Both)
    }

    fn mime(self) -> bool {
        matches!(self, AttachMethod::Mime | AttachMethod::Both)
    }
}

impl FromStr for AttachMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "header" => Ok(AttachMethod::Header),
            "mime" => Ok(AttachMethod::Mime),
            "both" => Ok(AttachMethod::Both),
            other => anyhow::bail!("unknown attach method '{other}', expected header, mime or both"),
        }
    }
}

/// The parts of a message the privacy filter looks at.
#[derive(Debug, Default, Clone)]
pub struct MailContext {
    pub id: Option<String>,
    pub subject: Option<String>,
    pub from_header: Option<String>,
    pub headers: HashMap<String, String>, // keys lowercased
    pub body: Option<String>,
    pub parts: Vec<MimePart>,
    pub attachments: Vec<Attachment>,
}

impl MailContext {
    /// Parse a raw RFC 822 style message.
    ///
    /// Header keys are lowercased and continuation lines folded into the
    /// previous value. Attachment names come from each leaf part's
    /// `Content-Disposition` filename or `Content-Type` name.
    pub fn from_raw(raw: &str) -> Self {
        let (headers, body) = mime::split_message(raw);
        let parts = mime::leaf_parts(&headers, &body);

        let mut attachments: Vec<Attachment> = Vec::new();
        for part in &parts {
            let Some(name) = part.filename() else {
                continue;
            };
            if attachments.iter().any(|a| a.name == name) {
                continue;
            }
            attachments.push(Attachment {
                name,
                content_type: Some(part.content_type()),
            });
        }

        MailContext {
            id: headers.get("message-id").cloned(),
            subject: headers.get("subject").cloned(),
            from_header: headers.get("from").cloned(),
            body: Some(body),
            parts,
            attachments,
            headers,
        }
    }

    /// The encoded policy carried in the `X-Privacy-Policy` header, if any.
    pub fn privacy_policy(&self) -> Option<&str> {
        self.headers
            .get(&PRIVACY_HEADER.to_lowercase())
            .map(|value| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    /// Every embedded policy, header first, then MIME part, then body
    /// comment.
    pub fn policy_sources(&self) -> Vec<PolicySource> {
        let mut sources = Vec::new();

        if let Some(encoded) = self.privacy_policy() {
            sources.push(PolicySource::Header(encoded.to_string()));
        }

        for part in self.parts.iter().filter(|p| is_policy_part(p)) {
            let markup = part.payload();
            if !markup.trim().is_empty() {
                sources.push(PolicySource::MimePart(markup));
                break;
            }
        }

        if let Some(markup) = self.body_comment_policy() {
            sources.push(PolicySource::BodyComment(markup));
        }

        sources
    }

    pub fn policy_source(&self) -> Option<PolicySource> {
        self.policy_sources().into_iter().next()
    }

    fn body_comment_policy(&self) -> Option<String> {
        let html: Vec<String> = if self.parts.is_empty() {
            self.body.iter().cloned().collect()
        } else {
            self.parts
                .iter()
                .filter(|p| p.content_type() == "text/html")
                .map(MimePart::payload)
                .collect()
        };

        html.iter().find_map(|content| {
            BODY_POLICY_PATTERN
                .captures(content)
                .map(|caps| caps[1].trim().to_string())
        })
    }

    /// Check that the header and the policy MIME part, when present, both
    /// carry readable policy markup.
    pub fn validate_policy_integrity(&self) -> PolicyIntegrity {
        let mut report = PolicyIntegrity::default();

        if let Some(encoded) = self.headers.get(&PRIVACY_HEADER.to_lowercase()) {
            report.has_header = true;
            match decode_base64_text(encoded).map_err(|e| e.to_string()).and_then(check_markup) {
                Ok(markup) => {
                    report.extractable = true;
                    report.policy.get_or_insert_with(|| policy::parse_markup(&markup));
                }
                Err(e) => report.errors.push(format!("Header policy invalid: {e}")),
            }
        }

        for part in self
            .parts
            .iter()
            .filter(|p| p.content_type() == PRIVACY_MIME_TYPE)
        {
            report.has_mime_part = true;
            match part
                .decoded_payload()
                .map_err(|e| e.to_string())
                .and_then(check_markup)
            {
                Ok(markup) => {
                    report.extractable = true;
                    report.policy.get_or_insert_with(|| policy::parse_markup(&markup));
                }
                Err(e) => report.errors.push(format!("MIME policy invalid: {e}")),
            }
        }

        report
    }

    pub fn content(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Missing ids fall back to the current time in milliseconds.
    pub fn summary(&self) -> EmailSummary {
        EmailSummary {
            id: self
                .id
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().to_string()),
            subject: self.subject.clone().unwrap_or_default(),
            from: self.from_header.clone().unwrap_or_default(),
        }
    }
}

fn is_policy_part(part: &MimePart) -> bool {
    let content_type = part.content_type();
    content_type == PRIVACY_MIME_TYPE
        || part.filename().as_deref() == Some(POLICY_FILENAME)
        || (content_type == "application/xml"
            && part
                .header("content-description")
                .is_some_and(|d| d.to_lowercase().contains("privacy")))
}

fn check_markup(markup: String) -> Result<String, String> {
    if looks_like_policy(&markup) {
        Ok(markup)
    } else {
        Err("no <PrivacyPolicy> element".to_string())
    }
}

/// Embed `policy` into a raw message and return the rewritten message.
///
/// The header method replaces any existing `X-Privacy-Policy` header. The
/// MIME method appends a policy part to a `multipart/mixed` message, or
/// wraps any other message into a new `multipart/mixed` one. Output lines
/// end in CRLF.
pub fn attach_policy(raw: &str, policy: &Policy, method: AttachMethod) -> String {
    let encoded = policy.encode();
    let (mut header_lines, mut body_lines) = split_lines(raw);

    if method.header() {
        remove_header(&mut header_lines, PRIVACY_HEADER);
        for (index, chunk) in wrap(&encoded).into_iter().enumerate() {
            if index == 0 {
                header_lines.push(format!("{PRIVACY_HEADER}: {chunk}"));
            } else {
                header_lines.push(format!(" {chunk}"));
            }
        }
    }

    if method.mime() {
        let (headers, _) = mime::split_message(raw);
        let content_type = headers.get("content-type").cloned().unwrap_or_default();
        let mixed_boundary = if mime::media_type(&content_type) == "multipart/mixed" {
            mime::header_param(&content_type, "boundary")
        } else {
            None
        };

        match mixed_boundary {
            Some(boundary) => {
                let close = format!("--{boundary}--");
                let mut part = vec![format!("--{boundary}")];
                part.extend(policy_part(&encoded));

                match body_lines.iter().rposition(|l| l.trim_end() == close) {
                    Some(at) => {
                        let tail = body_lines.split_off(at);
                        body_lines.extend(part);
                        body_lines.extend(tail);
                    }
                    None => {
                        body_lines.extend(part);
                        body_lines.push(close);
                    }
                }
            }
            None => {
                let boundary = new_boundary("mixed");
                let mut inner = remove_header(&mut header_lines, "Content-Type");
                if inner.is_empty() {
                    inner.push("Content-Type: text/plain; charset=\"utf-8\"".to_string());
                }
                inner.extend(remove_header(&mut header_lines, "Content-Transfer-Encoding"));

                if !headers.contains_key("mime-version") {
                    header_lines.push("MIME-Version: 1.0".to_string());
                }
                header_lines.push(format!(
                    "Content-Type: multipart/mixed; boundary=\"{boundary}\""
                ));

                let mut wrapped = vec![format!("--{boundary}")];
                wrapped.extend(inner);
                wrapped.push(String::new());
                wrapped.append(&mut body_lines);
                wrapped.push(format!("--{boundary}"));
                wrapped.extend(policy_part(&encoded));
                wrapped.push(format!("--{boundary}--"));
                body_lines = wrapped;
            }
        }
    }

    let mut out = header_lines.join("\r\n");
    out.push_str("\r\n\r\n");
    for line in &body_lines {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// Build a complete `multipart/mixed` message around an HTML body and
/// embed `policy` in it.
pub fn compose_with_policy(
    from: &str,
    to: &str,
    subject: &str,
    body_html: &str,
    policy: &Policy,
    method: AttachMethod,
) -> String {
    let outer = new_boundary("mixed");
    let inner = new_boundary("alt");

    let mut lines = vec![
        format!("From: {from}"),
        format!("To: {to}"),
        format!("Subject: {subject}"),
        format!("Date: {}", chrono::Utc::now().to_rfc2822()),
        "MIME-Version: 1.0".to_string(),
        format!("Content-Type: multipart/mixed; boundary=\"{outer}\""),
        String::new(),
        format!("--{outer}"),
        format!("Content-Type: multipart/alternative; boundary=\"{inner}\""),
        String::new(),
        format!("--{inner}"),
        "Content-Type: text/html; charset=\"utf-8\"".to_string(),
        "Content-Transfer-Encoding: 8bit".to_string(),
        String::new(),
    ];
    lines.extend(body_html.lines().map(str::to_string));
    lines.push(format!("--{inner}--"));
    lines.push(format!("--{outer}--"));

    attach_policy(&lines.join("\r\n"), policy, method)
}

fn policy_part(encoded: &str) -> Vec<String> {
    let mut lines = vec![
        format!("Content-Type: {PRIVACY_MIME_TYPE}; charset=\"utf-8\""),
        "Content-Transfer-Encoding: base64".to_string(),
        format!("Content-Disposition: attachment; filename=\"{POLICY_FILENAME}\""),
        format!("Content-Description: {POLICY_DESCRIPTION}"),
        String::new(),
    ];
    lines.extend(wrap(encoded).into_iter().map(str::to_string));
    lines
}

fn split_lines(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut header_lines = Vec::new();
    let mut body_lines = Vec::new();
    let mut in_headers = true;

    for line in raw.lines() {
        if in_headers && line.trim().is_empty() {
            in_headers = false;
        } else if in_headers {
            header_lines.push(line.to_string());
        } else {
            body_lines.push(line.to_string());
        }
    }

    (header_lines, body_lines)
}

/// Remove every `name` header with its continuation lines and return them.
fn remove_header(lines: &mut Vec<String>, name: &str) -> Vec<String> {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(lines.len());
    let mut removing = false;

    for line in lines.drain(..) {
        let continuation = line.starts_with(' ') || line.starts_with('\t');
        if !continuation {
            removing = line
                .split_once(':')
                .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case(name));
        }
        if removing {
            removed.push(line);
        } else {
            kept.push(line);
        }
    }

    *lines = kept;
    removed
}

// base64 text is ASCII, so byte slicing is safe
fn wrap(encoded: &str) -> Vec<&str> {
    (0..encoded.len())
        .step_by(LINE_WIDTH)
        .map(|start| &encoded[start..(start + LINE_WIDTH).min(encoded.len())])
        .collect()
}

fn new_boundary(tag: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("=_{tag}_{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FilterSettings};
    use crate::filter::ContentFilter;
    use crate::templates;

    const LEGAL_POLICY: &str = "PFByaXZhY3lQb2xpY3k+PE1ldGFkYXRhPjxDcmVhdG9yPmxlZ2FsQGNvbXBhbnkuY29tPC9DcmVh\r
dG9yPjwvTWV0YWRhdGE+PFJ1bGVzPjxSdWxlIGlkPSJuby1wcmludCI+PERlc2NyaXB0aW9uPk5v\r
IHByaW50aW5nPC9EZXNjcmlwdGlvbj48QWN0aW9uIHR5cGU9ImJsb2NrIiBtZXNzYWdlPSJQcmlu\r
dGluZyBkaXNhYmxlZCIvPjwvUnVsZT48L1J1bGVzPjwvUHJpdmFjeVBvbGljeT4=";

    fn with_policy_part(top_headers: &str) -> String {
        format!(
            "{top_headers}Content-Type: multipart/mixed; boundary=\"B\"\r
\r
--B\r
Content-Type: text/html\r
\r
<p>Board minutes</p>\r
--B\r
Content-Type: application/xml+privacy-policy; charset=\"utf-8\"\r
Content-Transfer-Encoding: base64\r
Content-Disposition: attachment; filename=\"privacy-policy.xml\"\r
\r
{LEGAL_POLICY}\r
--B--\r
"
        )
    }

    const RAW: &str = "From: HR <hr@company.com>\r
To: employee@company.com\r
Subject: Quarterly\r
 Report\r
Message-ID: <abc@company.com>\r
X-Privacy-Policy: PENyZWF0b3I+aHJAY29tcGFueS5jb208L0NyZWF0b3I+\r
Content-Type: multipart/mixed; boundary=\"XYZ\"\r
\r
--XYZ\r
Content-Type: text/html\r
\r
<p>Hi</p><img src=\"https://tracker.com/pixel.gif\">\r
--XYZ\r
Content-Type: application/x-msdownload\r
Content-Disposition: attachment; filename=\"Setup.exe\"\r
\r
TVqQAAMAAAAEAAAA\r
--XYZ\r
Content-Type: application/pdf; name=report.pdf\r
Content-Disposition: attachment; filename=report.pdf\r
\r
JVBERi0=\r
--XYZ--\r
";

    #[test]
    fn test_parse_headers() {
        let mail = MailContext::from_raw(RAW);

        assert_eq!(mail.subject.as_deref(), Some("Quarterly Report"));
        assert_eq!(mail.from_header.as_deref(), Some("HR <hr@company.com>"));
        assert_eq!(mail.id.as_deref(), Some("<abc@company.com>"));
        assert_eq!(
            mail.privacy_policy(),
            Some("PENyZWF0b3I+aHJAY29tcGFueS5jb208L0NyZWF0b3I+")
        );
        assert!(mail.content().contains("tracker.com/pixel.gif"));
    }

    #[test]
    fn test_extract_attachments() {
        let mail = MailContext::from_raw(RAW);

        assert_eq!(
            mail.attachments,
            vec![
                Attachment {
                    name: "Setup.exe".to_string(),
                    content_type: Some("application/x-msdownload".to_string()),
                },
                Attachment {
                    name: "report.pdf".to_string(),
                    content_type: Some("application/pdf".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_no_policy_header() {
        let mail = MailContext::from_raw("Subject: hi\n\nbody\n");
        assert!(mail.privacy_policy().is_none());
        assert!(mail.attachments.is_empty());
        assert_eq!(mail.content(), "body\n");
    }

    #[test]
    fn test_summary_defaults() {
        let mail = MailContext::default();
        let summary = mail.summary();

        assert!(summary.subject.is_empty());
        assert!(summary.from.is_empty());
        assert!(summary.id.parse::<i64>().is_ok());
    }
    #[test]
    fn test_content_type_name_only_attachment_is_blocked() {
        let raw = "Subject: update\r
Content-Type: multipart/mixed; boundary=\"XYZ\"\r
\r
--XYZ\r
Content-Type: text/plain\r
\r
Run the installer.\r
--XYZ\r
Content-Type: application/x-msdownload; name=\"Setup.exe\"\r
Content-Transfer-Encoding: base64\r
\r
TVqQAAMAAAAEAAAA\r
--XYZ--\r
";
        let mail = MailContext::from_raw(raw);
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].name, "Setup.exe");

        let filter = ContentFilter::new(&Config::default()).unwrap();
        let result = filter.apply(
            mail.content(),
            &mail.attachments,
            &FilterSettings::default(),
            None,
        );
        assert!(!result.attachments_allowed);
        assert_eq!(result.blocked_attachments, vec!["Setup.exe"]);
    }

    #[test]
    fn test_rfc2231_attachment_names() {
        let raw = "Content-Type: multipart/mixed; boundary=XYZ\r
\r
--XYZ\r
Content-Type: application/octet-stream\r
Content-Disposition: attachment;\r
 filename*0=\"quarterly-\";\r
 filename*1=\"update.scr\"\r
\r
AAAA\r
--XYZ\r
Content-Type: application/octet-stream; name*=utf-8''r%C3%A9sum%C3%A9.bat\r
\r
AAAA\r
--XYZ--\r
";
        let mail = MailContext::from_raw(raw);
        let names: Vec<&str> = mail.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["quarterly-update.scr", "résumé.bat"]);

        let filter = ContentFilter::new(&Config::default()).unwrap();
        assert_eq!(filter.executable_attachments(&mail.attachments).len(), 2);
    }

    #[test]
    fn test_repeated_policy_header_uses_first() {
        let raw = "Subject: hi\r
X-Privacy-Policy: PENyZWF0b3I+aHJAY29tcGFueS5jb208L0NyZWF0b3I+\r
X-Privacy-Policy: PENyZWF0b3I+b3RoZXJAZXhhbXBsZS5jb208L0NyZWF0b3I+\r
\r
body\r
";
        let mail = MailContext::from_raw(raw);
        assert_eq!(
            mail.privacy_policy(),
            Some("PENyZWF0b3I+aHJAY29tcGFueS5jb208L0NyZWF0b3I+")
        );

        let policy = mail.policy_source().unwrap().resolve().unwrap();
        assert_eq!(policy.creator, "hr@company.com");
    }

    #[test]
    fn test_policy_from_mime_part() {
        let mail = MailContext::from_raw(&with_policy_part("Subject: minutes\r\n"));
        assert!(mail.privacy_policy().is_none());

        let source = mail.policy_source().unwrap();
        assert!(matches!(source, PolicySource::MimePart(_)));
        assert_eq!(source.origin(), "MIME part");

        let policy = source.resolve().unwrap();
        assert_eq!(policy.creator, "legal@company.com");
        assert_eq!(policy.rules[0].id, "no-print");
    }

    #[test]
    fn test_policy_from_described_xml_part() {
        let raw = "Content-Type: multipart/mixed; boundary=B\r
\r
--B\r
Content-Type: application/xml\r
Content-Description: Privacy rules\r
\r
<PrivacyPolicy><Metadata><Creator>ops@company.com</Creator></Metadata></PrivacyPolicy>\r
--B--\r
";
        let mail = MailContext::from_raw(raw);
        let policy = mail.policy_source().unwrap().resolve().unwrap();
        assert_eq!(policy.creator, "ops@company.com");
    }

    #[test]
    fn test_policy_from_body_comment() {
        let raw = "Content-Type: text/html\r
\r
<html><body>Hi\r
<!-- PRIVACY-POLICY-START\r
<PrivacyPolicy><Metadata><Creator>sales@company.com</Creator></Metadata></PrivacyPolicy>\r
PRIVACY-POLICY-END -->\r
</body></html>\r
";
        let mail = MailContext::from_raw(raw);
        let source = mail.policy_source().unwrap();
        assert!(matches!(source, PolicySource::BodyComment(_)));
        assert_eq!(source.resolve().unwrap().creator, "sales@company.com");

        // Only HTML parts are searched.
        let plain = MailContext::from_raw(&raw.replace("text/html", "text/plain"));
        assert!(plain.policy_source().is_none());
    }

    #[test]
    fn test_header_precedes_mime_part() {
        let raw = with_policy_part(
            "X-Privacy-Policy: PENyZWF0b3I+aHJAY29tcGFueS5jb208L0NyZWF0b3I+\r\n",
        );
        let mail = MailContext::from_raw(&raw);

        let sources = mail.policy_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].origin(), "header");
        assert_eq!(sources[0].resolve().unwrap().creator, "hr@company.com");
        assert_eq!(sources[1].origin(), "MIME part");
    }

    #[test]
    fn test_validate_policy_integrity() {
        let raw = with_policy_part("X-Privacy-Policy: PGh0bWw+bm90IGEgcG9saWN5PC9odG1sPg==\r\n");
        let report = MailContext::from_raw(&raw).validate_policy_integrity();

        assert!(report.has_header);
        assert!(report.has_mime_part);
        assert!(report.extractable);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Header policy invalid"));
        assert_eq!(report.policy.unwrap().creator, "legal@company.com");

        let empty = MailContext::from_raw("Subject: hi\n\nbody\n").validate_policy_integrity();
        assert!(!empty.has_header && !empty.has_mime_part && !empty.extractable);
        assert!(empty.policy.is_none());
        assert!(empty.errors.is_empty());
    }

    #[test]
    fn test_attach_policy_methods() {
        let policy = templates::no_forwarding("hr@company.com");

        let header_only = MailContext::from_raw(&attach_policy(RAW, &policy, AttachMethod::Header));
        let report = header_only.validate_policy_integrity();
        assert!(report.has_header && !report.has_mime_part && report.extractable);
        // The old header is replaced rather than repeated.
        assert_eq!(header_only.policy_source().unwrap().resolve().unwrap(), policy);

        let mime_only = MailContext::from_raw(&attach_policy(RAW, &policy, AttachMethod::Mime));
        let report = mime_only.validate_policy_integrity();
        // The header already in RAW is left alone and lacks a root element.
        assert!(report.has_header && report.has_mime_part && report.extractable);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(mime_only.policy_sources()[1].resolve().unwrap(), policy);
        // Existing parts are kept.
        assert_eq!(mime_only.attachments.len(), 3);
        assert_eq!(mime_only.attachments[2].name, POLICY_FILENAME);

        let both = attach_policy("Subject: plain\n\nHello\n", &policy, AttachMethod::Both);
        let report = MailContext::from_raw(&both).validate_policy_integrity();
        assert!(report.has_header && report.has_mime_part && report.errors.is_empty());
        assert_eq!(report.policy.unwrap(), policy);
    }

    #[test]
    fn test_attach_policy_wraps_single_part_message() {
        let raw = "Subject: plain\r
Content-Type: text/html; charset=utf-8\r
Content-Transfer-Encoding: 7bit\r
\r
<p>Hello</p>\r
";
        let policy = templates::tracking_protection("it@company.com");
        let out = attach_policy(raw, &policy, AttachMethod::Mime);
        assert!(out.contains("MIME-Version: 1.0\r\n"));
        assert!(!out.contains(PRIVACY_HEADER));

        let mail = MailContext::from_raw(&out);
        let types: Vec<String> = mail.parts.iter().map(|p| p.content_type()).collect();
        assert_eq!(types, vec!["text/html", PRIVACY_MIME_TYPE]);
        assert_eq!(mail.parts[0].body, "<p>Hello</p>\n");
        assert_eq!(
            mail.parts[0].header("content-transfer-encoding"),
            Some("7bit")
        );
        assert_eq!(mail.policy_source().unwrap().resolve().unwrap(), policy);
    }

    #[test]
    fn test_compose_with_policy() {
        let policy = templates::strict_privacy("ceo@company.com");
        let raw = compose_with_policy(
            "ceo@company.com",
            "board@company.com",
            "Strategy",
            "<p>Confidential</p>",
            &policy,
            AttachMethod::Both,
        );

        let mail = MailContext::from_raw(&raw);
        assert_eq!(mail.subject.as_deref(), Some("Strategy"));
        assert_eq!(mail.parts.len(), 2);
        assert_eq!(mail.parts[0].content_type(), "text/html");
        assert_eq!(mail.parts[0].payload(), "<p>Confidential</p>\n");

        let report = mail.validate_policy_integrity();
        assert!(report.has_header && report.has_mime_part && report.extractable);
        assert_eq!(report.policy.unwrap(), policy);
    }

    #[test]
    fn test_attach_method_from_str() {
        assert_eq!("MIME".parse::<AttachMethod>().unwrap(), AttachMethod::Mime);
        assert_eq!("both".parse::<AttachMethod>().unwrap(), AttachMethod::Both);
        assert!("inline".parse::<AttachMethod>().is_err());
    }
}
