//! Privacy policy model and the markup decoder.
//!
//! Policies travel base64-encoded (usually in the `X-Privacy-Policy` header)
//! and are read with tag lookups rather than a full XML parser:
//!
//! ```text
//! <PrivacyPolicy>
//!   <Metadata><Creator>hr@company.com</Creator></Metadata>
//!   <Rules>
//!     <Rule id="no-forward">
//!       <Description>Warn about forwarding</Description>
//!       <Action type="warn" message="Do not forward this email"/>
//!     </Rule>
//!   </Rules>
//! </PrivacyPolicy>
//! ```

use crate::error::DecodeError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::prelude::*;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the base64 encoded policy.
pub const PRIVACY_HEADER: &str = "X-Privacy-Policy";

pub const UNKNOWN_CREATOR: &str = "unknown";
const DEFAULT_DESCRIPTION: &str = "No description";
const DEFAULT_MESSAGE: &str = "Action applied";

// Padding is optional and non-zero trailing bits are ignored, as `atob` does.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

lazy_static! {
    static ref CREATOR_PATTERN: Regex = Regex::new(r"(?i)<creator>([^<]+)</creator>").unwrap();
    // `\b` keeps the `<Rules>` wrapper from being taken for a rule.
    static ref RULE_PATTERN: Regex = Regex::new(r"(?is)<rule\b[^>]*>.*?</rule\s*>").unwrap();
    static ref ID_PATTERN: Regex = Regex::new(r#"\bid="([^"]*)""#).unwrap();
    static ref DESCRIPTION_PATTERN: Regex =
        Regex::new(r"(?i)<description>([^<]+)</description>").unwrap();
    static ref ACTION_TYPE_PATTERN: Regex =
        Regex::new(r#"(?i)<action\b[^>]*\btype="([^"]*)""#).unwrap();
    static ref MESSAGE_PATTERN: Regex = Regex::new(r#"\bmessage="([^"]*)""#).unwrap();
    static ref ROOT_PATTERN: Regex = Regex::new(r"(?i)<privacypolicy\b").unwrap();
}

/// What a rule asks the client to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Allow,
    Warn,
    Strip,
    Block,
    Notify,
    Encrypt,
    Log,
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Allow => "allow",
            ActionKind::Warn => "warn",
            ActionKind::Strip => "strip",
            ActionKind::Block => "block",
            ActionKind::Notify => "notify",
            ActionKind::Encrypt => "encrypt",
            ActionKind::Log => "log",
            ActionKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "allow" => ActionKind::Allow,
            "warn" => ActionKind::Warn,
            "strip" => ActionKind::Strip,
            "block" => ActionKind::Block,
            "notify" => ActionKind::Notify,
            "encrypt" => ActionKind::Encrypt,
            "log" => ActionKind::Log,
            _ => ActionKind::Other(value.to_string()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        ActionKind::from(value.as_str())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    pub kind: ActionKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub action: RuleAction,
}

impl Rule {
    pub fn new(id: &str, description: &str, kind: ActionKind, message: &str) -> Self {
        Rule {
            id: id.to_string(),
            description: description.to_string(),
            action: RuleAction {
                kind,
                message: message.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub creator: String,
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(creator: &str) -> Self {
        Policy {
            creator: creator.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Render the policy in the markup understood by [`decode`].
    pub fn to_markup(&self) -> String {
        let mut markup = String::from(r#"<PrivacyPolicy version="1.0">"#);
        markup.push_str("<Metadata><Creator>");
        markup.push_str(&escape(&self.creator));
        markup.push_str("</Creator></Metadata><Rules>");
        for rule in &self.rules {
            markup.push_str(&format!(
                r#"<Rule id="{}"><Description>{}</Description><Action type="{}" message="{}"/></Rule>"#,
                escape(&rule.id),
                escape(&rule.description),
                escape(rule.action.kind.as_str()),
                escape(&rule.action.message),
            ));
        }
        markup.push_str("</Rules></PrivacyPolicy>");
        markup
    }

    /// Base64 form suitable for the [`PRIVACY_HEADER`] header.
    pub fn encode(&self) -> String {
        BASE64_STANDARD.encode(self.to_markup())
    }
}

/// Decode a base64 policy payload.
///
/// Only a broken base64 payload is an error. Missing tags fall back to
/// defaults, and rules lacking an `id` or an action `type` are dropped.
pub fn decode(encoded: &str) -> Result<Policy, DecodeError> {
    let markup = decode_base64_text(encoded)?;

    log::debug!(
        "Decoding privacy policy: {}",
        markup.chars().take(200).collect::<String>()
    );

    Ok(parse_markup(&markup))
}

/// Base64 payload to text. ASCII whitespace is skipped and invalid UTF-8
/// is replaced.
pub fn decode_base64_text(encoded: &str) -> Result<String, DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = LENIENT_BASE64.decode(compact)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether the markup carries a `<PrivacyPolicy>` root element.
pub fn looks_like_policy(markup: &str) -> bool {
    ROOT_PATTERN.is_match(markup)
}

/// Extract creator and rules from already decoded policy markup.
pub fn parse_markup(markup: &str) -> Policy {
    let creator = CREATOR_PATTERN
        .captures(markup)
        .map(|caps| unescape(&caps[1]))
        .unwrap_or_else(|| UNKNOWN_CREATOR.to_string());

    let mut rules = Vec::new();
    for block in RULE_PATTERN.find_iter(markup) {
        let block = block.as_str();
        let id = ID_PATTERN.captures(block);
        let kind = ACTION_TYPE_PATTERN.captures(block);

        let (Some(id), Some(kind)) = (id, kind) else {
            log::debug!("Skipping rule without id or action type");
            continue;
        };

        let description = DESCRIPTION_PATTERN
            .captures(block)
            .map(|caps| unescape(&caps[1]))
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let message = MESSAGE_PATTERN
            .captures(block)
            .map(|caps| unescape(&caps[1]))
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        rules.push(Rule {
            id: unescape(&id[1]),
            description,
            action: RuleAction {
                kind: ActionKind::from(unescape(&kind[1])),
                message,
            },
        });
    }

    Policy { creator, rules }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
