use crate::config::{Config, FilterSettings};
use crate::mail::Attachment;
use crate::notification::Notification;
use crate::policy::{ActionKind, Policy};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const TRACKING_MARKER: &str = "<!-- Tracking pixel removed by Email Privacy Framework -->";

/// One policy rule evaluated during a filter pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub rule_id: String,
    pub description: String,
    pub action_kind: ActionKind,
    pub applied: bool,
}

/// Outcome of a single filter pass.
///
/// `effects` lists the notifications the host should surface; the filter
/// itself never emits anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub content: String,
    pub tracking_stripped: bool,
    pub external_images: usize,
    pub attachments_allowed: bool,
    pub blocked_attachments: Vec<String>,
    pub actions: Vec<ActionRecord>,
    pub effects: Vec<Notification>,
}

pub struct ContentFilter {
    tracking_pattern: Regex,
    external_pattern: Regex,
    blocked_extensions: Vec<String>,
}

impl ContentFilter {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !config.tracking_keywords.is_empty(),
            "At least one tracking keyword is required"
        );

        let keywords = config
            .tracking_keywords
            .iter()
            .map(|k| regex::escape(k.trim()))
            .collect::<Vec<_>>()
            .join("|");

        let tracking_pattern = Regex::new(&format!(
            r#"(?i)<img[^>]*src=["'][^"']*(?:{keywords})[^"']*["'][^>]*>"#
        ))
        .map_err(|e| anyhow::anyhow!("Invalid tracking keyword pattern: {e}"))?;

        let external_pattern =
            Regex::new(r#"(?i)<img[^>]*src=["'](?:http://|https://)[^"']*["'][^>]*>"#)?;

        let blocked_extensions = config
            .blocked_extensions
            .iter()
            .map(|ext| ext.trim().to_lowercase())
            .collect();

        Ok(ContentFilter {
            tracking_pattern,
            external_pattern,
            blocked_extensions,
        })
    }

    /// Run the full pipeline: strip, warn, block-check, rule-apply.
    ///
    /// Never fails. With every setting off and no policy the content passes
    /// through untouched and no actions are recorded.
    pub fn apply(
        &self,
        content: &str,
        attachments: &[Attachment],
        settings: &FilterSettings,
        policy: Option<&Policy>,
    ) -> FilterResult {
        let mut effects = Vec::new();

        let mut tracking_stripped = false;
        let content = if settings.strip_tracking {
            let cleaned = self.strip_tracking_pixels(content);
            // Detected by length change rather than match count.
            if cleaned.len() != content.len() {
                log::info!("🔍 Removed tracking pixels from email content");
                tracking_stripped = true;
                effects.push(Notification::new(
                    "Tracking Protection",
                    "Tracking pixels were removed from this email",
                ));
            }
            cleaned
        } else {
            content.to_string()
        };

        let mut external_images = 0;
        if settings.warn_external {
            external_images = self.count_external_images(&content);
            if external_images > 0 {
                log::info!("Found {external_images} external images");
                effects.push(Notification::new(
                    "External Content",
                    format!(
                        "This email contains {external_images} external images that may track you"
                    ),
                ));
            }
        }

        let mut blocked_attachments = Vec::new();
        if settings.block_executables {
            blocked_attachments = self.executable_attachments(attachments);
            if !blocked_attachments.is_empty() {
                log::info!(
                    "Blocked {} executable attachments",
                    blocked_attachments.len()
                );
                effects.push(Notification::new(
                    "Security Block",
                    "Executable attachments were blocked for security",
                ));
            }
        }

        let mut actions = Vec::new();
        if let Some(policy) = policy {
            for rule in &policy.rules {
                log::debug!("Applying rule: {} - {}", rule.id, rule.description);
                actions.push(ActionRecord {
                    rule_id: rule.id.clone(),
                    description: rule.description.clone(),
                    action_kind: rule.action.kind.clone(),
                    applied: true,
                });
                effects.push(Notification::new(
                    format!("Policy: {}", rule.id),
                    rule.action.message.clone(),
                ));
            }
        }

        FilterResult {
            content,
            tracking_stripped,
            external_images,
            attachments_allowed: blocked_attachments.is_empty(),
            blocked_attachments,
            actions,
            effects,
        }
    }

    /// Replace every tracking `<img>` tag with [`TRACKING_MARKER`].
    pub fn strip_tracking_pixels(&self, content: &str) -> String {
        self.tracking_pattern
            .replace_all(content, TRACKING_MARKER)
            .into_owned()
    }

    /// Number of `<img>` tags loading from an absolute http(s) URL.
    pub fn count_external_images(&self, content: &str) -> usize {
        self.external_pattern.find_iter(content).count()
    }

    /// Names of attachments carrying an executable extension.
    pub fn executable_attachments(&self, attachments: &[Attachment]) -> Vec<String> {
        attachments
            .iter()
            .filter(|attachment| self.is_executable(&attachment.name))
            .map(|attachment| attachment.name.clone())
            .collect()
    }

    pub fn is_executable(&self, filename: &str) -> bool {
        let filename = filename.to_lowercase();
        self.blocked_extensions
            .iter()
            .any(|ext| filename.ends_with(ext.as_str()))
    }
}
