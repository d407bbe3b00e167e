//! Ready-made policies for common use cases.

use crate::policy::{ActionKind, Policy, Rule};

pub const TEMPLATE_NAMES: [&str; 4] = [
    "no-forwarding",
    "tracking-protection",
    "attachment-control",
    "strict",
];

/// Warn recipients not to forward the message.
pub fn no_forwarding(creator: &str) -> Policy {
    let mut policy = Policy::new(creator);
    policy.add_rule(Rule::new(
        "no-forward-1",
        "Detect and warn on forwarding attempts",
        ActionKind::Warn,
        "This email should not be forwarded",
    ));
    policy
}

pub fn tracking_protection(creator: &str) -> Policy {
    let mut policy = Policy::new(creator);
    policy.add_rule(Rule::new(
        "block-tracking-1",
        "Remove tracking pixels",
        ActionKind::Strip,
        "Tracking pixel detected and removed",
    ));
    policy.add_rule(Rule::new(
        "block-external-2",
        "Warn about external images",
        ActionKind::Warn,
        "External image detected - privacy risk",
    ));
    policy.add_rule(Rule::new(
        "text-tracking-3",
        "Text-based tracking detection",
        ActionKind::Warn,
        "Potential tracking content detected",
    ));
    policy
}

pub fn attachment_control(creator: &str) -> Policy {
    let mut policy = Policy::new(creator);
    policy.add_rule(Rule::new(
        "block-exe-attachments-1",
        "Block executable attachments",
        ActionKind::Block,
        "Executable attachments are not allowed",
    ));
    policy
}

/// Every rule of the other templates, in template order.
pub fn strict_privacy(creator: &str) -> Policy {
    let mut policy = Policy::new(creator);
    for template in [
        no_forwarding(creator),
        tracking_protection(creator),
        attachment_control(creator),
    ] {
        policy.rules.extend(template.rules);
    }
    policy
}

pub fn by_name(name: &str, creator: &str) -> Option<Policy> {
    match name.to_lowercase().as_str() {
        "no-forwarding" => Some(no_forwarding(creator)),
        "tracking-protection" => Some(tracking_protection(creator)),
        "attachment-control" => Some(attachment_control(creator)),
        "strict" | "strict-privacy" => Some(strict_privacy(creator)),
        _ => None,
    }
}
