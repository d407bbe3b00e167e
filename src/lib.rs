pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod history;
pub mod mail;
pub mod mime;
pub mod notification;
pub mod policy;
pub mod templates;

pub use config::{Config, FilterSettings, SettingsUpdate};
pub use engine::PrivacyEngine;
pub use error::DecodeError;
pub use filter::{ActionRecord, ContentFilter, FilterResult};
pub use history::{HistoryEntry, PolicyHistory};
pub use mail::{
    attach_policy, compose_with_policy, AttachMethod, Attachment, MailContext, PolicyIntegrity,
    PolicySource,
};
pub use mime::MimePart;
pub use notification::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use policy::{decode, ActionKind, Policy, Rule, RuleAction};
