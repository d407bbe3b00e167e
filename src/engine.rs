use crate::config::{Config, FilterSettings, SettingsUpdate};
use crate::error::DecodeError;
use crate::filter::{ContentFilter, FilterResult};
use crate::history::{HistoryEntry, PolicyHistory};
use crate::mail::MailContext;
use crate::notification::{Notification, Notifier};
use crate::policy::{self, Policy};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// One host session: settings, history and the notification sink.
///
/// All state lives on the instance; separate engines never observe each
/// other.
pub struct PrivacyEngine {
    filter: ContentFilter,
    settings: Mutex<FilterSettings>,
    history: Mutex<PolicyHistory>,
    notifier: Box<dyn Notifier>,
}

impl PrivacyEngine {
    pub fn new(config: &Config, notifier: Box<dyn Notifier>) -> anyhow::Result<Self> {
        config.validate()?;
        let filter = ContentFilter::new(config)?;

        log::debug!(
            "Privacy engine ready (history capacity {}, {} tracking keywords, {} blocked extensions)",
            config.history_capacity,
            config.tracking_keywords.len(),
            config.blocked_extensions.len()
        );

        Ok(PrivacyEngine {
            filter,
            settings: Mutex::new(config.settings),
            history: Mutex::new(PolicyHistory::with_capacity(config.history_capacity)),
            notifier,
        })
    }

    pub fn settings(&self) -> FilterSettings {
        *lock(&self.settings)
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> FilterSettings {
        let updated = {
            let mut settings = lock(&self.settings);
            settings.merge(update);
            *settings
        };
        log::info!("Settings updated: {:?}", updated);
        self.emit(
            &updated,
            &Notification::new("Settings Updated", "Your privacy settings have been updated"),
        );
        updated
    }

    pub fn decode_policy(&self, encoded: &str) -> Result<Policy, DecodeError> {
        policy::decode(encoded)
    }

    /// Filter a message against the current settings and an optional policy.
    pub fn inspect(&self, mail: &MailContext, policy: Option<&Policy>) -> FilterResult {
        let settings = self.settings();
        let result = self
            .filter
            .apply(mail.content(), &mail.attachments, &settings, policy);

        for effect in &result.effects {
            self.emit(&settings, effect);
        }

        if settings.log_history {
            let entry = HistoryEntry::new(mail.summary(), policy, result.actions.clone(), settings);
            log::info!(
                "Policy logged: {} ({} rules, {} actions)",
                entry.email.subject,
                entry.rules.len(),
                entry.actions.len()
            );
            lock(&self.history).push(entry);
        }

        result
    }

    /// Decode the policy and inspect the message.
    ///
    /// An explicit policy wins. Otherwise the message's embedded policies
    /// are tried in order (header, MIME part, body comment) and the first
    /// readable one is used. A malformed policy aborts before anything is
    /// filtered or logged.
    pub fn process(
        &self,
        mail: &MailContext,
        encoded_policy: Option<&str>,
    ) -> Result<FilterResult, DecodeError> {
        let policy = match encoded_policy {
            Some(encoded) => Some(self.decode_policy(encoded)),
            None => self.embedded_policy(mail),
        };

        let policy = match policy.transpose() {
            Ok(policy) => policy,
            Err(e) => {
                log::error!("Error processing policy: {e}");
                return Err(e);
            }
        };

        let result = self.inspect(mail, policy.as_ref());
        log::debug!("Privacy policy processed, {} actions", result.actions.len());
        Ok(result)
    }

    fn embedded_policy(&self, mail: &MailContext) -> Option<Result<Policy, DecodeError>> {
        let mut first_error = None;

        for source in mail.policy_sources() {
            match source.resolve() {
                Ok(policy) => {
                    log::debug!("Using privacy policy from {source}");
                    return Some(Ok(policy));
                }
                Err(e) => {
                    log::warn!("Unreadable privacy policy in {source}: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map(Err)
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).entries()
    }

    pub fn recent_history(&self, count: usize) -> Vec<HistoryEntry> {
        lock(&self.history).recent(count)
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
        log::info!("Policy history cleared");
    }

    fn emit(&self, settings: &FilterSettings, notification: &Notification) {
        log::info!("{}: {}", notification.title, notification.message);
        if settings.notify {
            self.notifier.notify(notification);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
