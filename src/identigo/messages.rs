//! Locale-aware message templates for human-readable failure and notice text.
//!
//! Handlers never embed free text: they reference a template id plus
//! positional arguments, and the negotiated locale picks the wording at the
//! point where a failure or notice is rendered. Missing translations fall
//! back to English; a missing id falls back to the id itself so a broken
//! catalog never turns into a request failure.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    En,
    Eo,
}

impl Locale {
    /// Parse an `Accept-Language`-style tag, defaulting to English.
    #[must_use]
    pub fn negotiate(tag: &str) -> Self {
        match tag.split(['-', '_', ';']).next().map(str::trim) {
            Some(lang) if lang.eq_ignore_ascii_case("eo") => Self::Eo,
            _ => Self::En,
        }
    }
}

/// A template id plus positional arguments, resolved lazily against a locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub id: &'static str,
    pub args: Vec<String>,
}

impl MessageRef {
    #[must_use]
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(id: &'static str, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            id,
            args: args.into_iter().collect(),
        }
    }
}

pub struct Messages {
    catalog: HashMap<(Locale, &'static str), &'static str>,
}

impl Messages {
    /// The built-in catalog shipped with the server.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = HashMap::new();
        for (id, text) in EN {
            catalog.insert((Locale::En, *id), *text);
        }
        for (id, text) in EO {
            catalog.insert((Locale::Eo, *id), *text);
        }
        Self { catalog }
    }

    /// Render a message reference in the given locale.
    #[must_use]
    pub fn format(&self, locale: Locale, message: &MessageRef) -> String {
        let template = self
            .catalog
            .get(&(locale, message.id))
            .or_else(|| self.catalog.get(&(Locale::En, message.id)))
            .copied()
            .unwrap_or(message.id);

        let mut rendered = template.to_string();
        for (index, arg) in message.args.iter().enumerate() {
            rendered = rendered.replace(&format!("{{{index}}}"), arg);
        }
        rendered
    }
}

const EN: &[(&str, &str)] = &[
    ("auth.rate-limited", "Too many {0} attempts, try again later"),
    ("auth.invalid-credentials", "Invalid email or password"),
    ("auth.not-signed-in", "Not signed in"),
    ("auth.admin-required", "Administrator session required"),
    ("auth.credential-error", "Credential processing failed"),
    ("user.email-invalid", "Not a valid email address: {0}"),
    ("user.name-invalid", "Not a usable display name"),
    ("user.email-taken", "The email address is already in use"),
    ("user.unknown", "No such user"),
    ("admin.unknown", "No such administrator"),
    ("password.too-short", "Password must be at least {0} characters"),
    ("password.too-long", "Password must be at most {0} characters"),
    ("password.too-simple", "Password must mix letters and other characters"),
    ("password.mismatch", "Current password does not match"),
    ("token.invalid", "The verification link is invalid or has expired"),
    ("mail.failed", "Could not send email, try again later"),
    ("permission.unknown", "Unknown permission: {0}"),
    ("notice.email-added", "Email address updated"),
    ("notice.email-denied", "Email change cancelled"),
    ("notice.verification-sent", "Verification email sent to {0}"),
    ("remedy.retry-later", "Retry later"),
    ("remedy.fix-input", "Fix the request input and retry"),
];

const EO: &[(&str, &str)] = &[
    ("auth.invalid-credentials", "Nevalida retpoŝto aŭ pasvorto"),
    ("auth.not-signed-in", "Ne ensalutita"),
    ("user.unknown", "Ne ekzistas tia uzanto"),
    ("notice.email-added", "Retpoŝta adreso ĝisdatigita"),
];

#[cfg(test)]
mod tests {
    use super::{Locale, MessageRef, Messages};

    #[test]
    fn formats_positional_arguments() {
        let messages = Messages::builtin();
        let rendered = messages.format(
            Locale::En,
            &MessageRef::with_args("user.email-invalid", vec!["nope".to_string()]),
        );
        assert_eq!(rendered, "Not a valid email address: nope");
    }

    #[test]
    fn falls_back_to_english_then_id() {
        let messages = Messages::builtin();
        // Present in En, absent in Eo.
        let rendered = messages.format(Locale::Eo, &MessageRef::new("user.email-taken"));
        assert_eq!(rendered, "The email address is already in use");

        let rendered = messages.format(Locale::En, &MessageRef::new("no.such.template"));
        assert_eq!(rendered, "no.such.template");
    }

    #[test]
    fn localized_template_wins() {
        let messages = Messages::builtin();
        let rendered = messages.format(Locale::Eo, &MessageRef::new("auth.not-signed-in"));
        assert_eq!(rendered, "Ne ensalutita");
    }

    #[test]
    fn negotiate_parses_language_tags() {
        assert_eq!(Locale::negotiate("eo"), Locale::Eo);
        assert_eq!(Locale::negotiate("eo-XX;q=0.9"), Locale::Eo);
        assert_eq!(Locale::negotiate("en-US"), Locale::En);
        assert_eq!(Locale::negotiate(""), Locale::En);
    }
}
