use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// `source_field` used for fields whose content carries no legacy placeholder.
pub const CUSTOM_TEXT: &str = "custom text";

lazy_static! {
    // %name% where name is a non-empty run of non-whitespace, matched lazily.
    // Only ASCII whitespace breaks a name; NBSP and friends are part of it.
    static ref LEGACY_PLACEHOLDER: Regex = Regex::new(r"%([^ \t\n\x0B\x0C\r]+?)%").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LegacyField<'a> {
    Placeholder(&'a str),
    NoPlaceholder,
}

impl<'a> LegacyField<'a> {
    pub fn source_field(&self) -> &'a str {
        match *self {
            LegacyField::Placeholder(name) => name,
            LegacyField::NoPlaceholder => CUSTOM_TEXT,
        }
    }
}

/// First left-to-right `%name%` in `content`.
pub fn first_placeholder(content: &str) -> LegacyField<'_> {
    match LEGACY_PLACEHOLDER.captures(content).and_then(|c| c.get(1)) {
        Some(m) => LegacyField::Placeholder(m.as_str()),
        None => LegacyField::NoPlaceholder,
    }
}

/// Rewrites every `%name%` into `{{ <integration>[name] }}`; everything else is kept verbatim.
pub fn rewrite_content(integration: &str, content: &str) -> String {
    LEGACY_PLACEHOLDER
        .replace_all(content, |caps: &Captures| {
            format!("{{{{ {}[{}] }}}}", integration, &caps[1])
        })
        .into_owned()
}
