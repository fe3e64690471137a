//! # Localization Module
//!
//! User-facing messages in Korean and English, backed by Fluent resources
//! compiled into the binary. Requests pick a language from their
//! `Accept-Language` header; anything unsupported falls back to the
//! configured default.

use anyhow::{anyhow, bail, Context, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

/// Languages with a bundled resource, with their Fluent source
const RESOURCES: [(&str, &str); 2] = [
    ("ko", include_str!("../locales/ko/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

pub fn supported_languages() -> impl Iterator<Item = &'static str> {
    RESOURCES.iter().map(|(lang, _)| *lang)
}

/// Message lookup shared by all request handlers
pub struct Localizer {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
    default_language: String,
}

impl std::fmt::Debug for Localizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Localizer")
            .field("languages", &self.bundles.keys().collect::<Vec<_>>())
            .field("default_language", &self.default_language)
            .finish()
    }
}

impl Localizer {
    /// Load every bundled language
    ///
    /// # Errors
    ///
    /// Fails when a resource does not parse or `default_language` has no
    /// bundle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cookit::localization::Localizer;
    ///
    /// let localizer = Localizer::new("ko").unwrap();
    /// assert_eq!(localizer.resolve_language(Some("en-US,en;q=0.9")), "en");
    /// assert_eq!(localizer.resolve_language(Some("fr")), "ko");
    /// ```
    pub fn new(default_language: &str) -> Result<Self> {
        let mut bundles = HashMap::new();
        for (lang, source) in RESOURCES {
            let bundle = Self::create_bundle(lang, source)
                .with_context(|| format!("Failed to load {lang} messages"))?;
            bundles.insert(lang.to_string(), bundle);
        }

        if !bundles.contains_key(default_language) {
            bail!("No messages bundled for default language {default_language}");
        }

        Ok(Self {
            bundles,
            default_language: default_language.to_string(),
        })
    }

    fn create_bundle(lang: &str, source: &str) -> Result<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = lang.parse()?;
        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Invalid Fluent resource: {errors:?}"))?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // No bidi isolation marks around arguments; messages end up in JSON
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Duplicate Fluent messages: {errors:?}"))?;
        Ok(bundle)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Pick the best supported language from an `Accept-Language` value
    ///
    /// Entries are tried by descending quality; only the primary language
    /// subtag is compared.
    pub fn resolve_language(&self, accept_language: Option<&str>) -> &str {
        let Some(header) = accept_language else {
            return &self.default_language;
        };

        let mut ranked: Vec<(&str, f32)> = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.trim().split(';');
                let tag = parts.next()?.trim();
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                (!tag.is_empty()).then_some((tag, quality))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (tag, _) in ranked {
            let Ok(langid) = tag.parse::<LanguageIdentifier>() else {
                continue;
            };
            let language = langid.language.to_string();
            if let Some((key, _)) = self.bundles.get_key_value(&language) {
                return key;
            }
        }
        &self.default_language
    }

    /// Message `key` in `lang`, falling back to the default language
    pub fn message(&self, lang: &str, key: &str) -> String {
        self.format(lang, key, None)
    }

    pub fn message_with_args(&self, lang: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.format(lang, key, Some(&fluent_args))
    }

    fn format(&self, lang: &str, key: &str, args: Option<&FluentArgs>) -> String {
        let bundle = self
            .bundles
            .get(lang)
            .filter(|bundle| bundle.has_message(key))
            .or_else(|| self.bundles.get(&self.default_language));

        let Some((bundle, pattern)) = bundle.and_then(|bundle| {
            let pattern = bundle.get_message(key)?.value()?;
            Some((bundle, pattern))
        }) else {
            return format!("Missing translation: {key}");
        };

        let mut errors = Vec::new();
        bundle.format_pattern(pattern, args, &mut errors).into_owned()
    }
}
