//! Content negotiation for serializers and loaders
//!
//! Response format resolution order:
//! 1. explicit format query argument, looked up in the alias map
//! 2. the `Accept` header, with quality values and wildcards
//! 3. the endpoint's default media type when the client states no preference
//!
//! An explicit request that cannot be honoured is an error, never a silent
//! fallback to the default.

use indexmap::IndexMap;

use crate::core::error::NegotiationError;

/// One entry of an `Accept` header
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub type_: String,
    pub subtype: String,
    pub quality: f32,
}

impl MediaRange {
    /// Parse a single range such as `application/json;q=0.8`
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        let (type_, subtype) = essence.split_once('/')?;
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut quality = 1.0;
        for param in parts {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("q") {
                    quality = value.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                }
            }
        }

        Some(Self {
            type_: type_.to_string(),
            subtype: subtype.to_string(),
            quality,
        })
    }

    /// Whether this range covers `media_type`
    pub fn matches(&self, media_type: &str) -> bool {
        let Some((type_, subtype)) = media_type.split_once('/') else {
            return false;
        };
        (self.type_ == "*" || self.type_ == type_)
            && (self.subtype == "*" || self.subtype == subtype)
    }

    /// 0 for `*/*`, 1 for `type/*`, 2 for a concrete type
    pub fn specificity(&self) -> u8 {
        match (self.type_.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.specificity() == 0
    }
}

/// Parse an `Accept` header, skipping malformed entries
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    header
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(MediaRange::parse)
        .collect()
}

/// Lower-cased media type without parameters
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Quality the client assigns to `media_type`; the most specific range wins
fn quality_for(ranges: &[MediaRange], media_type: &str) -> f32 {
    ranges
        .iter()
        .filter(|range| range.matches(media_type))
        .max_by_key(|range| range.specificity())
        .map(|range| range.quality)
        .unwrap_or(0.0)
}

/// Select a response binding
///
/// Returns the chosen media type together with its binding.
pub fn select<'b, T>(
    format: Option<&str>,
    accept: Option<&str>,
    aliases: &IndexMap<String, String>,
    bindings: &'b IndexMap<String, T>,
    default_media_type: &str,
) -> Result<(&'b str, &'b T), NegotiationError> {
    if let Some(format) = format.filter(|f| !f.is_empty()) {
        let media_type = aliases
            .get(format)
            .ok_or_else(|| NegotiationError::UnknownFormat {
                format: format.to_string(),
            })?;
        return bindings
            .get_key_value(media_type.as_str())
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| NegotiationError::NotAcceptable {
                requested: media_type.clone(),
            });
    }

    let ranges = accept.map(parse_accept).unwrap_or_default();
    let states_preference = ranges
        .iter()
        .any(|range| !range.is_wildcard() || range.quality < 1.0);

    if states_preference {
        let mut best: Option<(f32, &'b String, &'b T)> = None;
        for (media_type, binding) in bindings {
            let quality = quality_for(&ranges, media_type);
            if quality <= 0.0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((q, current, _)) => {
                    quality > q || (quality == q && media_type == default_media_type && current != default_media_type)
                }
            };
            if better {
                best = Some((quality, media_type, binding));
            }
        }

        return best
            .map(|(_, media_type, binding)| (media_type.as_str(), binding))
            .ok_or_else(|| NegotiationError::NotAcceptable {
                requested: accept.unwrap_or_default().to_string(),
            });
    }

    bindings
        .get_key_value(default_media_type)
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| NegotiationError::NotAcceptable {
            requested: default_media_type.to_string(),
        })
}

/// Select a request body loader from the `Content-Type` header
///
/// A missing content type falls back to the default media type.
pub fn select_loader<'b, T>(
    content_type: Option<&str>,
    loaders: &'b IndexMap<String, T>,
    default_media_type: &str,
) -> Result<(&'b str, &'b T), NegotiationError> {
    let requested = content_type
        .map(essence)
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| default_media_type.to_string());

    loaders
        .get_key_value(requested.as_str())
        .map(|(k, v)| (k.as_str(), v))
        .ok_or(NegotiationError::UnsupportedMediaType {
            content_type: requested,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> IndexMap<String, &'static str> {
        IndexMap::from([
            ("application/json".to_string(), "json"),
            ("application/x-yaml".to_string(), "yaml"),
        ])
    }

    fn aliases() -> IndexMap<String, String> {
        IndexMap::from([
            ("json".to_string(), "application/json".to_string()),
            ("yaml".to_string(), "application/x-yaml".to_string()),
            ("xml".to_string(), "application/xml".to_string()),
        ])
    }

    fn pick(format: Option<&str>, accept: Option<&str>) -> Result<&'static str, NegotiationError> {
        let bindings = bindings();
        select(format, accept, &aliases(), &bindings, "application/json").map(|(_, b)| *b)
    }

    #[test]
    fn test_parse_media_range() {
        let range = MediaRange::parse(" Application/JSON ; q=0.5").unwrap();
        assert_eq!(range.type_, "application");
        assert_eq!(range.subtype, "json");
        assert_eq!(range.quality, 0.5);
        assert!(MediaRange::parse("garbage").is_none());
        assert!(MediaRange::parse("text/html;q=abc").is_none());
    }

    #[test]
    fn test_no_preference_uses_default() {
        assert_eq!(pick(None, None).unwrap(), "json");
        assert_eq!(pick(None, Some("*/*")).unwrap(), "json");
        assert_eq!(pick(None, Some("")).unwrap(), "json");
    }

    #[test]
    fn test_accept_header_quality_wins() {
        assert_eq!(
            pick(None, Some("application/json;q=0.4, application/x-yaml")).unwrap(),
            "yaml"
        );
        assert_eq!(pick(None, Some("application/*")).unwrap(), "json");
        assert_eq!(
            pick(None, Some("text/html, application/x-yaml;q=0.1")).unwrap(),
            "yaml"
        );
    }

    #[test]
    fn test_specific_range_overrides_wildcard() {
        assert_eq!(
            pick(None, Some("*/*, application/json;q=0")).unwrap(),
            "yaml"
        );
    }

    #[test]
    fn test_unmatched_accept_is_not_acceptable() {
        let err = pick(None, Some("text/html")).unwrap_err();
        assert!(matches!(err, NegotiationError::NotAcceptable { .. }));
    }

    #[test]
    fn test_format_argument_beats_accept() {
        assert_eq!(pick(Some("yaml"), Some("application/json")).unwrap(), "yaml");
    }

    #[test]
    fn test_unknown_or_unbound_format_is_rejected() {
        assert!(matches!(
            pick(Some("csv"), None).unwrap_err(),
            NegotiationError::UnknownFormat { .. }
        ));
        assert!(matches!(
            pick(Some("xml"), None).unwrap_err(),
            NegotiationError::NotAcceptable { .. }
        ));
    }

    #[test]
    fn test_select_loader() {
        let loaders = IndexMap::from([
            ("application/json".to_string(), "json"),
            ("application/json-patch+json".to_string(), "patch"),
        ]);

        let (_, loader) =
            select_loader(Some("application/json; charset=utf-8"), &loaders, "application/json")
                .unwrap();
        assert_eq!(*loader, "json");

        let (_, loader) = select_loader(None, &loaders, "application/json").unwrap();
        assert_eq!(*loader, "json");

        let err = select_loader(Some("text/plain"), &loaders, "application/json").unwrap_err();
        assert!(matches!(err, NegotiationError::UnsupportedMediaType { .. }));
    }
}
