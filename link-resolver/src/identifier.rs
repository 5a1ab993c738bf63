use percent_encoding::percent_decode_str;
use url::Url;

use crate::api::errors::ResolveError;

/// An inbound short link identifier, split into the pieces the addressing
/// schemes care about. Built once per request, before any storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentifier {
    pub raw_identifier: String,
    pub slug_part: String,
    pub path_short_id: Option<i32>,
    pub query_short_id: Option<i32>,
    /// Trimmed `id` query value, kept verbatim for primary key lookups.
    pub query_id: Option<String>,
}

/// The single addressing scheme a request resolves through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressingIntent {
    BySlugAndShortId { slug: String, short_id: i32 },
    ByQueryId { link_id: String },
    /// Listing is attempted first; when no team owns the slug the bare
    /// identifier is tried as a link primary key.
    BySlugListing { slug: String, link_id: String },
    ByRawId { link_id: String },
}

impl ParsedIdentifier {
    pub fn parse(identifier: &str, query_id: Option<&str>) -> Result<Self, ResolveError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ResolveError::InvalidRequest(
                "Link identifier is required".to_string(),
            ));
        }

        let (slug_part, path_short_id) = split_short_id(identifier);

        let query_id = query_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let query_short_id = query_id.as_deref().and_then(parse_positive_int);

        Ok(Self {
            raw_identifier: identifier.to_string(),
            slug_part: slug_part.to_string(),
            path_short_id,
            query_short_id,
            query_id,
        })
    }

    /// Derives the identifier from a full short link URL: the last non-empty
    /// path segment and its `id` query parameter.
    pub fn from_url(raw_url: &str) -> Result<Self, ResolveError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(ResolveError::InvalidRequest(
                "Request URL is required".to_string(),
            ));
        }

        let url = Url::parse(raw_url)
            .map_err(|_| ResolveError::InvalidRequest("Invalid request URL".to_string()))?;

        let last_segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default();
        let identifier = percent_decode_str(last_segment).decode_utf8_lossy();

        let query_id = url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned());

        Self::parse(&identifier, query_id.as_deref())
    }

    /// Path short id wins over the query one.
    pub fn short_id(&self) -> Option<i32> {
        self.path_short_id.or(self.query_short_id)
    }

    pub fn normalized_slug(&self) -> String {
        self.slug_part.to_lowercase()
    }

    /// Applies the addressing precedence. With `allow_listing` off, a bare
    /// slug goes straight to the primary key lookup.
    pub fn intent(&self, allow_listing: bool) -> AddressingIntent {
        if let Some(short_id) = self.short_id() {
            if !self.slug_part.is_empty() {
                return AddressingIntent::BySlugAndShortId {
                    slug: self.normalized_slug(),
                    short_id,
                };
            }
        }

        if let Some(link_id) = &self.query_id {
            return AddressingIntent::ByQueryId {
                link_id: link_id.clone(),
            };
        }

        if allow_listing && !self.slug_part.is_empty() {
            return AddressingIntent::BySlugListing {
                slug: self.normalized_slug(),
                link_id: self.raw_identifier.clone(),
            };
        }

        AddressingIntent::ByRawId {
            link_id: self.raw_identifier.clone(),
        }
    }
}

/// Splits `slug-42` on the last dash. The split only sticks when the dash is
/// interior and the suffix reads as a positive integer.
fn split_short_id(identifier: &str) -> (&str, Option<i32>) {
    match identifier.rfind('-') {
        Some(dash) if dash > 0 && dash < identifier.len() - 1 => {
            match parse_positive_int(&identifier[dash + 1..]) {
                Some(short_id) => (&identifier[..dash], Some(short_id)),
                None => (identifier, None),
            }
        }
        _ => (identifier, None),
    }
}

/// The run of digits `parseInt` would read from `value` (after leading
/// whitespace and an optional `+`). `None` for a negative sign or no digits.
pub fn leading_unsigned_digits(value: &str) -> Option<&str> {
    let value = value.trim_start();
    let rest = match value.as_bytes().first() {
        Some(b'-') => return None,
        Some(b'+') => &value[1..],
        _ => value,
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    (digits_len > 0).then(|| &rest[..digits_len])
}

/// Reads a leading base-10 integer the way browsers' `parseInt` does
/// (leading whitespace, optional sign, digits up to the first non-digit) and
/// keeps it only when it is a positive `i32`.
pub fn parse_positive_int(value: &str) -> Option<i32> {
    leading_unsigned_digits(value)?
        .parse::<i32>()
        .ok()
        .filter(|parsed| *parsed > 0)
}
