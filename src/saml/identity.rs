//! Mapping a verified assertion to a federated identity.

use std::collections::BTreeMap;

use super::assertion::ParsedAssertion;
use super::config::AttributeMapping;
use crate::error::Error;

pub const MAX_ATTRIBUTE_CHARS: usize = 1024;

const EMAIL_ATTRIBUTES: &[&str] = &[
    "email",
    "mail",
    "emailAddress",
    "urn:oid:0.9.2342.19200300.100.1.3",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
];

const NAME_ATTRIBUTES: &[&str] = &[
    "displayName",
    "name",
    "cn",
    "urn:oid:2.16.840.1.113730.3.1.241",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name",
];

const FIRST_NAME_ATTRIBUTES: &[&str] = &[
    "givenName",
    "firstName",
    "urn:oid:2.5.4.42",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname",
];

const LAST_NAME_ATTRIBUTES: &[&str] = &[
    "sn",
    "surname",
    "lastName",
    "urn:oid:2.5.4.4",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname",
];

const GROUP_ATTRIBUTES: &[&str] = &[
    "groups",
    "memberOf",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/groups",
];

/// Identity asserted by an IdP, after sanitization.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FederatedIdentity {
    pub provider: String,
    pub name_id: String,
    pub email: String,
    pub name: String,
    pub groups: Vec<String>,
    pub session_index: Option<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Removes NUL, C0 controls other than tab/LF/CR, and DEL, then trims and caps the length.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|&c| !(c < ' ' && c != '\t' && c != '\n' && c != '\r') && c != '\u{7f}')
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_ATTRIBUTE_CHARS)
        .collect()
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

/// First non-empty sanitized value among `mapped` and then `fallbacks`.
fn pick(assertion: &ParsedAssertion, mapped: Option<&String>, fallbacks: &[&str]) -> Option<String> {
    mapped
        .map(String::as_str)
        .into_iter()
        .chain(fallbacks.iter().copied())
        .filter_map(|attr| assertion.first(attr))
        .map(sanitize)
        .find(|v| !v.is_empty())
}

pub fn resolve_identity(
    provider: &str,
    mapping: &AttributeMapping,
    assertion: &ParsedAssertion,
) -> Result<FederatedIdentity, Error> {
    let name_id = sanitize(&assertion.name_id);

    let email = pick(assertion, mapping.email.as_ref(), EMAIL_ATTRIBUTES)
        .or_else(|| Some(name_id.clone()).filter(|n| looks_like_email(n)))
        .ok_or(Error::MissingEmail)?;

    let name = pick(assertion, mapping.name.as_ref(), NAME_ATTRIBUTES).unwrap_or_else(|| {
        let first = pick(assertion, mapping.first_name.as_ref(), FIRST_NAME_ATTRIBUTES);
        let last = pick(assertion, mapping.last_name.as_ref(), LAST_NAME_ATTRIBUTES);
        match (first, last) {
            (Some(first), Some(last)) => sanitize(&format!("{} {}", first, last)),
            (Some(one), None) | (None, Some(one)) => one,
            (None, None) => String::new(),
        }
    });

    let groups = mapping
        .groups
        .as_deref()
        .into_iter()
        .chain(GROUP_ATTRIBUTES.iter().copied())
        .map(|attr| assertion.all(attr))
        .find(|values| !values.is_empty())
        .map(|values| {
            values
                .iter()
                .map(|g| sanitize(g))
                .filter(|g| !g.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let attributes: BTreeMap<String, Vec<String>> = assertion
        .attributes
        .iter()
        .map(|(k, vs)| (k.clone(), vs.iter().map(|v| sanitize(v)).collect()))
        .collect();

    Ok(FederatedIdentity {
        provider: provider.to_string(),
        name_id,
        email,
        name,
        groups,
        session_index: assertion.session_index.clone(),
        attributes,
    })
}
