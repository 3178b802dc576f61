//! Checks applied to an assertion once the signature and structure have been verified.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{event, Level};

use crate::core::types::AssertionId;
use crate::error::Error;

/// The parts of a verified SAML assertion this service acts on. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAssertion {
    pub id: AssertionId,
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub session_index: Option<String>,
    /// Attribute values keyed by name, and again by friendly name where one is given.
    pub attributes: BTreeMap<String, Vec<String>>,
    pub issue_instant: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Every audience named in any restriction. Empty when unrestricted.
    pub audiences: Vec<String>,
}

impl ParsedAssertion {
    pub fn from_samael(assertion: &samael::schema::Assertion) -> Result<Self, Error> {
        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .ok_or_else(|| Error::AssertionInvalid("assertion has no NameID".to_string()))?;

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|stmts| stmts.iter().find_map(|s| s.session_index.clone()));

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for statement in assertion.attribute_statements.iter().flatten() {
            for attr in &statement.attributes {
                let values: Vec<String> =
                    attr.values.iter().filter_map(|v| v.value.clone()).collect();
                if let Some(name) = &attr.name {
                    attributes
                        .entry(name.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                if let Some(friendly) = &attr.friendly_name {
                    if attr.name.as_ref() != Some(friendly) {
                        attributes.entry(friendly.clone()).or_default().extend(values);
                    }
                }
            }
        }

        let conditions = assertion.conditions.as_ref();
        let audiences = conditions
            .and_then(|c| c.audience_restrictions.as_ref())
            .map(|restrictions| {
                restrictions
                    .iter()
                    .flat_map(|r| r.audience.iter().cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: AssertionId(assertion.id.clone()),
            name_id: name_id.value.clone(),
            name_id_format: name_id.format.clone(),
            session_index,
            attributes,
            issue_instant: assertion.issue_instant,
            not_before: conditions.and_then(|c| c.not_before),
            not_on_or_after: conditions.and_then(|c| c.not_on_or_after),
            audiences,
        })
    }

    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, attribute: &str) -> &[String] {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `[not_before, not_on_or_after)`, open where a bound is absent.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if let Some(not_before) = self.not_before {
            if now < not_before {
                event!(Level::WARN, id = ?self.id, %not_before, "Assertion used before its window");
                return Err(Error::AssertionInvalid(
                    "assertion is not yet valid".to_string(),
                ));
            }
        }
        if let Some(not_on_or_after) = self.not_on_or_after {
            if now >= not_on_or_after {
                event!(Level::DEBUG, id = ?self.id, %not_on_or_after, "Assertion expired");
                return Err(Error::AssertionExpired);
            }
        }
        Ok(())
    }

    /// With any audience restriction present, one audience must name this SP by entity id
    /// or metadata URL.
    pub fn check_audience(&self, entity_id: &str, metadata_url: &str) -> Result<(), Error> {
        if self.audiences.is_empty() {
            return Ok(());
        }
        if self
            .audiences
            .iter()
            .any(|a| a == entity_id || a == metadata_url)
        {
            Ok(())
        } else {
            event!(Level::WARN, audiences = ?self.audiences, "Assertion for another audience");
            Err(Error::AudienceMismatch)
        }
    }
}
