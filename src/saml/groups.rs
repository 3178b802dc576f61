use super::config::GroupRules;
use crate::error::Error;

/// Applies `rules` to the groups asserted by the IdP.
pub fn authorize_groups(rules: &GroupRules, groups: &[String]) -> Result<(), Error> {
    let has = |g: &String| groups.iter().any(|m| m == g);

    if let Some(denied) = rules.denied.iter().find(|g| has(g)) {
        return Err(Error::GroupAccessDenied(format!("member of denied group {}", denied)));
    }

    if !rules.required_any.is_empty() && !rules.required_any.iter().any(has) {
        return Err(Error::GroupAccessDenied(
            "not a member of any required group".to_string(),
        ));
    }

    if let Some(missing) = rules.required_all.iter().find(|g| !has(g)) {
        return Err(Error::GroupAccessDenied(format!("missing required group {}", missing)));
    }

    Ok(())
}
