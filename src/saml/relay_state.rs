//! Post-login redirect targets carried in RelayState or `redirect_to`.

use url::{ParseError, Url};

use crate::error::Error;

/// Checks a redirect target against `allowed_hosts`.
///
/// Empty input means "no redirect". Relative paths are accepted as-is. Absolute URLs must
/// be `http`/`https` with a host equal to, or a subdomain of, an allowed host.
pub fn validate_redirect(target: &str, allowed_hosts: &[String]) -> Result<Option<String>, Error> {
    if target.is_empty() {
        return Ok(None);
    }

    // URL parsers and browsers strip these before resolving.
    if target.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(Error::InvalidRedirect(target.to_string()));
    }

    // Browsers treat these as protocol-relative.
    if target.starts_with("//") || target.starts_with("/\\") || target.starts_with('\\') {
        return Err(Error::InvalidRedirect(target.to_string()));
    }

    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => return Ok(Some(target.to_string())),
        Err(_) => return Err(Error::InvalidRedirect(target.to_string())),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidRedirect(target.to_string()));
    }

    let host = match url.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return Err(Error::InvalidRedirect(target.to_string())),
    };

    let allowed = allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    });

    if allowed {
        Ok(Some(target.to_string()))
    } else {
        Err(Error::InvalidRedirect(target.to_string()))
    }
}
