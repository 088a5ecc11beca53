use std::fmt;

use percent_encoding::percent_decode_str;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Anti-forgery token attached to the finish submission.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Token from a non-empty embedded form field, else from the `csrftoken` cookie.
    #[must_use]
    pub fn resolve(form_field: Option<&str>, cookie_header: Option<&str>) -> Option<Self> {
        form_field
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_string()))
            .or_else(|| {
                cookie_header
                    .and_then(|header| cookie_value(header, CSRF_COOKIE))
                    .map(Self)
            })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

/// Value of `name` in a raw `Cookie` header, percent-decoded.
#[must_use]
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
        })
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_field_wins_over_cookie() {
        let token = CsrfToken::resolve(Some("field-token"), Some("csrftoken=cookie-token")).unwrap();
        assert_eq!(token.as_str(), "field-token");
    }

    #[test]
    fn blank_field_falls_back_to_cookie() {
        let header = "sessionid=abc; csrftoken=from%20cookie; theme=dark";
        let token = CsrfToken::resolve(Some("  "), Some(header)).unwrap();
        assert_eq!(token.as_str(), "from cookie");
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        assert_eq!(cookie_value("xcsrftoken=nope", CSRF_COOKIE), None);
        assert_eq!(cookie_value("csrftoken=", CSRF_COOKIE), None);
    }

    #[test]
    fn no_sources_means_no_token() {
        assert!(CsrfToken::resolve(None, None).is_none());
        assert!(CsrfToken::resolve(None, Some("sessionid=abc")).is_none());
    }

    #[test]
    fn debug_hides_token() {
        let token = CsrfToken::resolve(Some("secret"), None).unwrap();
        assert_eq!(format!("{token:?}"), "CsrfToken(..)");
    }

    #[test]
    fn malformed_escape_is_kept_verbatim() {
        assert_eq!(cookie_value("csrftoken=a%zzb%4", CSRF_COOKIE).unwrap(), "a%zzb%4");
    }

    #[test]
    fn trailing_escape_is_decoded() {
        assert_eq!(cookie_value("csrftoken=abc%2D", CSRF_COOKIE).unwrap(), "abc-");
    }
}
