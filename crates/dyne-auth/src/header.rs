//! `Authorization` / `WWW-Authenticate` header grammar.

use dyne_core::Request;
use http::header::AUTHORIZATION;
use indexmap::IndexMap;

use crate::error::AuthError;

/// Splits `"<scheme> <rest>"` from the request's `Authorization` header.
///
/// Returns `None` when the header is absent, not ASCII, or uses another
/// scheme. Scheme comparison is case-insensitive.
pub(crate) fn credentials<'a>(req: &'a Request, scheme: &str) -> Option<&'a str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (found, rest) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
    found.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

/// Parses comma-separated `name=value` / `name="quoted value"` pairs.
///
/// Names are lowercased. Quoted values may contain commas and
/// backslash-escaped characters.
pub fn parse_params(input: &str) -> Result<IndexMap<String, String>, AuthError> {
    let mut params = IndexMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            if c == ',' {
                return Err(AuthError::MalformedHeader(format!("parameter `{name}` has no value")));
            }
            name.push(c);
            chars.next();
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(AuthError::MalformedHeader(format!("expected `=` after `{name}`")));
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return Err(AuthError::MalformedHeader(format!("unterminated quote in `{name}`")));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value.truncate(value.trim_end().len());
        }

        if name.is_empty() {
            return Err(AuthError::MalformedHeader("empty parameter name".to_string()));
        }
        params.insert(name.to_ascii_lowercase(), value);
    }

    Ok(params)
}

/// Quotes a parameter value.
pub(crate) fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_parse_mixed_params() {
        let params = parse_params(r#"username="john", realm="a, b", nc=00000001, qop=auth"#).unwrap();
        assert_eq!(params["username"], "john");
        assert_eq!(params["realm"], "a, b");
        assert_eq!(params["nc"], "00000001");
        assert_eq!(params["qop"], "auth");
    }

    #[test]
    fn test_parse_escapes_and_case() {
        let params = parse_params(r#"Realm="say \"hi\"""#).unwrap();
        assert_eq!(params["realm"], r#"say "hi""#);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_params(r#"realm="open"#).is_err());
        assert!(parse_params("realm").is_err());
        assert!(parse_params("=x").is_err());
    }

    #[test]
    fn test_quote_round_trips() {
        let quoted = quote(r#"a "b" \c"#);
        let params = parse_params(&format!("v={quoted}")).unwrap();
        assert_eq!(params["v"], r#"a "b" \c"#);
    }

    #[test]
    fn test_credentials_scheme_match() {
        let req = Request::new(Method::GET, "/".parse().unwrap()).with_header("authorization", "bearer abc");
        assert_eq!(credentials(&req, "Bearer"), Some("abc"));
        assert_eq!(credentials(&req, "Basic"), None);
    }
}
