//! Minimal LDAP search filter evaluation (RFC 4515 string form).
//!
//! Supports `&`, `|`, `!`, equality, presence and substring items with
//! `\XX` escapes. Matching is case-insensitive on both attribute names and
//! values, which is what `caseIgnoreMatch` attributes do on a real server.

use crate::directory::{attr_values, Attributes};
use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser { input, pos: 0 };
        let filter = parser.filter()?;
        if parser.pos != input.len() {
            bail!("trailing characters in filter {input:?}");
        }
        Ok(filter)
    }

    pub fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attrs)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attrs)),
            Filter::Not(inner) => !inner.matches(attrs),
            Filter::Present(attr) => !values_of(attrs, attr).is_empty(),
            Filter::Equal(attr, value) => values_of(attrs, attr)
                .iter()
                .any(|v| v.to_lowercase() == value.to_lowercase()),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => values_of(attrs, attr)
                .iter()
                .any(|v| substring_match(&v.to_lowercase(), initial, any, last)),
        }
    }
}

fn values_of<'a>(attrs: &'a Attributes, attr: &str) -> &'a [String] {
    attr_values(attrs, attr).map(Vec::as_slice).unwrap_or(&[])
}

fn substring_match(
    value: &str,
    initial: &Option<String>,
    any: &[String],
    last: &Option<String>,
) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial.to_lowercase().as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += c.len_utf8();
                Ok(())
            }
            found => bail!("expected {c:?} at {} in {:?}, found {found:?}", self.pos, self.input),
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.item()?,
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut items = Vec::new();
        while self.peek() == Some('(') {
            items.push(self.filter()?);
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Filter> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(')')
            .ok_or_else(|| anyhow!("unterminated item in {:?}", self.input))?;
        let item = &rest[..end];
        self.pos += end;

        let (attr, raw) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("missing '=' in filter item {item:?}"))?;
        if attr.is_empty() || attr.ends_with(['<', '>', '~', ':']) {
            bail!("unsupported filter item {item:?}");
        }
        let attr = attr.to_string();

        if raw == "*" {
            return Ok(Filter::Present(attr));
        }
        if !raw.contains('*') {
            return Ok(Filter::Equal(attr, unescape(raw)?));
        }

        let parts: Vec<&str> = raw.split('*').collect();
        let non_empty = |s: &str| -> Result<Option<String>> {
            if s.is_empty() {
                Ok(None)
            } else {
                unescape(s).map(Some)
            }
        };
        let initial = non_empty(parts[0])?;
        let last = non_empty(parts[parts.len() - 1])?;
        let any = parts[1..parts.len() - 1]
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| unescape(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Filter::Substring {
            attr,
            initial,
            any,
            last,
        })
    }
}

fn unescape(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .ok_or_else(|| anyhow!("truncated escape in {raw:?}"))?;
            out.push(u8::from_str_radix(hex, 16)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(String::from_utf8(out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::attributes;

    fn person() -> Attributes {
        attributes([
            ("objectClass", vec!["top", "inetOrgPerson"]),
            ("uid", vec!["jdoe"]),
            ("cn", vec!["John (J) Doe"]),
        ])
    }

    #[test]
    fn test_and_with_equality() {
        let f = Filter::parse("(&(objectClass=inetOrgPerson)(uid=JDOE))").unwrap();
        assert!(f.matches(&person()));
        let f = Filter::parse("(&(objectClass=inetOrgPerson)(uid=other))").unwrap();
        assert!(!f.matches(&person()));
    }

    #[test]
    fn test_escaped_values() {
        let f = Filter::parse("(cn=John \\28J\\29 Doe)").unwrap();
        assert!(f.matches(&person()));
    }

    #[test]
    fn test_presence_not_and_or() {
        assert!(Filter::parse("(uid=*)").unwrap().matches(&person()));
        assert!(Filter::parse("(!(mail=*))").unwrap().matches(&person()));
        assert!(Filter::parse("(|(mail=x)(uid=jdoe))").unwrap().matches(&person()));
    }

    #[test]
    fn test_substring() {
        assert!(Filter::parse("(cn=john*doe)").unwrap().matches(&person()));
        assert!(Filter::parse("(cn=*\\28j\\29*)").unwrap().matches(&person()));
        assert!(!Filter::parse("(cn=*smith)").unwrap().matches(&person()));
    }

    #[test]
    fn test_rejects_malformed_filters() {
        assert!(Filter::parse("uid=jdoe").is_err());
        assert!(Filter::parse("(uid=jdoe").is_err());
        assert!(Filter::parse("(uid>=3)").is_err());
    }
}
