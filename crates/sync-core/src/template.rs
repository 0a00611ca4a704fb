//! `{placeholder}` string templates.
//!
//! Templates drive directory filters, DN construction and relational
//! queries. Placeholders are `{name}`; `{{` and `}}` produce literal braces.
//! Substituted values are escaped according to where the template ends up:
//! directory filter values follow RFC 4515, DN values follow RFC 4514.
//!
//! Relational templates are substituted without escaping. They are trusted
//! configuration and the substituted row values come from the row that
//! fired the trigger, so whoever can write those rows controls part of the
//! query text. Deployments must treat that as a trust boundary.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// How substituted values are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// Raw substitution (relational templates).
    None,
    /// RFC 4515 assertion value escaping.
    Filter,
    /// RFC 4514 attribute value escaping.
    Dn,
}

impl Escape {
    fn apply(self, value: &str) -> String {
        match self {
            Self::None => value.to_string(),
            Self::Filter => escape_filter_value(value),
            Self::Dn => escape_dn_value(value),
        }
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: impl Into<String>) -> SyncResult<Self> {
        let source = source.into();
        let invalid = |reason: &str| SyncError::Template {
            template: source.clone(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("nested '{' in placeholder")),
                            Some(ch) => name.push(ch),
                            None => return Err(invalid("unterminated placeholder")),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("single '}' outside a placeholder")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// The template text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (duplicates included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder with the value returned by `lookup`.
    ///
    /// Fails with [`SyncError::MissingTemplateValue`] when `lookup` has no
    /// value for a placeholder.
    pub fn render<F>(&self, lookup: F, escape: Escape) -> SyncResult<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = lookup(name).ok_or_else(|| SyncError::MissingTemplateValue {
                        template: self.source.clone(),
                        name: name.clone(),
                    })?;
                    out.push_str(&escape.apply(&value));
                }
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for Template {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Template {
    type Error = SyncError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Escape a value for use inside an LDAP filter assertion (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            other => out.push(other),
        }
    }
    out
}

/// Escape a value for use as an RDN attribute value (RFC 4514).
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\00"),
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "uid" => Some("jdoe".to_string()),
            "id" => Some("42".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let t = Template::parse("(&(objectClass=inetOrgPerson)(uid={uid}))").unwrap();
        assert_eq!(
            t.render(lookup, Escape::Filter).unwrap(),
            "(&(objectClass=inetOrgPerson)(uid=jdoe))"
        );
        assert_eq!(t.placeholders().collect::<Vec<_>>(), vec!["uid"]);
    }

    #[test]
    fn test_double_braces_are_literal() {
        let t = Template::parse("SELECT '{{x}}' FROM t WHERE id = {id}").unwrap();
        assert_eq!(
            t.render(lookup, Escape::None).unwrap(),
            "SELECT '{x}' FROM t WHERE id = 42"
        );
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let t = Template::parse("uid={nope},dc=foo").unwrap();
        let err = t.render(lookup, Escape::Dn).unwrap_err();
        assert!(matches!(err, SyncError::MissingTemplateValue { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_malformed_templates_are_rejected() {
        assert!(Template::parse("uid={uid").is_err());
        assert!(Template::parse("uid={}").is_err());
        assert!(Template::parse("uid=}").is_err());
        assert!(Template::parse("uid={a{b}}").is_err());
    }

    #[test]
    fn test_filter_escaping() {
        assert_eq!(escape_filter_value("a*b(c)\\"), "a\\2ab\\28c\\29\\5c");
        assert_eq!(escape_filter_value("foo@bar.com"), "foo@bar.com");
    }

    #[test]
    fn test_dn_escaping() {
        assert_eq!(escape_dn_value("Doe, Jane"), "Doe\\, Jane");
        assert_eq!(escape_dn_value("#1"), "\\#1");
        assert_eq!(escape_dn_value(" x "), "\\ x\\ ");
        assert_eq!(escape_dn_value("a+b=c"), "a\\+b\\=c");
    }

    #[test]
    fn test_template_deserializes_from_string() {
        let t: Template = serde_json::from_str(r#""uid={uid}""#).unwrap();
        assert_eq!(t.as_str(), "uid={uid}");
        assert!(serde_json::from_str::<Template>(r#""uid={uid""#).is_err());
    }
}
