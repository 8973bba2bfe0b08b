//! Payload templates.
//!
//! A template is literal bytes interleaved with `${name}` placeholders that
//! are replaced by the current value of a scenario variable when the message
//! is (re)generated. `$$` stands for a literal `$`.

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, VarError};
use crate::value::VarValue;

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Bytes copied as-is.
    Literal(Vec<u8>),
    /// Substituted with the named variable's rendered value.
    Var(String),
}

/// Message payload template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayloadTemplate {
    segments: Vec<Segment>,
}

impl PayloadTemplate {
    /// A template without placeholders.
    #[must_use]
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Literal(bytes)],
        }
    }

    /// Parse `text`, recognising `${name}` placeholders and `$$` escapes.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidTemplate`] for an unterminated or empty
    /// placeholder, or a stray `$`.
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut rest = text;
        while let Some(pos) = rest.find('$') {
            literal.extend_from_slice(rest[..pos].as_bytes());
            let after = &rest[pos + 1..];
            if let Some(tail) = after.strip_prefix('$') {
                literal.push(b'$');
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let end = body.find('}').ok_or_else(|| {
                    LoadError::InvalidTemplate(format!("unterminated placeholder in {text:?}"))
                })?;
                let name = &body[..end];
                if name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
                {
                    return Err(LoadError::InvalidTemplate(format!(
                        "bad placeholder name {name:?} in {text:?}"
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name.to_string()));
                rest = &body[end + 1..];
            } else {
                return Err(LoadError::InvalidTemplate(format!(
                    "stray `$` in {text:?} (use `$$`)"
                )));
            }
        }
        literal.extend_from_slice(rest.as_bytes());
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Template segments in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the variables this template depends on, in first-use order.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for seg in &self.segments {
            if let Segment::Var(name) = seg {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render the payload, resolving placeholders through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`VarError::UnknownVariable`] if `lookup` cannot resolve a
    /// placeholder.
    pub fn render<'a, F>(&self, lookup: F) -> Result<Vec<u8>, VarError>
    where
        F: Fn(&str) -> Option<&'a VarValue>,
    {
        let mut out = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(bytes) => out.extend_from_slice(bytes),
                Segment::Var(name) => {
                    let value =
                        lookup(name).ok_or_else(|| VarError::UnknownVariable(name.clone()))?;
                    out.extend_from_slice(&value.render());
                }
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for PayloadTemplate {
    type Error = LoadError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<PayloadTemplate> for String {
    fn from(template: PayloadTemplate) -> Self {
        let mut out = String::new();
        for seg in template.segments {
            match seg {
                Segment::Literal(bytes) => {
                    out.push_str(&String::from_utf8_lossy(&bytes).replace('$', "$$"));
                }
                Segment::Var(name) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        }
        out
    }
}
