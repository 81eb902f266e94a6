use crate::errors::{ParseError, ParseResult};

/// Raw attribute values of one device, in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStore {
    entries: Vec<(String, String)>,
}

impl AttributeStore {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Parse an attribute as a finite decimal float. Rust's float parsing is
    /// locale-independent, so "0.000598" reads the same everywhere.
    pub fn get_float(&self, name: &str) -> ParseResult<f64> {
        let value = self.get(name).unwrap_or_default();
        match value.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(parsed),
            _ => Err(ParseError::NotANumber {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Attribute names in discovery order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for AttributeStore {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
