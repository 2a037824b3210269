use std::{iter::FromIterator, slice};

/// Header fields in the order they were first seen.
///
/// Names compare case-insensitively. Inserting a name that is already present keeps its original
/// position and spelling and replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert<S1: Into<String>, S2: Into<String>>(&mut self, name: S1, value: S2) {
        let name = name.into();
        let value = value.into();

        match self
            .0
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (String, String);
    type IntoIter = slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A request observed on its way from the client to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub url_path: String,
    pub method: String,
    pub headers: Headers,
    pub payload: Option<String>,
}

impl TestRequest {
    pub fn new<S1: Into<String>, S2: Into<String>>(url_path: S1, method: S2) -> Self {
        Self {
            url_path: url_path.into(),
            method: method.into(),
            headers: Headers::new(),
            payload: None,
        }
    }

    pub fn with_header<S1: Into<String>, S2: Into<String>>(mut self, name: S1, value: S2) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_payload<S: Into<String>>(mut self, payload: S) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// The payload, if there is a non-empty one.
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref().filter(|payload| !payload.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// The text content of the first element matching `selector` equals `text`.
    ExpectedText { selector: String, text: String },
    /// The attribute `name` of the first element matching `selector` equals `value`.
    ExpectedAttr {
        selector: String,
        name: String,
        value: String,
    },
}

impl Assertion {
    pub fn expected_text<S1: Into<String>, S2: Into<String>>(text: S1, selector: S2) -> Self {
        Assertion::ExpectedText {
            selector: selector.into(),
            text: text.into(),
        }
    }

    pub fn expected_attr<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        name: S1,
        value: S2,
        selector: S3,
    ) -> Self {
        Assertion::ExpectedAttr {
            selector: selector.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Assertion::ExpectedText { selector, .. } | Assertion::ExpectedAttr { selector, .. } => {
                selector
            }
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            Assertion::ExpectedText { text, .. } => text,
            Assertion::ExpectedAttr { value, .. } => value,
        }
    }
}

/// A recorded request together with the assertions made against its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub request: TestRequest,
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status_code: u16,
    pub headers: Headers,
    pub body: String,
}
