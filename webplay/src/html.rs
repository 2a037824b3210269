use crate::data::Assertion;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref INPUT_SELECTOR: Selector = Selector::parse("input").unwrap();
    static ref TEXTAREA_SELECTOR: Selector = Selector::parse("textarea").unwrap();
    static ref IDENTIFIER_REGEX: Regex = Regex::new(r"^-?[A-Za-z_][A-Za-z0-9_-]*$").unwrap();
}

/// The assertions describing the form fields of `document`: one `value` attribute assertion per
/// `<input>`, then one text assertion per `<textarea>`, each in document order.
pub fn form_field_assertions(document: &str) -> Vec<Assertion> {
    let document = Html::parse_document(document);
    let mut assertions = Vec::new();

    for input in document.select(&INPUT_SELECTOR) {
        assertions.push(Assertion::expected_attr(
            "value",
            input.value().attr("value").unwrap_or_default(),
            field_selector("input", input.value().attr("name")),
        ));
    }

    for textarea in document.select(&TEXTAREA_SELECTOR) {
        assertions.push(Assertion::expected_text(
            element_text(textarea),
            field_selector("textarea", textarea.value().attr("name")),
        ));
    }

    assertions
}

/// A selector for the form field `tag` named `name`.
///
/// Names that are plain CSS identifiers stay unquoted, e.g. `input[name=email]`.
pub fn field_selector(tag: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if IDENTIFIER_REGEX.is_match(name) => format!("{}[name={}]", tag, name),
        Some(name) => format!(
            "{}[name=\"{}\"]",
            tag,
            name.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        None => format!("{}:not([name])", tag),
    }
}

/// The text content of `element` with line endings normalized to `\n`.
pub fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// What the first element matched by a selector evaluates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    NotFound,
    InvalidSelector(String),
}

/// Evaluates `assertion`'s selector against `document`.
pub fn lookup(document: &Html, assertion: &Assertion) -> Lookup {
    let selector = match Selector::parse(assertion.selector()) {
        Ok(selector) => selector,
        Err(e) => return Lookup::InvalidSelector(e.to_string()),
    };

    let element = match document.select(&selector).next() {
        Some(element) => element,
        None => return Lookup::NotFound,
    };

    match assertion {
        Assertion::ExpectedText { .. } => Lookup::Found(element_text(element)),
        Assertion::ExpectedAttr { name, .. } => {
            Lookup::Found(element.value().attr(name).unwrap_or_default().to_string())
        }
    }
}
