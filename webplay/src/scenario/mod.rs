pub mod encoder;

use crate::{
    data::{Assertion, Headers, RecordedRequest, TestRequest},
    error::Error,
};
use quick_xml::{
    events::{attributes::Attributes, BytesStart, Event},
    Reader,
};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Where a recorded scenario can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioSource {
    Path(PathBuf),
    Url(String),
}

impl ScenarioSource {
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        ScenarioSource::Path(path.into())
    }

    pub fn url<S: Into<String>>(url: S) -> Self {
        ScenarioSource::Url(url.into())
    }
}

/// The recorded requests of a scenario file, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scenario {
    pub requests: Vec<RecordedRequest>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse(xml: &str) -> Result<Self, Error> {
        Self::from_reader(xml.as_bytes())
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut reader = Reader::from_reader(reader);
        let mut parser = Parser::default();
        let mut buf = Vec::new();
        let mut depth = 0usize;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    depth += 1;
                    parser.open(&e, false)?;
                }
                Event::Empty(e) => parser.open(&e, true)?,
                Event::Text(e) => {
                    if parser.capture.is_some() {
                        parser.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if parser.capture.is_some() {
                        parser.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    parser.close(e.name().as_ref())?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !parser.seen_root {
            return Err(Error::InvalidScenario("missing <scenario> element".into()));
        }
        if depth != 0 {
            return Err(Error::InvalidScenario("the document ends inside an element".into()));
        }

        Ok(Scenario {
            requests: parser.requests,
        })
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug)]
enum Capture {
    Payload,
    ExpectedText,
    ExpectedAttr(String),
}

#[derive(Debug, Default)]
struct Parser {
    requests: Vec<RecordedRequest>,
    selector: Option<String>,
    capture: Option<Capture>,
    text: String,
    seen_root: bool,
}

impl Parser {
    fn open(&mut self, element: &BytesStart<'_>, empty: bool) -> Result<(), Error> {
        match element.name().as_ref() {
            b"scenario" => self.seen_root = true,
            b"test" => {}
            b"request" => {
                let mut attributes = required_attributes(element.attributes(), &["urlPath", "method"])?;
                let method = attributes.pop().unwrap_or_default();
                let url_path = attributes.pop().unwrap_or_default();
                self.requests.push(RecordedRequest {
                    request: TestRequest {
                        url_path,
                        method,
                        headers: Headers::new(),
                        payload: None,
                    },
                    assertions: Vec::new(),
                });
            }
            b"header" => {
                let mut attributes = required_attributes(element.attributes(), &["name", "value"])?;
                let value = attributes.pop().unwrap_or_default();
                let name = attributes.pop().unwrap_or_default();
                self.current_request("header")?
                    .request
                    .headers
                    .insert(name, value);
            }
            b"payload" => {
                self.current_request("payload")?;
                self.start_capture(Capture::Payload, empty)?;
            }
            b"assertion" => {
                self.current_request("assertion")?;
                let mut attributes = required_attributes(element.attributes(), &["selector"])?;
                self.selector = attributes.pop();
            }
            b"expectedText" => self.start_capture(Capture::ExpectedText, empty)?,
            b"expectedAttr" => {
                let mut attributes = required_attributes(element.attributes(), &["name"])?;
                let name = attributes.pop().unwrap_or_default();
                self.start_capture(Capture::ExpectedAttr(name), empty)?;
            }
            other => debug!(
                element = %String::from_utf8_lossy(other),
                "ignoring unknown scenario element"
            ),
        }

        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<(), Error> {
        match name {
            b"payload" | b"expectedText" | b"expectedAttr" => self.finish_capture(),
            b"assertion" => {
                self.selector = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn start_capture(&mut self, capture: Capture, empty: bool) -> Result<(), Error> {
        if matches!(capture, Capture::ExpectedText | Capture::ExpectedAttr(_))
            && self.selector.is_none()
        {
            return Err(Error::InvalidScenario(
                "expected values have to be inside an <assertion>".into(),
            ));
        }

        self.capture = Some(capture);
        self.text.clear();

        if empty {
            self.finish_capture()?;
        }

        Ok(())
    }

    fn finish_capture(&mut self) -> Result<(), Error> {
        let text = std::mem::take(&mut self.text);
        let selector = self.selector.clone().unwrap_or_default();

        match self.capture.take() {
            Some(Capture::Payload) => {
                self.current_request("payload")?.request.payload = Some(text);
            }
            Some(Capture::ExpectedText) => {
                self.current_request("assertion")?
                    .assertions
                    .push(Assertion::ExpectedText { selector, text });
            }
            Some(Capture::ExpectedAttr(name)) => {
                self.current_request("assertion")?
                    .assertions
                    .push(Assertion::ExpectedAttr {
                        selector,
                        name,
                        value: text,
                    });
            }
            None => {}
        }

        Ok(())
    }

    fn current_request(&mut self, element: &str) -> Result<&mut RecordedRequest, Error> {
        self.requests.last_mut().ok_or_else(|| {
            Error::InvalidScenario(format!("<{}> appears before any <request>", element))
        })
    }
}

/// The values of the `required` attributes, in the order they were asked for.
fn required_attributes(attributes: Attributes<'_>, required: &[&str]) -> Result<Vec<String>, Error> {
    let mut values = vec![None; required.len()];

    for attribute in attributes {
        let attribute = attribute?;
        if let Some(index) = required
            .iter()
            .position(|name| name.as_bytes() == attribute.key.as_ref())
        {
            values[index] = Some(attribute.unescape_value()?.into_owned());
        }
    }

    values
        .into_iter()
        .zip(required)
        .map(|(value, name)| {
            value.ok_or_else(|| Error::InvalidScenario(format!("missing attribute {}", name)))
        })
        .collect()
}
