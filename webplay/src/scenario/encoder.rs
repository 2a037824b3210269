use crate::{
    data::{Assertion, TestRequest},
    error::Error,
};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use std::io::Write;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EncoderState {
    Start,
    InTest,
    InRequest,
    InAssertionList,
    Closed,
}

/// Streams a scenario document into `W` one node at a time.
///
/// The document is only ever appended to. Use [`ScenarioEncoder::begin`] and the adders it hands
/// out to build it, and [`ScenarioEncoder::end`] on every exit path to leave it well-formed.
pub struct ScenarioEncoder<W: Write> {
    writer: Writer<W>,
    state: EncoderState,
}

impl<W: Write> ScenarioEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
            state: EncoderState::Start,
        }
    }

    /// Like [`ScenarioEncoder::new`], but indents nested nodes by two spaces.
    pub fn with_indent(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            state: EncoderState::Start,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Opens the document.
    pub fn begin(&mut self) -> Result<RequestAdder<'_, W>, Error> {
        if self.state != EncoderState::Start {
            return Err(Error::InvalidState("the scenario has already been started"));
        }

        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.writer
            .write_event(Event::Start(BytesStart::new("scenario")))?;
        self.writer.write_event(Event::Start(BytesStart::new("test")))?;
        self.state = EncoderState::InTest;

        Ok(RequestAdder { encoder: self })
    }

    /// The adder matching the current state of an open document.
    pub fn cursor(&mut self) -> Result<Cursor<'_, W>, Error> {
        match self.state {
            EncoderState::InTest => Ok(Cursor::Requests(RequestAdder { encoder: self })),
            EncoderState::InRequest | EncoderState::InAssertionList => {
                Ok(Cursor::Assertions(AssertionAdder { encoder: self }))
            }
            EncoderState::Start => Err(Error::InvalidState("the scenario has not been started")),
            EncoderState::Closed => Err(Error::InvalidState("the scenario is already closed")),
        }
    }

    /// Closes the document. Fails if it has already been closed.
    pub fn end(&mut self) -> Result<(), Error> {
        match self.state {
            EncoderState::Closed => {
                return Err(Error::InvalidState("the scenario is already closed"));
            }
            EncoderState::Start => {
                self.writer
                    .write_event(Event::Empty(BytesStart::new("scenario")))?;
            }
            EncoderState::InTest | EncoderState::InRequest | EncoderState::InAssertionList => {
                self.writer.write_event(Event::End(BytesEnd::new("test")))?;
                self.writer
                    .write_event(Event::End(BytesEnd::new("scenario")))?;
            }
        }

        self.state = EncoderState::Closed;
        self.writer.get_mut().flush()?;

        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_request(&mut self, request: &TestRequest) -> Result<(), Error> {
        match self.state {
            EncoderState::InTest | EncoderState::InRequest | EncoderState::InAssertionList => {}
            _ => return Err(Error::InvalidState("requests need an open scenario")),
        }

        let mut headers = request.headers.iter().peekable();
        let payload = request.payload();
        let start = BytesStart::new("request").with_attributes([
            ("urlPath", request.url_path.as_str()),
            ("method", request.method.as_str()),
        ]);

        if headers.peek().is_none() && payload.is_none() {
            self.writer.write_event(Event::Empty(start))?;
        } else {
            self.writer.write_event(Event::Start(start))?;
            for (name, value) in headers {
                self.writer.write_event(Event::Empty(
                    BytesStart::new("header").with_attributes([("name", name), ("value", value)]),
                ))?;
            }
            if let Some(payload) = payload {
                self.write_preserved("payload", &[], payload)?;
            }
            self.writer
                .write_event(Event::End(BytesEnd::new("request")))?;
        }

        self.state = EncoderState::InRequest;
        Ok(())
    }

    fn write_assertion(&mut self, assertion: &Assertion) -> Result<(), Error> {
        match self.state {
            EncoderState::InRequest | EncoderState::InAssertionList => {}
            _ => return Err(Error::InvalidState("assertions need a preceding request")),
        }

        self.writer.write_event(Event::Start(
            BytesStart::new("assertion").with_attributes([("selector", assertion.selector())]),
        ))?;
        match assertion {
            Assertion::ExpectedText { text, .. } => {
                self.write_preserved("expectedText", &[], text)?;
            }
            Assertion::ExpectedAttr { name, value, .. } => {
                self.write_preserved("expectedAttr", &[("name", name.as_str())], value)?;
            }
        }
        self.writer
            .write_event(Event::End(BytesEnd::new("assertion")))?;

        self.state = EncoderState::InAssertionList;
        Ok(())
    }

    fn write_preserved(
        &mut self,
        element: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), Error> {
        let start = BytesStart::new(element)
            .with_attributes([("xml:space", "preserve")])
            .with_attributes(attributes.iter().copied());

        self.writer.write_event(Event::Start(start))?;
        // Always emit the text node so indentation never lands inside preserved content.
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(element)))?;

        Ok(())
    }
}

/// Adds requests to a scenario that has no open request yet.
pub struct RequestAdder<'a, W: Write> {
    encoder: &'a mut ScenarioEncoder<W>,
}

impl<'a, W: Write> RequestAdder<'a, W> {
    pub fn request(self, request: &TestRequest) -> Result<AssertionAdder<'a, W>, Error> {
        self.encoder.write_request(request)?;
        Ok(AssertionAdder {
            encoder: self.encoder,
        })
    }

    pub fn end(self) -> Result<(), Error> {
        self.encoder.end()
    }
}

/// Adds assertions to the most recently added request, or starts the next request.
pub struct AssertionAdder<'a, W: Write> {
    encoder: &'a mut ScenarioEncoder<W>,
}

impl<'a, W: Write> AssertionAdder<'a, W> {
    pub fn expected_text(self, text: &str, selector: &str) -> Result<Self, Error> {
        self.assertion(&Assertion::expected_text(text, selector))
    }

    pub fn expected_attr(self, name: &str, value: &str, selector: &str) -> Result<Self, Error> {
        self.assertion(&Assertion::expected_attr(name, value, selector))
    }

    pub fn assertion(self, assertion: &Assertion) -> Result<Self, Error> {
        self.encoder.write_assertion(assertion)?;
        Ok(self)
    }

    /// Starts the next request, which closes the assertion list of the current one.
    pub fn request(self, request: &TestRequest) -> Result<AssertionAdder<'a, W>, Error> {
        self.encoder.write_request(request)?;
        Ok(self)
    }

    pub fn end(self) -> Result<(), Error> {
        self.encoder.end()
    }
}

/// Either adder, as handed out for an already open scenario.
pub enum Cursor<'a, W: Write> {
    Requests(RequestAdder<'a, W>),
    Assertions(AssertionAdder<'a, W>),
}

impl<'a, W: Write> Cursor<'a, W> {
    pub fn request(self, request: &TestRequest) -> Result<AssertionAdder<'a, W>, Error> {
        match self {
            Cursor::Requests(adder) => adder.request(request),
            Cursor::Assertions(adder) => adder.request(request),
        }
    }
}
