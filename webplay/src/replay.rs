use crate::{
    data::{Assertion, RecordedRequest, ResponseData},
    error::Error,
    html::{self, Lookup},
    http_client::{HttpClient, HyperHttpClient},
    scenario::{Scenario, ScenarioSource},
};
use scraper::Html;
use std::{fs, sync::Arc};
use tokio::runtime;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://localhost:9000";

/// Receives every assertion that does not hold during a replay.
///
/// `actual` is `None` when the selector did not match any element or could not be parsed.
pub trait AssertionHandler {
    fn assertion_failed(&mut self, message: &str, expected: &str, actual: Option<&str>);
}

impl<F: FnMut(&str, &str, Option<&str>)> AssertionHandler for F {
    fn assertion_failed(&mut self, message: &str, expected: &str, actual: Option<&str>) {
        self(message, expected, actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub message: String,
    pub expected: String,
    pub actual: Option<String>,
}

/// Collects the failures of a replay instead of acting on them.
#[derive(Debug, Default)]
pub struct FailureCollector {
    pub failures: Vec<AssertionFailure>,
}

impl AssertionHandler for FailureCollector {
    fn assertion_failed(&mut self, message: &str, expected: &str, actual: Option<&str>) {
        self.failures.push(AssertionFailure {
            message: message.to_string(),
            expected: expected.to_string(),
            actual: actual.map(str::to_string),
        });
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub requests: usize,
    pub assertions: usize,
    pub failures: usize,
}

impl ReplayReport {
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }

    fn add(&mut self, other: ReplayReport) {
        self.requests += other.requests;
        self.assertions += other.assertions;
        self.failures += other.failures;
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfiguration {
    base_url: String,
    http_client: Option<Arc<dyn HttpClient + Send + Sync>>,
}

impl ReplayConfiguration {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: None,
        }
    }

    pub fn set_base_url<S: Into<String>>(&mut self, base_url: S) {
        self.base_url = base_url.into();
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_client(&self) -> Arc<dyn HttpClient + Send + Sync> {
        self.http_client
            .clone()
            .unwrap_or_else(|| Arc::new(HyperHttpClient::new()))
    }

    pub fn set_http_client(&mut self, http_client: Arc<dyn HttpClient + Send + Sync>) {
        self.http_client = Some(http_client);
    }
}

impl Default for ReplayConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Sends recorded requests to the application again and checks the recorded assertions against
/// the new responses.
#[derive(Debug)]
pub struct Replayer {
    configuration: ReplayConfiguration,
    http_client: Arc<dyn HttpClient + Send + Sync>,
}

impl Replayer {
    pub fn new(configuration: ReplayConfiguration) -> Self {
        let http_client = configuration.http_client();

        Self {
            configuration,
            http_client,
        }
    }

    pub fn configuration(&self) -> &ReplayConfiguration {
        &self.configuration
    }

    pub async fn load(&self, source: &ScenarioSource) -> Result<Scenario, Error> {
        match source {
            ScenarioSource::Path(path) => Scenario::parse(&fs::read_to_string(path)?),
            ScenarioSource::Url(url) => Scenario::parse(&self.http_client.fetch(url).await?),
        }
    }

    pub async fn replay<H: AssertionHandler>(
        &self,
        source: &ScenarioSource,
        handler: &mut H,
    ) -> Result<ReplayReport, Error> {
        let scenario = self.load(source).await?;
        self.replay_scenario(&scenario, handler).await
    }

    /// Replays the requests of `scenario` one after another, in recorded order.
    pub async fn replay_scenario<H: AssertionHandler>(
        &self,
        scenario: &Scenario,
        handler: &mut H,
    ) -> Result<ReplayReport, Error> {
        let mut report = ReplayReport::default();

        for (index, recorded) in scenario.requests.iter().enumerate() {
            report.add(self.replay_request(index, recorded, handler).await?);
        }

        info!(
            requests = report.requests,
            assertions = report.assertions,
            failures = report.failures,
            "Replay finished"
        );

        Ok(report)
    }

    /// Replays a single request. `index` is its position in the scenario and only used in
    /// failure messages.
    pub async fn replay_request<H: AssertionHandler>(
        &self,
        index: usize,
        recorded: &RecordedRequest,
        handler: &mut H,
    ) -> Result<ReplayReport, Error> {
        let response = self
            .http_client
            .make_request(self.configuration.base_url(), &recorded.request)
            .await?;
        debug!(
            index,
            method = %recorded.request.method,
            path = %recorded.request.url_path,
            status = response.status_code,
            "replayed request"
        );

        Ok(check_assertions(index, recorded, &response, handler))
    }

    /// Like [`Replayer::replay`], on a runtime of its own.
    pub fn replay_blocking<H: AssertionHandler>(
        &self,
        source: &ScenarioSource,
        handler: &mut H,
    ) -> Result<ReplayReport, Error> {
        runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(self.replay(source, handler))
    }
}

/// Replays `source` against the application at `base_url`.
pub async fn replay<H: AssertionHandler>(
    source: &ScenarioSource,
    base_url: &str,
    handler: &mut H,
) -> Result<ReplayReport, Error> {
    Replayer::new(ReplayConfiguration::new(base_url))
        .replay(source, handler)
        .await
}

fn check_assertions<H: AssertionHandler>(
    index: usize,
    recorded: &RecordedRequest,
    response: &ResponseData,
    handler: &mut H,
) -> ReplayReport {
    let document = Html::parse_document(&response.body);
    let mut report = ReplayReport {
        requests: 1,
        ..ReplayReport::default()
    };

    for assertion in &recorded.assertions {
        report.assertions += 1;

        let actual = match html::lookup(&document, assertion) {
            Lookup::Found(actual) if actual == assertion.expected() => continue,
            Lookup::Found(actual) => Some(actual),
            Lookup::NotFound => None,
            Lookup::InvalidSelector(e) => {
                debug!(selector = assertion.selector(), "invalid selector: {}", e);
                None
            }
        };

        report.failures += 1;
        handler.assertion_failed(
            &failure_message(index, recorded, assertion, actual.as_deref()),
            assertion.expected(),
            actual.as_deref(),
        );
    }

    report
}

fn failure_message(
    index: usize,
    recorded: &RecordedRequest,
    assertion: &Assertion,
    actual: Option<&str>,
) -> String {
    let request = format!(
        "Assertion failed for request[{}] - {} {}\n",
        index, recorded.request.method, recorded.request.url_path
    );

    let detail = match (assertion, actual) {
        (Assertion::ExpectedText { selector, text }, Some(actual)) => format!(
            "The element {} does evaluate to '{}', but '{}' is expected.",
            selector, actual, text
        ),
        (
            Assertion::ExpectedAttr {
                selector,
                name,
                value,
            },
            Some(actual),
        ) => format!(
            "The attribute {} of the element {} does evaluate to '{}', but '{}' is expected.",
            name, selector, actual, value
        ),
        (assertion, None) => format!(
            "The element {} is not found, but '{}' is expected.",
            assertion.selector(),
            assertion.expected()
        ),
    };

    request + &detail
}
