use super::support::{self, get, FixtureApp, RecordingFixture, Route, FORM_PAGE};
use std::fs;
use webplay::{
    Assertion, FailureCollector, ReplayConfiguration, ReplayReport, Replayer, ScenarioSource,
};

const RECORDED_FORM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<scenario>
  <test>
    <request urlPath="/form" method="GET">
      <header name="Host" value="localhost:10011"/>
      <header name="Accept" value="text/html"/>
    </request>
    <assertion selector="input[name=f]">
      <expectedAttr xml:space="preserve" name="value">v</expectedAttr></assertion>
    <assertion selector="textarea[name=t]">
      <expectedText xml:space="preserve">hi</expectedText></assertion>
  </test>
</scenario>"#;

fn replay_against(app: &FixtureApp, scenario: &str) -> (ReplayReport, FailureCollector) {
    support::init_logging();

    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("scenario.xml");
    fs::write(&path, scenario).unwrap();

    let mut collector = FailureCollector::default();
    let report = Replayer::new(ReplayConfiguration::new(app.base_url()))
        .replay_blocking(&ScenarioSource::path(&path), &mut collector)
        .unwrap();

    (report, collector)
}

#[test]
fn unchanged_pages_pass() {
    let app = FixtureApp::start(vec![("/form", Route::html(FORM_PAGE))]);

    let (report, collector) = replay_against(&app, RECORDED_FORM);

    assert_eq!(
        report,
        ReplayReport {
            requests: 1,
            assertions: 2,
            failures: 0
        }
    );
    assert!(collector.failures.is_empty());
}

#[test]
fn replays_headers_except_restricted_ones() {
    let app = FixtureApp::start(vec![("/form", Route::html(FORM_PAGE))]);

    replay_against(&app, RECORDED_FORM);

    let received = String::from_utf8(app.received()[0].clone()).unwrap().to_lowercase();
    assert!(received.starts_with("get /form http/1.1\r\n"));
    assert!(received.contains("accept: text/html\r\n"));
    assert!(!received.contains("localhost:10011"));
}

#[test]
fn changed_attributes_are_reported_once() {
    let app = FixtureApp::start(vec![(
        "/form",
        Route::html(&FORM_PAGE.replace("value=\"v\"", "value=\"wrong\"")),
    )]);

    let (report, collector) = replay_against(&app, RECORDED_FORM);

    assert_eq!(report.failures, 1);
    assert_eq!(collector.failures.len(), 1);
    let failure = &collector.failures[0];
    assert_eq!(failure.expected, "v");
    assert_eq!(failure.actual.as_deref(), Some("wrong"));
    assert_eq!(
        failure.message,
        "Assertion failed for request[0] - GET /form\n\
         The attribute value of the element input[name=f] does evaluate to 'wrong', but 'v' is expected."
    );
}

#[test]
fn changed_text_is_reported() {
    let app = FixtureApp::start(vec![(
        "/form",
        Route::html(&FORM_PAGE.replace(">hi<", ">bye<")),
    )]);

    let (_, collector) = replay_against(&app, RECORDED_FORM);

    assert_eq!(collector.failures.len(), 1);
    assert_eq!(collector.failures[0].expected, "hi");
    assert_eq!(collector.failures[0].actual.as_deref(), Some("bye"));
    assert!(collector.failures[0]
        .message
        .ends_with("The element textarea[name=t] does evaluate to 'bye', but 'hi' is expected."));
}

#[test]
fn missing_elements_are_reported_without_an_actual_value() {
    let app = FixtureApp::start(vec![("/form", Route::html("<p>the form is gone</p>"))]);

    let (report, collector) = replay_against(&app, RECORDED_FORM);

    assert_eq!(report.failures, 2);
    assert!(collector
        .failures
        .iter()
        .all(|failure| failure.actual.is_none()));
}

#[test]
fn trailing_slashes_on_the_base_url_are_not_doubled() {
    let app = FixtureApp::start(vec![("/form", Route::html(FORM_PAGE))]);
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("scenario.xml");
    fs::write(&path, RECORDED_FORM).unwrap();
    let mut collector = FailureCollector::default();

    let report = Replayer::new(ReplayConfiguration::new(format!("{}/", app.base_url())))
        .replay_blocking(&ScenarioSource::path(&path), &mut collector)
        .unwrap();

    assert_eq!(report.failures, 0);
    let received = String::from_utf8(app.received()[0].clone()).unwrap();
    assert!(received.starts_with("GET /form HTTP/1.1\r\n"));
}

#[test]
fn recorded_scenarios_replay_cleanly_until_the_page_changes() {
    let app = FixtureApp::start(vec![("/", Route::html(FORM_PAGE))]);
    let fixture = RecordingFixture::start(&app);
    get(fixture.addr(), "/");
    let scenario = fixture.stop();
    assert_eq!(scenario.requests[0].assertions.len(), 2);

    let source = ScenarioSource::path(fixture.scenario_path());
    let replayer = Replayer::new(ReplayConfiguration::new(app.base_url()));

    let mut collector = FailureCollector::default();
    let report = replayer.replay_blocking(&source, &mut collector).unwrap();
    assert!(report.is_success());

    app.set_route("/", Route::html(&FORM_PAGE.replace("value=\"v\"", "value=\"changed\"")));
    let mut failures = Vec::new();
    replayer
        .replay_blocking(&source, &mut |message: &str, expected: &str, actual: Option<&str>| {
            failures.push((
                message.to_string(),
                expected.to_string(),
                actual.map(str::to_string),
            ))
        })
        .unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].1, "v");
    assert_eq!(failures[0].2.as_deref(), Some("changed"));
    assert!(failures[0].0.starts_with("Assertion failed for request[0] - GET /\n"));
    assert_eq!(
        Assertion::expected_attr("value", "v", "input[name=f]"),
        scenario.requests[0].assertions[0]
    );
}

#[test]
fn unreadable_scenarios_fail_the_replay() {
    let app = FixtureApp::start(vec![]);
    let replayer = Replayer::new(ReplayConfiguration::new(app.base_url()));
    let mut collector = FailureCollector::default();

    assert!(replayer
        .replay_blocking(&ScenarioSource::path("/does/not/exist.xml"), &mut collector)
        .is_err());
    assert!(app.received().is_empty());
}
