use super::support::{self, FixtureApp, Route, FORM_PAGE};
use std::cell::RefCell;
use webplay::{webplay_replay_test, ReplayConfiguration};

thread_local! {
    // The configuration function runs first, on the test's own thread, and the test body
    // takes the application over so it stays up for the replay.
    static FIXTURE: RefCell<Option<FixtureApp>> = RefCell::new(None);
}

fn configure_replay(configuration: &mut ReplayConfiguration) {
    support::init_logging();

    let app = FixtureApp::start(vec![
        ("/", Route::html(FORM_PAGE)),
        ("/save", Route::new(302, "", b"")),
    ]);
    configuration.set_base_url(app.base_url());
    FIXTURE.with(|fixture| *fixture.borrow_mut() = Some(app));
}

#[webplay_replay_test("scenarios/form.xml", configure_replay)]
fn recorded_form_replays_against_the_fixture() {
    FIXTURE
        .with(|fixture| fixture.borrow_mut().take())
        .expect("the fixture is started by configure_replay")
}
