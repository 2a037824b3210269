mod data;
mod error;
mod frame;
mod html;
mod http_client;
mod recording;
mod recording_configuration;
mod replay;
mod scenario;
mod util;

pub use data::{Assertion, Headers, RecordedRequest, ResponseData, TestRequest};
pub use error::Error;
pub use frame::{read_frame, ContentType, Frame};
pub use html::form_field_assertions;
pub use http_client::{HttpClient, HyperHttpClient};
pub use recording::{Recording, RecordingState};
pub use recording_configuration::{RecordingConfiguration, DEFAULT_CONTENT_TYPES};
pub use replay::{
    replay, AssertionFailure, AssertionHandler, FailureCollector, ReplayConfiguration,
    ReplayReport, Replayer, DEFAULT_BASE_URL,
};
pub use scenario::{
    encoder::{AssertionAdder, Cursor, EncoderState, RequestAdder, ScenarioEncoder},
    Scenario, ScenarioSource,
};
pub use webplay_codegen::webplay_replay_test;
