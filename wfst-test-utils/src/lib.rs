//! Shared helpers for `wfst` tests: an in-process WFS/backend double and
//! access to the fixture files under `resources/test-fixtures`.

pub mod fixtures;
pub mod mock;

pub use fixtures::{fixtures_root, load_fixture, load_fixture_text};
pub use mock::{MockResponse, MockServer, RecordedRequest};
