mod common;

use std::path::PathBuf;

use chunkwise::log::enable_tracing_by_env;
use testing_macros::fixture;

use crate::common::test_fixture;

#[fixture("./tests/fixtures/*")]
fn js(path: PathBuf) {
    enable_tracing_by_env();
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(test_fixture(&path));
}
