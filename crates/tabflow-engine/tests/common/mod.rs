#![allow(dead_code)]

use tabflow_core::Channel;
use tabflow_engine::{dsl, Pipeline};

/// Compile a DSL pipeline, push the whole input, finish.
pub fn run(pipeline_dsl: &str, input: &str) -> Pipeline {
    let plan = dsl::parse(pipeline_dsl).unwrap();
    let mut p = Pipeline::compile(&plan).unwrap();
    p.push(input.as_bytes()).unwrap();
    p.finish().unwrap();
    p
}

/// MAIN channel as text after a full run.
pub fn run_main(pipeline_dsl: &str, input: &str) -> String {
    let mut p = run(pipeline_dsl, input);
    String::from_utf8(p.drain(Channel::Main)).unwrap()
}

/// Drain one channel as text.
pub fn drain_text(p: &mut Pipeline, channel: Channel) -> String {
    String::from_utf8(p.drain(channel)).unwrap()
}
