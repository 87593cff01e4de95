mod common;

use common::drain_text;
use std::io::Write;
use tabflow_core::Channel;
use tabflow_engine::{dsl, Pipeline};
use tempfile::NamedTempFile;

fn run_with_file(dsl_text: &str, input: &str) -> String {
    let plan = dsl::parse(dsl_text).unwrap();
    let mut p = Pipeline::compile(&plan).unwrap();
    p.push(input.as_bytes()).unwrap();
    p.finish().unwrap();
    drain_text(&mut p, Channel::Main)
}

#[test]
fn inner_join_against_side_csv() {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "id,name\n1,Alice\n2,Bob\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    let main = run_with_file(
        &format!("csv | join {path} id | csv"),
        "id,amount\n1,100\n2,200\n3,300\n",
    );
    assert_eq!(main, "id,amount,name\n1,100,Alice\n2,200,Bob\n");
}

#[test]
fn left_join_fills_nulls() {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "id,name\n1,Alice\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    let main = run_with_file(
        &format!("csv | join {path} id --left | csv"),
        "id,amount\n1,100\n3,300\n",
    );
    assert_eq!(main, "id,amount,name\n1,100,Alice\n3,300,\n");
}

#[test]
fn join_with_distinct_key_names() {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "uid,name\n1,Alice\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    let main = run_with_file(
        &format!("csv | join {path} id=uid | csv"),
        "id,amount\n1,100\n",
    );
    assert_eq!(main, "id,amount,name\n1,100,Alice\n");
}

#[test]
fn missing_join_file_fails_finish_but_keeps_output() {
    let plan = dsl::parse("csv | join /no/such/file.csv id | csv").unwrap();
    let mut p = Pipeline::compile(&plan).unwrap();
    p.push(b"id\n1\n").unwrap();
    assert!(p.finish().is_err());
    assert!(p.error().is_some());
}

#[test]
fn stack_appends_rows_with_tag() {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "id,amount\n9,900\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    let main = run_with_file(
        &format!("csv | stack {path} tag=source tag_value=extra | csv"),
        "id,amount\n1,100\n",
    );
    assert_eq!(main, "id,amount,source\n1,100,\n9,900,extra\n");
}

#[test]
fn stack_honours_csv_quoting_in_side_file() {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "id,note\n2,\"two, quoted\"\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    let main = run_with_file(
        &format!("csv | stack {path} | csv"),
        "id,note\n1,plain\n",
    );
    assert!(main.contains("\"two, quoted\""));
}
