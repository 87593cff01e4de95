mod common;

use common::{drain_text, run, run_main};
use tabflow_core::Channel;
use tabflow_engine::{dsl, Pipeline};

#[test]
fn csv_passthrough_keeps_rows_and_emits_stats() {
    let input = "name,age\nAlice,30\nBob,25\n";
    let mut p = run("csv | csv", input);
    let main = drain_text(&mut p, Channel::Main);
    assert!(main.contains("name,age"));
    assert!(main.contains("Alice,30"));
    assert!(main.contains("Bob,25"));

    let stats = drain_text(&mut p, Channel::Stats);
    assert!(stats.contains("rows_in"));
    assert_eq!(p.rows_in(), 2);
    assert_eq!(p.rows_out(), 2);
}

#[test]
fn filter_on_expression() {
    let input = "name,age,score\nAlice,30,85\nBob,25,92\nCharlie,35,78\n";
    let main = run_main("csv | filter \"col(age) > 27\" | csv", input);
    assert!(main.contains("Alice"));
    assert!(main.contains("Charlie"));
    assert!(!main.contains("Bob"));
}

#[test]
fn head_after_skip() {
    let input = "name\nA\nB\nC\nD\nE\n";
    let main = run_main("csv | skip 2 | head 2 | csv", input);
    assert_eq!(main, "name\nC\nD\n");
}

#[test]
fn sort_descending() {
    let input = "name,age\nAlice,30\nBob,25\nCharlie,35\n";
    let main = run_main("csv | sort -age | csv", input);
    assert_eq!(main, "name,age\nCharlie,35\nAlice,30\nBob,25\n");
}

#[test]
fn pivot_sum() {
    let input = "name,metric,value\nA,x,1\nA,x,10\nA,y,2\nB,x,3\n";
    let main = run_main("csv | pivot metric value sum | csv", input);
    let mut lines = main.lines();
    assert_eq!(lines.next(), Some("name,x,y"));
    assert_eq!(lines.next(), Some("A,11,2"));
    assert_eq!(lines.next(), Some("B,3,"));
}

#[test]
fn timestamp_autodetect_round_trip() {
    let input = "ts\n2024-03-15T10:30:00Z\n2023-12-25T23:59:59Z\n";
    let main = run_main("csv | csv", input);
    assert!(main.contains("2024-03-15T10:30:00Z"));
    assert!(main.contains("2023-12-25T23:59:59Z"));
}

#[test]
fn byte_at_a_time_push_matches_single_push() {
    let input = "name,age\nAlice,30\nBob,25\nCharlie,35\n";
    let whole = run_main("csv | filter \"col(age) > 27\" | csv", input);

    let plan = dsl::parse("csv | filter \"col(age) > 27\" | csv").unwrap();
    let mut p = Pipeline::compile(&plan).unwrap();
    for b in input.as_bytes() {
        p.push(std::slice::from_ref(b)).unwrap();
    }
    p.finish().unwrap();
    let chunked = drain_text(&mut p, Channel::Main);
    assert_eq!(whole, chunked);
}

#[test]
fn head_emits_at_most_n_across_batches() {
    let mut input = String::from("x\n");
    for i in 0..100 {
        input.push_str(&format!("{i}\n"));
    }
    // small decode batches force head to see several batches
    let main = run_main("csv batch_rows=7 | head 10 | csv", &input);
    assert_eq!(main.lines().count(), 11); // header + 10 rows
}

#[test]
fn aggregates_emit_nothing_before_finish() {
    let plan = dsl::parse("csv | sort age | csv").unwrap();
    let mut p = Pipeline::compile(&plan).unwrap();
    p.push(b"age\n3\n1\n2\n").unwrap();
    assert_eq!(p.drain(Channel::Main), b"");
    p.finish().unwrap();
    let main = drain_text(&mut p, Channel::Main);
    assert_eq!(main, "age\n1\n2\n3\n");
}

#[test]
fn malformed_rows_go_to_errors_and_processing_continues() {
    let input = "a,b\n1,2\nbroken\n3,4\n";
    let mut p = run("csv | csv", input);
    let main = drain_text(&mut p, Channel::Main);
    assert!(main.contains("1,2"));
    assert!(main.contains("3,4"));
    assert!(!main.contains("broken"));

    let errors = drain_text(&mut p, Channel::Errors);
    assert!(errors.contains("broken"));
    assert!(p.error().is_none());
}

#[test]
fn samples_channel_previews_first_rows() {
    let input = "name,age\nAlice,30\nBob,25\n";
    let mut p = run("csv | csv", input);
    let samples = drain_text(&mut p, Channel::Samples);
    assert!(samples.contains("Alice"));
}

#[test]
fn pull_returns_zero_when_drained() {
    let mut p = run("csv | csv", "a\n1\n");
    let mut buf = [0u8; 1024];
    let n = p.pull(Channel::Main, &mut buf);
    assert!(n > 0);
    assert_eq!(p.pull(Channel::Main, &mut buf), 0);
    assert!(p.finished());
}

#[test]
fn pull_delivers_in_bounded_chunks() {
    let mut p = run("csv | csv", "a\n1\n2\n3\n");
    let mut collected = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = p.pull(Channel::Main, &mut buf);
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(String::from_utf8(collected).unwrap(), "a\n1\n2\n3\n");
}

#[test]
fn push_after_finish_is_rejected() {
    let mut p = run("csv | csv", "a\n1\n");
    assert!(p.push(b"more\n").is_err());
}

#[test]
fn compile_rejects_bad_expression() {
    let plan = dsl::parse("csv | filter \"col(\" | csv").unwrap();
    assert!(Pipeline::compile(&plan).is_err());
}

#[test]
fn compile_rejects_missing_required_arg() {
    let mut plan = tabflow_core::Plan::new();
    plan.add_node("codec.csv.decode", serde_json::json!({}));
    plan.add_node("head", serde_json::json!({}));
    plan.add_node("codec.csv.encode", serde_json::json!({}));
    assert!(Pipeline::compile(&plan).is_err());
}

#[test]
fn quoted_cells_round_trip() {
    let input = "name,note\nAlice,\"says \"\"hi\"\", loudly\"\n";
    let main = run_main("csv | csv", input);
    assert_eq!(main, input);
}

#[test]
fn csv_to_jsonl_and_back() {
    let input = "name,age\nAlice,30\nBob,25\n";
    let jsonl = run_main("csv | jsonl", input);
    assert!(jsonl.contains("{\"age\":30,\"name\":\"Alice\"}"));

    let back = run_main("jsonl | csv", &jsonl);
    assert!(back.contains("Alice,30") || back.contains("30,Alice"));
}

#[test]
fn text_grep_pipeline() {
    let input = "info start\nerror boom\ninfo done\n";
    let main = run_main("text | grep error | text", input);
    assert_eq!(main, "error boom\n");
}

#[test]
fn grep_invert() {
    let input = "info start\nerror boom\ninfo done\n";
    let main = run_main("text | grep error -v | text", input);
    assert_eq!(main, "info start\ninfo done\n");
}

#[test]
fn derive_and_select() {
    let input = "a,b\n1,2\n3,4\n";
    let main = run_main(
        "csv | derive \"sum=col(a) + col(b)\" | select sum | csv",
        input,
    );
    assert_eq!(main, "sum\n3\n7\n");
}

#[test]
fn table_encoder_renders_on_finish_only() {
    let input = "name,age\nAlice,30\n";
    let main = run_main("csv | table", input);
    assert!(main.contains("| name"));
    assert!(main.contains("| Alice"));
    assert!(main.lines().nth(1).unwrap().contains("---"));
}

#[test]
fn group_agg_pipeline() {
    let input = "region,value\neast,1\nwest,2\neast,3\n";
    let main = run_main("csv | group_agg region sum:value:total | csv", input);
    assert_eq!(main, "region,total\neast,4\nwest,2\n");
}

#[test]
fn counters_track_rows_and_bytes() {
    let input = "a\n1\n2\n3\n";
    let p = run("csv | head 2 | csv", input);
    assert_eq!(p.rows_in(), 3);
    assert_eq!(p.rows_out(), 2);
    assert_eq!(p.bytes_in(), input.len() as u64);
    assert!(p.bytes_out() > 0);
}

#[test]
fn row_multiset_preserved_without_dropping_ops() {
    let input = "a,b\n1,x\n2,y\n3,z\n";
    let plain = run_main("csv | csv", input);
    let trimmed = run_main("csv | trim | csv", input);
    assert_eq!(plain, trimmed);
}
