// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;
use tempfile::tempdir;
use yare::parameterized;

fn read_record(ts: u64) -> HistoryRecord {
    HistoryRecord::Read { ts, buffer: "$ ".to_string(), lines: 50 }
}

#[test]
fn create_makes_directory_and_file() {
    let dir = tempdir().unwrap();
    let writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    assert!(writer.path().exists());
    assert_eq!(writer.path(), dir.path().join("srv").join("sh.jsonl"));
    assert_eq!(writer.seq(), 0);
}

#[parameterized(
    bad_server = { "Bad Server", "sh" },
    bad_node = { "srv", "my_node" },
    empty_node = { "srv", "" },
)]
fn create_rejects_invalid_names_before_io(server: &str, node: &str) {
    let dir = tempdir().unwrap();
    let err = HistoryWriter::create(dir.path(), server, node).unwrap_err();
    assert!(matches!(err, HistoryError::InvalidName(_)));
    // Nothing was created on disk.
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn append_assigns_dense_monotonic_seq() {
    let dir = tempdir().unwrap();
    let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    assert_eq!(writer.append(read_record(1)), 1);
    assert_eq!(writer.append(HistoryRecord::Interrupt { ts: 2 }), 2);
    assert_eq!(writer.append(read_record(3)), 3);
    assert_eq!(writer.seq(), 3);
}

#[test]
fn reopen_recovers_seq_from_existing_file() {
    let dir = tempdir().unwrap();
    {
        let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
        writer.append(read_record(1));
        writer.append(read_record(2));
    }
    let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    assert_eq!(writer.seq(), 2);
    assert_eq!(writer.append(read_record(3)), 3);
}

#[test]
fn recovery_skips_malformed_lines() {
    let dir = tempdir().unwrap();
    let path = {
        let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
        writer.append(read_record(1));
        writer.append(read_record(2));
        writer.path().to_path_buf()
    };
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "{{not json").unwrap();
    drop(file);

    let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    assert_eq!(writer.seq(), 2);
    assert_eq!(writer.append(read_record(3)), 3);
}

#[test]
fn entries_serialize_one_json_object_per_line() {
    let dir = tempdir().unwrap();
    let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    writer.append(HistoryRecord::Run { ts: 10, input: "ls".to_string() });
    writer.append(read_record(11));

    let content = std::fs::read_to_string(writer.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["seq"], 1);
    assert_eq!(first["op"], "run");
    assert_eq!(first["input"], "ls");
}

#[test]
fn append_after_reopen_extends_the_maximum() {
    // New max seq equals the previous max plus the successful writes.
    let dir = tempdir().unwrap();
    {
        let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
        for ts in 0..5 {
            writer.append(read_record(ts));
        }
    }
    let mut writer = HistoryWriter::create(dir.path(), "srv", "sh").unwrap();
    for ts in 0..3 {
        writer.append(read_record(ts));
    }
    assert_eq!(writer.seq(), 8);
}
