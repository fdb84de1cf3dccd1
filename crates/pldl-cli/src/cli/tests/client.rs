//! Tests for the control-socket client subcommands.

use super::parse;
use crate::cli::CliCommand;
use std::path::Path;

#[test]
fn cli_parse_start() {
    match parse(&["pldl", "start", "https://x/playlist?list=A"]) {
        CliCommand::Start { url, watch } => {
            assert_eq!(url, "https://x/playlist?list=A");
            assert!(!watch);
        }
        _ => panic!("expected Start"),
    }
}

#[test]
fn cli_parse_start_watch() {
    match parse(&["pldl", "start", "--watch", "https://x/playlist?list=A"]) {
        CliCommand::Start { watch, .. } => assert!(watch),
        _ => panic!("expected Start with --watch"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["pldl", "cancel", "0b9c1a52-8f7e-4a53-9d0a-3c2e6c1f5b11"]) {
        CliCommand::Cancel { id } => assert_eq!(id, "0b9c1a52-8f7e-4a53-9d0a-3c2e6c1f5b11"),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_list_jobs_watch() {
    assert!(matches!(parse(&["pldl", "list"]), CliCommand::List));
    assert!(matches!(parse(&["pldl", "jobs"]), CliCommand::Jobs));
    assert!(matches!(parse(&["pldl", "watch"]), CliCommand::Watch));
}

#[test]
fn cli_parse_fetch() {
    match parse(&["pldl", "fetch", "Song.m4a", "--dest", "/tmp"]) {
        CliCommand::Fetch { filename, dest } => {
            assert_eq!(filename, "Song.m4a");
            assert_eq!(dest.as_deref(), Some(Path::new("/tmp")));
        }
        _ => panic!("expected Fetch"),
    }
}
