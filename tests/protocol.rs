// tests/protocol.rs

//! Protocol continuity across runs and the legacy task side-channel.

mod common;

use common::{AVI_TO_MP4, SelfDescribing, policies, put, registry, settings, workspace};
use norma::relocate::{apply_tasks, tasks_from_records};
use norma::{Checkpoint, Pipeline, Protocol, RecordStatus, Settings};
use std::fs;

#[test]
fn test_later_runs_merge_into_protocol() {
    let (_temp, root, work) = workspace();
    put(&root, "a.pdf", "fmt/18\n");
    let tools = registry(None);
    let policies = policies(r#"{"fmt/18": {"bin": "", "accepted": true}}"#, &tools);
    let settings = settings(&work);

    let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &SelfDescribing).unwrap();
    pipeline.run().unwrap();

    put(&root, "b.pdf", "fmt/18\nsecond\n");
    let summary = pipeline.run().unwrap();
    assert_eq!(summary.discovered, 1);

    let protocol = Protocol::load_or_empty(&work).unwrap();
    assert_eq!(protocol.len(), 2);
    assert!(protocol.get("a.pdf").is_some());
    assert!(protocol.get("b.pdf").is_some());
}

#[test]
fn test_changed_content_is_processed_again() {
    let (_temp, root, work) = workspace();
    let file = put(&root, "a.pdf", "fmt/18\n");
    let tools = registry(None);
    let policies = policies(r#"{"fmt/18": {"bin": "", "accepted": true}}"#, &tools);
    let settings = settings(&work);

    let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &SelfDescribing).unwrap();
    pipeline.run().unwrap();
    let first_hash = Protocol::load_or_empty(&work).unwrap().get("a.pdf").unwrap().hash.clone();

    fs::write(&file, "fmt/18\nedited\n").unwrap();
    assert_eq!(pipeline.run().unwrap().discovered, 1);

    let protocol = Protocol::load_or_empty(&work).unwrap();
    assert_eq!(protocol.len(), 1);
    assert_ne!(protocol.get("a.pdf").unwrap().hash, first_hash);
}

#[test]
fn test_skipped_files_are_picked_up_by_a_wider_policy() {
    let (_temp, root, work) = workspace();
    put(&root, "clip.avi", "fmt/5\n");
    let settings = settings(&work);

    let tools = registry(Some("fmt/199"));
    let narrow = policies("{}", &tools);
    let first = Pipeline::new(&root, &settings, &narrow, &tools, &SelfDescribing).unwrap();
    assert_eq!(first.run().unwrap().skipped, 1);
    let protocol = Protocol::load_or_empty(&work).unwrap();
    assert_eq!(protocol.get("clip.avi").unwrap().status, RecordStatus::Skipped);

    let wide = policies(AVI_TO_MP4, &tools);
    let second = Pipeline::new(&root, &settings, &wide, &tools, &SelfDescribing).unwrap();
    assert_eq!(second.run().unwrap().converted, 1);

    let protocol = Protocol::load_or_empty(&work).unwrap();
    assert!(protocol.get("clip.avi").is_none());
    assert!(protocol.get("clip.mp4").is_some());
}

#[test]
fn test_exported_tasks_relocate_by_hand() {
    let (_temp, root, work) = workspace();
    let original = put(&root, "v/clip.avi", "fmt/5\n");
    let tools = registry(Some("fmt/199"));
    let policies = policies(AVI_TO_MP4, &tools);
    let held = Settings {
        relocate: false,
        ..settings(&work)
    };
    Pipeline::new(&root, &held, &policies, &tools, &SelfDescribing)
        .unwrap()
        .run()
        .unwrap();

    let records = Checkpoint::load(&work).unwrap().into_records();
    let tasks = tasks_from_records(&records);
    assert_eq!(tasks.len(), 2);
    assert_eq!(apply_tasks(&tasks).unwrap(), 2);

    assert!(root.join("v/clip.mp4").is_file());
    assert!(!original.exists());
    let scratch = records[0].cleanup.as_ref().unwrap().scratch_dir.clone();
    assert!(!scratch.exists());
}
