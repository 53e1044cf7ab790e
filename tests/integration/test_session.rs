//! End-to-end tests for learner sessions.
//!
//! These tests load the fixture catalog, work through exercises with a
//! file-backed progress store and check what ends up on disk.

use std::path::PathBuf;
use std::sync::Arc;

use kata_engine::{
    verify, Catalog, CompletedSet, FileProgressStore, LevelFilter, ProgressStore, Session, View,
};
use kata_report::{MarkdownGenerator, ProgressReport};
use kata_sandbox::SandboxLimits;

/// Path to the fixture catalog.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/catalog.json")
}

fn load_catalog() -> Catalog {
    Catalog::load(&fixture_path()).expect("Failed to load fixture catalog")
}

fn open(catalog: &Catalog, set: &str, store: &Arc<FileProgressStore>) -> Session {
    let set = catalog.set(set).expect("Set not found").clone();
    let store: Arc<dyn ProgressStore> = store.clone();
    Session::new(set, store, SandboxLimits::default()).expect("Failed to open session")
}

#[test]
fn test_fixture_catalog_loads() {
    let catalog = load_catalog();

    assert_eq!(
        catalog.names().collect::<Vec<_>>(),
        ["HTML Basics", "JavaScript"]
    );
    assert_eq!(
        catalog.set("html basics").unwrap().key,
        "html-basics-progress"
    );
    assert_eq!(catalog.set("JavaScript").unwrap().key, "javascript-v2");
}

/// Every reference answer satisfies its own exercise's rules.
#[test]
fn test_reference_answers_pass() {
    let catalog = load_catalog();

    for set in &catalog.sets {
        for (index, exercise) in set.exercises.iter().enumerate() {
            let outcome = verify(&exercise.rules, &exercise.reference_answer);
            assert!(
                outcome.passed,
                "{} exercise {} failed: {}",
                set.name,
                index + 1,
                outcome.message
            );
        }
    }
}

#[test]
fn test_complete_exercise_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();

    let mut session = open(&catalog, "HTML Basics", &store);
    assert!(session.select(0));
    assert_eq!(session.view(), View::Detail { index: 0 });

    session.edit("<p>Hello</p>");
    let outcome = session.submit().unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.message, "contains-missing: <h1>");

    session.edit("<H1>Hello</H1><h2>Sub</h2>");
    let outcome = session.submit().unwrap();
    assert_eq!(outcome.message, "contains-forbidden: <h2>");
    assert!(session.completed().is_empty());
    assert!(!dir.path().join("html-basics-progress.json").exists());

    session.edit("< h1 >Hello</h1>");
    assert!(session.submit().unwrap().passed);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("html-basics-progress.json")).unwrap(),
        "[0]"
    );

    // Submitting again changes nothing.
    assert!(session.submit().unwrap().passed);
    assert_eq!(session.completed(), &CompletedSet::from([0]));

    let resumed = open(&catalog, "HTML Basics", &store);
    assert_eq!(resumed.completed(), &CompletedSet::from([0]));
    assert_eq!(resumed.view(), View::Listing);
    assert_eq!(resumed.progress().percent, 33);
}

#[test]
fn test_dom_script_exercise_uses_fixture_and_validator() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "HTML Basics", &store);

    session.select(2);
    let preview = session
        .edit("document.querySelector('#msg').textContent = 'Done';")
        .unwrap();
    assert_eq!(preview.html(), "<p id=\"msg\">Done</p>");

    session.edit("document.querySelector('#msg').innerHTML = 'Done';");
    let outcome = session.submit().unwrap();
    assert!(!outcome.passed);
    assert_eq!(outcome.message, "Set textContent");

    session.edit("document.querySelector('#missing').remove()");
    let preview = &session.editor().unwrap().preview;
    assert!(preview.is_fault());
    assert!(preview.html().contains("<pre class=\"kata-error\">TypeError"));
}

#[test]
fn test_script_setup_runs_before_learner_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "JavaScript", &store);

    session.select(0);
    let preview = session.edit("console.log(`Hello ${name}`);").unwrap();
    assert_eq!(preview.console, vec!["Hello Ada"]);

    assert!(session.submit().unwrap().passed);
    assert!(dir.path().join("javascript-v2.json").exists());
}

#[test]
fn test_pattern_validator_and_forbidden_loop() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "JavaScript", &store);

    session.select(1);
    session.edit("for (const n of [1, 2, 3]) { console.log(n * 2); }");
    assert_eq!(session.submit().unwrap().message, "contains-forbidden: for (");

    session.edit("[1, 2, 3].forEach((n) => console.log(n * 2));");
    assert_eq!(session.submit().unwrap().message, "Use map");

    session.edit("console.log([1, 2, 3].map((n) => n * 2));");
    assert!(session.submit().unwrap().passed);
}

#[test]
fn test_filtering_keeps_completion() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "HTML Basics", &store);

    session.select(0);
    session.edit("<h1>Hello</h1>");
    session.submit();
    session.back();

    assert!(session.set_filter(LevelFilter::Level(2)));
    let visible = session.visible_exercises();
    assert_eq!(
        visible.iter().map(|e| e.index).collect::<Vec<_>>(),
        [1, 2]
    );
    assert_eq!(session.completed(), &CompletedSet::from([0]));
    assert_eq!(session.progress().completed, 1);

    session.set_filter(LevelFilter::All);
    assert!(session.visible_exercises()[0].completed);
}

#[test]
fn test_reset_progress_removes_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "HTML Basics", &store);

    session.select(1);
    session.edit("p { color: red; }");
    assert!(session.submit().unwrap().passed);
    session.back();

    assert!(!session.reset_progress(|| false));
    assert!(dir.path().join("html-basics-progress.json").exists());

    assert!(session.reset_progress(|| true));
    assert!(session.completed().is_empty());
    assert!(!dir.path().join("html-basics-progress.json").exists());
}

#[test]
fn test_corrupt_record_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("html-basics-progress.json"), "not json").unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();

    let session = open(&catalog, "HTML Basics", &store);
    assert!(session.completed().is_empty());
}

#[test]
fn test_report_reflects_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileProgressStore::new(dir.path()));
    let catalog = load_catalog();
    let mut session = open(&catalog, "JavaScript", &store);

    session.select(0);
    session.edit("console.log(`Hello ${name}`);");
    session.submit();

    let report = ProgressReport::from_session(&session);
    assert_eq!(report.progress_key, "javascript-v2");
    assert_eq!(report.summary.completed, 1);
    assert_eq!(report.summary.percent, 50);

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("- [x] **Exercise 1** (level 1, script): Greeting"));
    assert!(markdown.contains("- [ ] **Exercise 2** (level 3, script): Doubling"));
}
