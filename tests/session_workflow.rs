//! End-to-end tests: a project configured through `.toks.toml`, a real
//! extractor subprocess, background jobs and navigation.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use toks_index::config::CONFIG_FILENAME;
use toks_index::{BuildScope, Location, OpenOutcome, RelationFilter, Session, Trigger};

/// Prints every word of every listed file as an occurrence on stderr, the
/// way `toks -F -` does. `def:name` words are definitions. Creating
/// `.mismatch` in the project makes the next run report a format mismatch.
const FAKE_TOKS: &str = r#"#!/bin/sh
if [ -f .mismatch ]; then
    rm -f .mismatch
    cat >/dev/null
    echo "toks: index format version too old" >&2
    exit 2
fi
while IFS= read -r f; do
    awk -v f="$f" '{
        for (i = 1; i <= NF; i++) {
            w = $i; rel = "REF"
            if (w ~ /^def:/) { sub(/^def:/, "", w); rel = "DEF" }
            printf "%s:%d:%d %s FUNCTION %s 0\n", f, NR, i, w, rel > "/dev/stderr"
        }
    }' "$f"
done
"#;

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("proj");
        let tools = dir.path().join("tools");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&tools).unwrap();

        let toks = tools.join("fake-toks");
        std::fs::write(&toks, FAKE_TOKS).unwrap();
        std::fs::set_permissions(&toks, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(
            root.join(CONFIG_FILENAME),
            format!(
                "extractor_command = \"{}\"\nsearch_command = \"{}\"\nbatch_size = 2\n",
                toks.display(),
                tools.join("no-such-rg").display()
            ),
        )
        .unwrap();

        for (name, content) in files {
            std::fs::write(root.join(name), content).unwrap();
        }
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn open(&self) -> Session {
        Session::open(&[self.root.clone()]).expect("Failed to open session")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_full_build_and_query_through_subprocess() {
    let project = Project::new(&[
        ("util.c", "def:compute value"),
        ("main.c", "compute value\ncompute"),
        ("util.h", "compute"),
    ]);
    let session = project.open();
    assert_eq!(session.open_outcome(), OpenOutcome::Created);

    let report = session
        .spawn_build(Trigger::Explicit, BuildScope::Full)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.files_indexed, 3);
    assert!(report.is_clean());

    let rows = session
        .spawn_query("compute", RelationFilter::Any)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    let locations: Vec<&str> = rows.iter().map(|r| r.location.as_str()).collect();
    assert_eq!(
        locations,
        vec!["main.c:1:1", "main.c:2:1", "util.c:1:1", "util.h:1:1"]
    );
    assert_eq!(rows[2].label, "Function definition");
    assert_eq!(rows[0].label, "Function reference");
}

#[tokio::test]
async fn test_index_persists_across_sessions() {
    let project = Project::new(&[("a.c", "def:alpha")]);
    {
        let session = project.open();
        session
            .spawn_build(Trigger::Explicit, BuildScope::Full)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
    }

    let session = project.open();
    assert_eq!(session.open_outcome(), OpenOutcome::Existing);
    let rows = session
        .spawn_query("alpha", RelationFilter::Definition)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_reindex_after_edit() {
    let project = Project::new(&[("a.c", "def:alpha"), ("b.c", "alpha")]);
    let session = project.open();
    session
        .spawn_build(Trigger::Explicit, BuildScope::Full)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    std::fs::write(project.path("a.c"), "def:omega").unwrap();
    let report = session
        .spawn_build(
            Trigger::Incidental,
            BuildScope::Files(vec![project.path("a.c"), project.path("b.c")]),
        )
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 1);

    let rows = session
        .spawn_query("alpha", RelationFilter::Any)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    let files: Vec<String> = rows.iter().map(|r| file_name(r.target.file().unwrap())).collect();
    assert_eq!(files, vec!["b.c"]);
}

#[tokio::test]
async fn test_format_mismatch_from_extractor_rebuilds_index() {
    let project = Project::new(&[("a.c", "def:alpha"), ("b.c", "beta")]);
    let session = project.open();
    session
        .spawn_build(Trigger::Explicit, BuildScope::Full)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    std::fs::write(project.path(".mismatch"), "").unwrap();
    std::fs::write(project.path("a.c"), "def:gamma").unwrap();
    let report = session
        .spawn_build(Trigger::Explicit, BuildScope::Files(vec![project.path("a.c")]))
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert!(report.rebuilt_after_mismatch);
    assert_eq!(report.files_indexed, 2);
    assert!(session.take_notifications().is_empty());
}

#[tokio::test]
async fn test_missing_search_tool_is_reported_once() {
    let project = Project::new(&[("a.c", "def:alpha")]);
    let session = project.open();
    let err = session.engine().candidate_files("alpha").unwrap_err();
    assert!(err.is_tool_unavailable());

    let mut settings = session.settings().clone();
    settings.search_mode = toks_index::QueryMode::SearchThenIndex;
    drop(session);
    let session = Session::open_configured(&[project.root.clone()], settings).unwrap();
    let result = session
        .spawn_query("alpha", RelationFilter::Any)
        .unwrap()
        .await
        .unwrap();
    assert!(result.is_err());
    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("search_command"));
}

#[tokio::test]
async fn test_lookup_then_navigate_back_and_forward() {
    let project = Project::new(&[("a.c", "def:alpha"), ("b.c", "x\nalpha")]);
    let mut session = project.open();
    session
        .spawn_build(Trigger::Explicit, BuildScope::Full)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let origin = Location::new(project.path("b.c"), 2, 1);
    session.begin_lookup(origin.clone());
    let rows = session
        .spawn_query("alpha", RelationFilter::Definition)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    let destination = session.finish_lookup(rows.first()).unwrap();
    assert_eq!(file_name(destination.file().unwrap()), "a.c");

    assert_eq!(session.go_back(&destination), Some(origin.clone()));
    assert_eq!(session.go_forward(&origin), Some(destination));
}
