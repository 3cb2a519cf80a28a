//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn db(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("assess.sqlite3").display())
    }

    fn write(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    fn assess(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("assess").unwrap();
        cmd.env_remove("ASSESS_CONFIG")
            .env("ASSESS_DB_URL", self.db())
            .env("ASSESS_SEED", "7")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let out = self.assess().args(args).assert().success();
        serde_json::from_slice(&out.get_output().stdout).unwrap()
    }

    /// Open-response items, two per tier of grammar, answered by `a{id}`.
    fn seed(&self) {
        let mut body = String::new();
        let mut id = 1;
        for tier in ["easy", "medium", "hard"] {
            for _ in 0..2 {
                body.push_str(&format!(
                    "[[exercise]]\nid = {id}\ntopic = \"grammar\"\ntier = \"{tier}\"\n\
                     kind = \"open_response\"\nprompt = \"Say a{id}\"\nexpected_answer = \"a{id}\"\n\n"
                ));
                id += 1;
            }
        }
        let catalog = self.write("catalog.toml", &body);
        let report = self.json(&["seed", "--catalog", &catalog]);
        assert_eq!(report["imported"], 6);
        assert_eq!(report["catalog_size"], 6);
    }
}

fn session_id(doc: &Value) -> String {
    doc["session"]["session_id"].as_str().unwrap().to_owned()
}

fn exercise_id(question: &Value) -> u64 {
    question["exercise_id"].as_u64().unwrap()
}

#[test]
fn help_lists_commands() {
    Workspace::new()
        .assess()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("seed"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("answer"));
}

#[test]
fn seeds_demo_catalog() {
    let ws = Workspace::new();
    let catalog = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/catalog.toml");
    ws.assess()
        .arg("seed")
        .arg("--catalog")
        .arg(catalog)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"imported\": 30"));
}

#[test]
fn invalid_catalog_is_rejected() {
    let ws = Workspace::new();
    let catalog = ws.write(
        "bad.toml",
        "[[exercise]]\nid = 1\ntopic = \"grammar\"\ntier = \"easy\"\nkind = \"quiz\"\n\
         prompt = \"?\"\nexpected_answer = \"x\"\noptions = [\"a\", \"b\"]\n",
    );
    ws.assess()
        .args(["seed", "--catalog", &catalog])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not one of the options"));
}

#[test]
fn full_session_through_the_cli() {
    let ws = Workspace::new();
    ws.seed();

    let started = ws.json(&["start", "--subject", "ana", "--total", "3", "--topic", "grammar"]);
    let id = session_id(&started);
    assert_eq!(started["session"]["status"], "in_progress");
    assert!(started["question"].get("expected_answer").is_none());
    let mut question = started["question"].clone();

    let resumed = ws.json(&["question", "--subject", "ana", "--session", &id]);
    assert_eq!(resumed["question"], question);

    let mut last = Value::Null;
    for _ in 0..3 {
        let ex = exercise_id(&question).to_string();
        let text = format!("a{ex}");
        last = ws.json(&[
            "answer", "--subject", "ana", "--session", &id, "--text", &text, "--exercise", &ex,
        ]);
        assert_eq!(last["graded"]["is_correct"], true);
        question = last["question"].clone();
    }
    assert_eq!(last["outcome"], "completed");
    assert_eq!(last["result"]["final_score"], 100.0);

    let result = ws.json(&["result", "--subject", "ana", "--session", &id]);
    assert_eq!(result, last["result"]);

    let history = ws.json(&["history", "--subject", "ana"]);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "completed");
}

#[test]
fn foreign_subject_is_refused() {
    let ws = Workspace::new();
    ws.seed();
    let started = ws.json(&["start", "--subject", "ana"]);
    let id = session_id(&started);

    ws.assess()
        .args(["question", "--subject", "bruno", "--session", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("belongs to another subject"));
}

#[test]
fn second_start_conflicts_until_abandoned() {
    let ws = Workspace::new();
    ws.seed();
    let started = ws.json(&["start", "--subject", "ana", "--kind", "practice"]);
    let id = session_id(&started);

    ws.assess()
        .args(["start", "--subject", "ana", "--kind", "practice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already has an in-progress practice session"));

    let abandoned = ws.json(&["abandon", "--subject", "ana", "--session", &id]);
    assert_eq!(abandoned["status"], "abandoned");

    ws.assess()
        .args(["result", "--subject", "ana", "--session", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is abandoned"));

    ws.json(&["start", "--subject", "ana", "--kind", "practice"]);
}

#[test]
fn stale_answer_is_rejected() {
    let ws = Workspace::new();
    ws.seed();
    let started = ws.json(&["start", "--subject", "ana", "--total", "3"]);
    let id = session_id(&started);
    let current = exercise_id(&started["question"]);
    let other = (1..=6).find(|n| *n != current).unwrap().to_string();

    ws.assess()
        .args(["answer", "--subject", "ana", "--session", &id, "--text", "x", "--exercise", &other])
        .assert()
        .failure()
        .stderr(predicate::str::contains("current question is"));

    let resumed = ws.json(&["question", "--subject", "ana", "--session", &id]);
    assert_eq!(resumed["session"]["current_index"], 0);
}

#[test]
fn config_file_sets_default_total() {
    let ws = Workspace::new();
    ws.seed();
    let config = ws.write("engine.toml", "default_total_questions = 4\n");
    let started = ws.json(&["--config", &config, "start", "--subject", "ana"]);
    assert_eq!(started["session"]["total_questions"], 4);

    let bad = ws.write("bad.toml", "default_total_questions = 0\nunknown = 1\n");
    ws.assess()
        .args(["--config", &bad, "start", "--subject", "bruno"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn rejects_malformed_arguments() {
    let ws = Workspace::new();
    ws.assess()
        .args(["question", "--subject", "ana", "--session", "not-a-uuid"])
        .assert()
        .failure();
    ws.assess()
        .args(["start", "--subject", "ana", "--topic", "astronomy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("astronomy"));
}
