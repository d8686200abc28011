use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn redpen<I, S>(args: I) -> std::process::Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_redpen"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn cli_chunk_state_round_trip_covers_every_line_once() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");

    write_file(
        &root,
        "\\begin{document}\n% todo: rewrite\n\\input{chapters/intro}\nClosing remarks.\n\\end{document}\n",
    );
    write_file(
        &dir.path().join("chapters/intro.tex"),
        "Accelerators are everywhere.\n\nSo are their compilers.\n",
    );

    let mut bodies = String::new();
    let mut state: Option<String> = None;
    for _ in 0..50 {
        let mut args: Vec<String> = ["chunk", "--json", "--max-tokens", "4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match &state {
            Some(s) => args.extend(["--state".to_string(), s.clone()]),
            None => args.push(root.to_str().unwrap().to_string()),
        }

        let output = redpen(&args);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        bodies.push_str(v["body"].as_str().unwrap());
        if !v["partial"].as_bool().unwrap() {
            state = None;
            break;
        }
        state = Some(serde_json::to_string(&v["state"]).unwrap());
    }
    assert!(state.is_none(), "traversal did not finish");

    let content: Vec<&str> = bodies.lines().filter(|l| l.starts_with('L')).collect();
    assert_eq!(
        content,
        vec![
            "L1\t\\begin{document}",
            "L1\tAccelerators are everywhere.",
            "L3\tSo are their compilers.",
            "L4\tClosing remarks.",
            "L5\t\\end{document}",
        ]
    );
}

#[test]
fn cli_tokens_lists_included_documents() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");

    write_file(&root, "Intro.\n\\input{a}\n\\input{b.tex}\n");
    write_file(&dir.path().join("a.tex"), "Alpha text.\n");
    write_file(&dir.path().join("b.tex"), "% only a comment\n");

    let output = redpen(&["tokens", root.to_str().unwrap(), "--json", "--per-file"]);
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = v.get("files").and_then(|f| f.as_array()).unwrap();
    let names: Vec<&str> = files.iter().map(|f| f["document"].as_str().unwrap()).collect();

    assert_eq!(v["documents"], 3);
    assert_eq!(names, vec!["a.tex", "b.tex", "main.tex"]);
    assert_eq!(files[1]["content_lines"], 0);
    assert_eq!(files[1]["lines"], 1);
}

#[test]
fn cli_tokens_counts_every_inclusion_of_a_shared_document() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");

    write_file(&root, "\\input{one}\n\\input{two}\n");
    write_file(&dir.path().join("one.tex"), "\\input{shared}\n");
    write_file(&dir.path().join("two.tex"), "\\input{shared}\n");
    write_file(&dir.path().join("shared.tex"), "Common notation.\n");

    let output = redpen(&["tokens", root.to_str().unwrap(), "--json", "--per-file"]);
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = v["files"].as_array().unwrap();
    let shared: Vec<_> = files.iter().filter(|f| f["document"] == "shared.tex").collect();

    assert_eq!(v["documents"], 5);
    assert_eq!(shared.len(), 2);
    assert_eq!(shared[0]["units"], shared[1]["units"]);
    let summed: u64 = files.iter().map(|f| f["units"].as_u64().unwrap()).sum();
    assert_eq!(v["units"], summed);
}

#[test]
fn cli_chunk_state_accepts_equivalent_root_path() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");
    write_file(&root, "first line here\nsecond line here\n");
    fs::create_dir_all(dir.path().join("chapters")).unwrap();

    let first = redpen(&["chunk", root.to_str().unwrap(), "--json", "--max-tokens", "0"]);
    assert!(first.status.success());
    let v: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    let state = serde_json::to_string(&v["state"]).unwrap();

    let detour = dir.path().join("chapters").join("..").join("main.tex");
    let second = redpen(&[
        "chunk",
        detour.to_str().unwrap(),
        "--state",
        state.as_str(),
        "--json",
    ]);
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));
    let v: serde_json::Value = serde_json::from_slice(&second.stdout).unwrap();
    assert!(v["body"].as_str().unwrap().contains("L2\tsecond line here"));
}

#[test]
fn cli_chunk_rejects_start_line_with_state() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");
    write_file(&root, "only line\n");

    let output = redpen(&[
        "chunk",
        "--state",
        r#"{"frames":[]}"#,
        "--start-line",
        "3",
        root.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("--start-line"));
}

#[test]
fn cli_json_error_output_is_valid_json_even_with_quotes_in_path() {
    let dir = tempdir().unwrap();

    let bad_path = dir.path().join("does-not-exist-\"quoted\".tex");

    let output = redpen(&["chunk", bad_path.to_str().unwrap(), "--json"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));

    let stderr = String::from_utf8(output.stderr).unwrap();
    let v: serde_json::Value = serde_json::from_str(stderr.trim()).unwrap();
    assert!(v["error"].as_str().unwrap().contains("document not found"));
}

#[test]
fn cli_unknown_mode_fails_before_reading() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.tex");

    let output = redpen(&[
        "review",
        missing.to_str().unwrap(),
        "--mode",
        "gentle",
        "--api-key",
        "unused",
    ]);
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("unrecognized review mode `gentle`"));
}

#[test]
fn cli_include_cycle_is_reported() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("main.tex");

    write_file(&root, "\\input{loop}\n");
    write_file(&dir.path().join("loop.tex"), "\\input{main}\n");

    let output = redpen(&["chunk", root.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(5));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("include cycle"));
}
