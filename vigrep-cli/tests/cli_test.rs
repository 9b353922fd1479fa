use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;
use vigrep::fixtures::{label_heap, vi_with_text, zlib_payload, ContainerBuilder};

fn vigrep() -> Result<Command> {
    let mut cmd = Command::cargo_bin("vigrep")?;
    cmd.arg("--no-progress").env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_match_prints_path_and_summary() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.vi"), vi_with_text(&[], &["FooBar"]))?;
    fs::write(dir.path().join("b.txt"), "FooBar")?;

    vigrep()?
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("a.vi"))
        .stdout(predicate::str::contains("b.txt").not())
        .stdout(predicate::str::contains("failed to parse: 0 out of 1"));
    Ok(())
}

#[test]
fn test_no_match_exits_with_one() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.vi"), vi_with_text(&["Stop"], &[]))?;

    vigrep()?
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed to parse: 0 out of 1"));
    Ok(())
}

#[test]
fn test_corrupt_file_is_counted() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("c.vi"), b"RSRC\r\nbroken")?;
    fs::write(dir.path().join("d.vi"), vi_with_text(&["FooBar"], &[]))?;

    vigrep()?
        .arg("--verbose")
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("d.vi"))
        .stdout(predicate::str::contains("failed to parse: 1 out of 2"))
        .stderr(predicate::str::contains("c.vi"));
    Ok(())
}

#[test]
fn test_missing_root_is_fatal() -> Result<()> {
    vigrep()?
        .arg("FooBar")
        .arg("/definitely/not/here")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("File not found"));
    Ok(())
}

#[test]
fn test_invalid_regex_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    vigrep()?
        .arg("--regex")
        .arg("(")
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid pattern"));
    Ok(())
}

#[test]
fn test_missing_arguments() -> Result<()> {
    vigrep()?.arg("FooBar").assert().code(2);
    Ok(())
}

#[test]
fn test_strict_sanity_flag() -> Result<()> {
    let dir = tempdir()?;
    // Drop the closing node of the label object
    let mut heap = label_heap(&[b"FooBar"]);
    heap.truncate(heap.len() - 2);
    let len = (heap.len() - 4) as u32;
    heap[..4].copy_from_slice(&len.to_be_bytes());
    let bytes = ContainerBuilder::new()
        .block("FPHb", vec![(0, zlib_payload(&heap))])
        .build();
    fs::write(dir.path().join("open.vi"), bytes)?;

    vigrep()?
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("failed to parse: 0 out of 1"));

    vigrep()?
        .arg("--strict-sanity")
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed to parse: 1 out of 1"));
    Ok(())
}

#[test]
fn test_config_file_and_custom_extension() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("types.ctl"), vi_with_text(&["FooBar"], &[]))?;
    fs::write(dir.path().join("main.vi"), vi_with_text(&["FooBar"], &[]))?;
    let config_path = dir.path().join("vigrep.yaml");
    fs::write(&config_path, "extension: \"ctl\"\n")?;

    vigrep()?
        .arg("--config")
        .arg(&config_path)
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("types.ctl"))
        .stdout(predicate::str::contains("main.vi").not());
    Ok(())
}

#[test]
fn test_unknown_encoding_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    vigrep()?
        .arg("--encoding")
        .arg("klingon")
        .arg("FooBar")
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown encoding label"));
    Ok(())
}

#[test]
fn test_empty_pattern_lists_every_parsed_file() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.vi"), vi_with_text(&["Stop"], &[]))?;
    fs::write(dir.path().join("b.vi"), vi_with_text(&[], &[]))?;
    fs::write(dir.path().join("c.vi"), b"not a container")?;

    vigrep()?
        .arg("")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("a.vi"))
        .stdout(predicate::str::contains("b.vi"))
        .stdout(predicate::str::contains("c.vi").not())
        .stdout(predicate::str::contains("failed to parse: 1 out of 3"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_sigint_stops_without_summary() -> Result<()> {
    use assert_cmd::cargo::CommandCargoExt;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command as StdCommand, Stdio};
    use std::thread;
    use std::time::Duration;

    let dir = tempdir()?;
    let fifo = dir.path().join("waiting.vi");
    assert!(StdCommand::new("mkfifo").arg(&fifo).status()?.success());

    // Opening a FIFO with no writer blocks, so the scan is still running
    let child = StdCommand::cargo_bin("vigrep")?
        .arg("--no-progress")
        .arg("FooBar")
        .arg(&fifo)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    thread::sleep(Duration::from_millis(300));
    let sent = StdCommand::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()?;
    assert!(sent.success());

    let output = child.wait_with_output()?;
    assert_eq!(output.status.code(), None);
    assert_eq!(output.status.signal(), Some(2));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("failed to parse"));
    Ok(())
}
