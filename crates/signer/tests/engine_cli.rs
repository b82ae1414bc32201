use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use binpatch::{Patch, PatchOp};
use remote_signer::signing::{SignatureTrailer, TRAILER_BEGIN};
use remote_signer::{DigestAlgorithm, DigestDescriptor};

const SEED_VAR: &str = "SIGNER_ENGINE_CLI_TEST_SEED";

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("signer.json");
    let text = format!(
        r#"{{"keys":{{
            "release":{{"algorithm":"secp256k1","seed_env":"{SEED_VAR}"}},
            "jar-only":{{"algorithm":"secp256k1","seed_env":"{SEED_VAR}","formats":["jar"]}}
        }}}}"#
    );
    std::fs::write(&path, text).unwrap();
    path
}

fn engine(args: &[&str], config: &Path, stdin: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_signer"))
        .args(args)
        .arg("--config")
        .arg(config)
        .env(SEED_VAR, "engine-cli-seed")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(stdin).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn sign_blob_writes_full_artifact_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = engine(&["sign-blob", "--key", "release", "--file", "-"], &config, b"hello");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let (offset, trailer) = SignatureTrailer::find(&output.stdout).unwrap();
    assert_eq!(&output.stdout[..offset], b"hello");
    assert_eq!(trailer.algorithm, "secp256k1");
}

#[test]
fn sign_blob_with_patch_emits_copy_then_insert() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = engine(
        &["sign-blob", "--key", "release", "--file", "-", "--patch"],
        &config,
        b"hello",
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let patch = Patch::decode(&output.stdout).unwrap();
    assert_eq!(patch.ops()[0], PatchOp::Copy { offset: 0, len: 5 });
    assert!(matches!(&patch.ops()[1], PatchOp::Insert(data) if data.starts_with(TRAILER_BEGIN)));

    let mut signed = Vec::new();
    patch.apply(&mut Cursor::new(b"hello"), &mut signed).unwrap();
    assert_eq!(patch.expected_len(), Some(signed.len() as u64));
}

#[test]
fn sign_cab_checks_forwarded_digest() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let digest = DigestDescriptor::compute(DigestAlgorithm::Sha256, b"MSCF").to_string();

    let ok = engine(
        &["sign-cab", "--key", "release", "--file", "-", "--digest", &digest],
        &config,
        b"MSCF",
    );
    assert!(ok.status.success(), "{}", String::from_utf8_lossy(&ok.stderr));

    let mismatch = engine(
        &["sign-cab", "--key", "release", "--file", "-", "--digest", &digest],
        &config,
        b"MSCF tampered",
    );
    assert_eq!(mismatch.status.code(), Some(1));
    assert!(mismatch.stdout.is_empty());
    let stderr = String::from_utf8(mismatch.stderr).unwrap();
    assert!(stderr.contains("digest mismatch"), "{stderr}");
    assert_eq!(stderr.trim_end().lines().count(), 1);
}

#[test]
fn unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = engine(&["sign-blob", "--key", "nope", "--file", "-"], &config, b"x");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("key not found: nope"));
}

#[test]
fn format_outside_key_capabilities_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = engine(&["sign-pe", "--key", "jar-only", "--file", "-"], &config, b"MZ");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not configured for pe"));
}

#[test]
fn reads_file_and_writes_output_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("app.jar");
    let output_path = dir.path().join("app.signed.jar");
    std::fs::write(&input, b"PK\x03\x04").unwrap();

    let output = engine(
        &[
            "sign-jar",
            "--key",
            "release",
            "--file",
            input.to_str().unwrap(),
            "--output",
            output_path.to_str().unwrap(),
            "--key-alias",
            "RELEASE",
        ],
        &config,
        b"",
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty());
    let signed = std::fs::read(&output_path).unwrap();
    let (_, trailer) = SignatureTrailer::find(&signed).unwrap();
    assert_eq!(trailer.key_alias.as_deref(), Some("RELEASE"));
}

#[test]
fn signs_in_place_without_leaving_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let artifact = dir.path().join("payload.bin");
    std::fs::write(&artifact, b"payload").unwrap();
    let artifact_arg = artifact.to_str().unwrap();

    let output = engine(
        &["sign-blob", "--key", "release", "--file", artifact_arg, "--output", artifact_arg],
        &config,
        b"",
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let signed = std::fs::read(&artifact).unwrap();
    let (offset, trailer) = SignatureTrailer::find(&signed).unwrap();
    assert_eq!(&signed[..offset], b"payload");
    assert_eq!(trailer.algorithm, "secp256k1");

    let mut entries: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["payload.bin", "signer.json"]);
}

#[test]
fn serve_help_says_local_deadline_is_advisory() {
    let output = Command::new(env!("CARGO_BIN_EXE_signer"))
        .args(["serve", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let help = String::from_utf8(output.stdout).unwrap();
    assert!(help.contains("--engine"), "{help}");
    assert!(help.contains("deadline is advisory"), "{help}");
}
