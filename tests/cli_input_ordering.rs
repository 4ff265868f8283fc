//! CLI integration tests for batch input discovery and metering
//!
//! Checks that inputs are processed in alphanumerical order and, on Unix,
//! drives the real binary against a stand-in engine script.

#![cfg(feature = "cli")]

use bgremove_credits::cli::collect_inputs;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn write_inputs(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), PNG_HEADER).expect("Failed to write test input");
    }
}

#[test]
fn test_cli_batch_alphanumerical_order() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    write_inputs(
        temp_dir.path(),
        &["z_last.jpg", "a_first.png", "m_middle.webp", "img10.jpg", "img2.jpg", "img1.jpg"],
    );

    let files = collect_inputs(&[temp_dir.path().to_string_lossy().to_string()], false)
        .expect("Failed to collect inputs");
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();

    assert_eq!(
        names,
        vec!["a_first.png", "img1.jpg", "img10.jpg", "img2.jpg", "m_middle.webp", "z_last.jpg"]
    );
}

#[test]
fn test_mixed_file_and_directory_inputs_are_merged() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let batch = temp_dir.path().join("batch");
    fs::create_dir(&batch).unwrap();
    write_inputs(&batch, &["b.png", "a.png"]);
    write_inputs(temp_dir.path(), &["0_single.png"]);

    let inputs = vec![
        batch.to_string_lossy().to_string(),
        temp_dir.path().join("0_single.png").to_string_lossy().to_string(),
        batch.join("a.png").to_string_lossy().to_string(),
    ];
    let files = collect_inputs(&inputs, false).unwrap();

    assert_eq!(files.len(), 3, "duplicates must be dropped: {:?}", files);
    assert!(files.windows(2).all(|w| w[0] <= w[1]));
}

#[cfg(unix)]
mod binary {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;

    /// Engine stand-in: copies the staged input to the `-o` path
    fn fake_engine(dir: &Path) -> std::path::PathBuf {
        let script = dir.join("fake-engine.sh");
        fs::write(&script, "#!/bin/sh\ncp \"$1\" \"$3\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn bin() -> Command {
        Command::new(env!("CARGO_BIN_EXE_bgremove-credits"))
    }

    #[test]
    fn test_batch_spends_one_credit_per_image() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = temp_dir.path().join("in");
        let outputs = temp_dir.path().join("out");
        let storage = temp_dir.path().join("credits");
        fs::create_dir(&inputs).unwrap();
        let png = bgremove_credits::backends::test_utils::MockEngine::sample_png();
        fs::write(inputs.join("a.png"), &png).unwrap();
        fs::write(inputs.join("b.png"), &png).unwrap();

        let engine = fake_engine(temp_dir.path());
        let status = bin()
            .arg(&inputs)
            .arg("-o")
            .arg(&outputs)
            .arg("--plan")
            .arg("pro")
            .arg("--storage-dir")
            .arg(&storage)
            .arg("--engine-bin")
            .arg(&engine)
            .env_remove("BGREMOVE_CREDITS_URL")
            .status()
            .expect("Failed to run CLI");
        assert!(status.success());
        assert!(outputs.join("a_bg_removed.png").exists());
        assert!(outputs.join("b_bg_removed.png").exists());

        let output = bin()
            .args(["--show-credits", "--json", "--storage-dir"])
            .arg(&storage)
            .env_remove("BGREMOVE_CREDITS_URL")
            .output()
            .expect("Failed to run CLI");
        let account: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(account["available"], 48);
        assert_eq!(account["used"], 2);
        assert_eq!(account["planType"], "pro");
    }

    #[test]
    fn test_free_plan_refuses_large_batches() {
        let temp_dir = TempDir::new().unwrap();
        write_inputs(temp_dir.path(), &["a.png", "b.png"]);
        let storage = temp_dir.path().join("credits");

        let output = bin()
            .arg(temp_dir.path())
            .arg("--storage-dir")
            .arg(&storage)
            .env_remove("BGREMOVE_CREDITS_URL")
            .output()
            .expect("Failed to run CLI");

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("at most 1 image"));
        assert!(!storage.join("userCredits.json").exists());
    }
}
