//! Smoke tests for the bdd-images CLI

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use image::{DynamicImage, GrayImage, Luma};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn bdd_images() -> Command {
    Command::cargo_bin("bdd-images").expect("bdd-images binary should exist")
}

fn write_png(path: &Path) {
    DynamicImage::ImageLuma8(GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8])))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    bdd_images()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_subcommands() {
    bdd_images()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("gallery"))
        .stdout(predicate::str::contains("hash"))
        .stdout(predicate::str::contains("sniff"))
        .stdout(predicate::str::contains("provision"));
}

#[test]
fn test_no_args_fails() {
    bdd_images().assert().failure();
}

// ============================================================================
// Subcommands
// ============================================================================

#[test]
fn test_gallery_writes_page() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("0001.png"));
    fs::write(dir.path().join("captions.json"), r#"{"0001": "opened<br>"}"#).unwrap();

    bdd_images()
        .arg("gallery")
        .arg(dir.path())
        .args(["--title", "Log in", "--captions"])
        .arg(dir.path().join("captions.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("images.html"));

    let html = fs::read_to_string(dir.path().join("images.html")).unwrap();
    assert!(html.contains("<h1 class=\"gallery-title\">Log in</h1>"));
    assert!(html.contains("data-title=\"opened<br>\""));
}

#[test]
fn test_gallery_empty_folder() {
    let dir = TempDir::new().unwrap();

    bdd_images()
        .arg("gallery")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No .png files"));

    assert!(!dir.path().join("images.html").exists());
}

#[test]
fn test_gallery_missing_folder() {
    bdd_images()
        .args(["gallery", "/no/such/folder"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_hash_identical_images() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("a.png"));
    write_png(&dir.path().join("b.png"));

    let output = bdd_images()
        .arg("hash")
        .arg(dir.path().join("a.png"))
        .arg(dir.path().join("b.png"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let hashes: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    assert_eq!(hashes.len(), 2);
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(hashes[0].len(), 16);
}

#[test]
fn test_hash_rejects_non_image() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    bdd_images()
        .arg("hash")
        .arg(dir.path().join("notes.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("decode"));
}

#[test]
fn test_sniff_formats() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("shot.bin"));
    fs::write(dir.path().join("photo.bin"), [0xFF, 0xD8, 0xFF, 0xE0, 0, 0]).unwrap();

    bdd_images()
        .arg("sniff")
        .arg(dir.path().join("shot.bin"))
        .arg(dir.path().join("photo.bin"))
        .assert()
        .success()
        .stdout(predicate::str::contains("PNG"))
        .stdout(predicate::str::contains("JPEG"));
}

#[test]
fn test_provision_copies_assets() {
    let dir = TempDir::new().unwrap();

    bdd_images()
        .args(["provision", "--log-root"])
        .arg(dir.path())
        .assert()
        .success();

    let assets = dir.path().join("image_attachments_utils");
    assert!(assets.join("lightbox.js").is_file());
    assert!(assets.join(".copy_complete").is_file());

    bdd_images()
        .args(["provision", "--log-root"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("already present"));
}

#[test]
fn test_provision_without_log_root() {
    bdd_images()
        .arg("provision")
        .env_remove("LOGS")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no log root"));
}
