//! Tests driving the `removebg` binary

#![cfg(feature = "cli")]

mod common;

use anyhow::Result;
use common::{single_object_image, uniform_image, write_image};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    _temp: TempDir,
    images: PathBuf,
    results: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let images = temp.path().join("image");
        let results = temp.path().join("result");
        std::fs::create_dir_all(&images)?;
        Ok(Self {
            _temp: temp,
            images,
            results,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_removebg"))
            .args(args)
            .arg("--image-dir")
            .arg(&self.images)
            .arg("--result-dir")
            .arg(&self.results)
            .env_remove("RUST_LOG")
            .output()?;
        Ok(output)
    }

    fn result(&self, selector: &str, name: &str) -> PathBuf {
        self.results.join(format!("{}_{}_rst.png", selector, name))
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
}

#[test]
fn test_missing_arguments() -> Result<()> {
    let ws = Workspace::new()?;
    let output = ws.run(&["1"])?;
    assert_eq!(stdout(&output), "ERROR:EnvVarialbleRequired");
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[test]
fn test_missing_image() -> Result<()> {
    let ws = Workspace::new()?;
    let output = ws.run(&["2", "ghost"])?;
    assert_eq!(stdout(&output), "ERROR:ImageNotExists");
    assert_eq!(output.status.code(), Some(1));
    assert!(is_empty_dir(&ws.results));
    Ok(())
}

#[test]
fn test_unknown_selector_prints_else() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&single_object_image(), &ws.images, "scene", "jpg");

    let output = ws.run(&["9", "scene"])?;
    assert_eq!(stdout(&output), "else");
    assert!(output.status.success());
    assert!(is_empty_dir(&ws.results));
    Ok(())
}

#[test]
fn test_contour_and_grabcut_write_results() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&single_object_image(), &ws.images, "scene", "jpg");

    for selector in ["1", "2"] {
        let output = ws.run(&[selector, "scene"])?;
        assert!(output.status.success(), "selector {} failed", selector);
        assert_eq!(stdout(&output), "");

        let written = image::open(ws.result(selector, "scene"))?.to_rgba8();
        assert_eq!(written.dimensions(), (100, 100));
        assert!(written.pixels().all(|p| p[3] == 0 || p[3] == 255));
        assert_eq!(written.get_pixel(50, 50)[3], 255);
    }
    Ok(())
}

#[test]
fn test_rerun_is_byte_identical() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&single_object_image(), &ws.images, "scene", "jpg");

    assert!(ws.run(&["3", "scene"])?.status.success());
    let first = std::fs::read(ws.result("3", "scene"))?;
    assert!(ws.run(&["3", "scene"])?.status.success());
    let second = std::fs::read(ws.result("3", "scene"))?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_background_subtraction_writes_grayscale() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&single_object_image(), &ws.images, "scene", "jpg");

    assert!(ws.run(&["4", "scene"])?.status.success());
    let written = image::open(ws.result("4", "scene"))?;
    assert!(matches!(written, image::DynamicImage::ImageLuma8(_)));
    Ok(())
}

#[test]
fn test_blank_image_fails_without_output() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&uniform_image(), &ws.images, "blank", "jpg");

    let output = ws.run(&["1", "blank"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(!ws.result("1", "blank").exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
    Ok(())
}

#[test]
fn test_debug_dir_receives_dumps() -> Result<()> {
    let ws = Workspace::new()?;
    write_image(&single_object_image(), &ws.images, "scene", "jpg");
    let dumps = ws.results.join("debug");

    let output = ws.run(&["1", "scene", "--debug-dir", dumps.to_str().unwrap()])?;
    assert!(output.status.success());
    assert!(!is_empty_dir(&dumps));
    Ok(())
}
