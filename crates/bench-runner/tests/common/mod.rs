#![allow(dead_code)]

use bench_runner::bench_metrics::QualityMeasurement;
use bench_runner::QualityProbe;
use std::fs;
use std::path::Path;
use std::process::Command;

pub struct NoopProbe;

impl QualityProbe for NoopProbe {
    fn measure(&self, task_id: &str) -> QualityMeasurement {
        QualityMeasurement::new(task_id)
    }
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {:?} failed", args);
}

/// A throwaway repository with one committed file.
pub fn init_project(dir: &Path) {
    fs::create_dir_all(dir).expect("mkdir project");
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "bench@example.com"]);
    git(dir, &["config", "user.name", "bench"]);
    fs::write(dir.join("app.txt"), "v1\n").expect("write app.txt");
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}
