//! The whole pipeline, end to end: collect real git history, preprocess,
//! then detect a target that vendors the upstream component. Skips
//! cleanly when git or universal-ctags is missing.

mod common;

use std::fs;

use lineage::config::Config;
use lineage::paths::DataLayout;
use lineage::{collector, detect, preprocess};

#[test]
fn vendored_component_is_detected_with_its_version() {
    if !common::git_available() || !common::universal_ctags_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.paths.repos = dir.path().join("repos");
    config.paths.analyse_root = dir.path().join("analyse_file");
    config.performance.cpu_workers = Some(2);
    config.performance.io_workers = Some(2);
    fs::create_dir_all(&config.paths.repos).unwrap();
    let layout = DataLayout::new(&config);

    // Upstream: v1.0 ships two functions, v2.0 adds a third.
    let upstream = config.paths.repos.join("own%proj");
    fs::create_dir_all(&upstream).unwrap();
    common::git(&upstream, &["init", "-q"]);
    fs::write(upstream.join("a.c"), common::c_source(1)).unwrap();
    fs::write(upstream.join("c.c"), common::c_source(3)).unwrap();
    common::git(&upstream, &["add", "."]);
    common::git(&upstream, &["commit", "-q", "-m", "first"]);
    common::git(&upstream, &["tag", "v1.0"]);
    fs::write(upstream.join("b.c"), common::c_source(2)).unwrap();
    common::git(&upstream, &["add", "."]);
    common::git(&upstream, &["commit", "-q", "-m", "second"]);
    common::git(&upstream, &["tag", "v2.0"]);

    collector::run(&config).unwrap();
    preprocess::run(&config).unwrap();

    // Target vendors the v2.0 tree under third_party/.
    let target = dir.path().join("vendorapp");
    let vendored = target.join("third_party").join("proj");
    fs::create_dir_all(&vendored).unwrap();
    for file in ["a.c", "b.c", "c.c"] {
        fs::copy(upstream.join(file), vendored.join(file)).unwrap();
    }

    let result_path = detect::run(&config, &target).unwrap();
    assert_eq!(result_path, layout.result_file("vendorapp"));

    let report = fs::read_to_string(&result_path).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 1, "exactly one component expected: {report:?}");

    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(fields[0], "vendorapp");
    assert_eq!(fields[1], "own%proj");
    assert_eq!(fields[2], "v2.0");
    // All three functions of the predicted version are used verbatim, in
    // place under the vendored prefix.
    assert_eq!(&fields[3..7], &["3", "0", "0", "False"]);
}

#[test]
fn unrelated_target_produces_an_empty_report() {
    if !common::git_available() || !common::universal_ctags_available() {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.paths.repos = dir.path().join("repos");
    config.paths.analyse_root = dir.path().join("analyse_file");
    config.performance.cpu_workers = Some(2);
    config.performance.io_workers = Some(2);
    fs::create_dir_all(&config.paths.repos).unwrap();

    let upstream = config.paths.repos.join("own%proj");
    fs::create_dir_all(&upstream).unwrap();
    common::git(&upstream, &["init", "-q"]);
    fs::write(upstream.join("a.c"), common::c_source(1)).unwrap();
    common::git(&upstream, &["add", "."]);
    common::git(&upstream, &["commit", "-q", "-m", "first"]);
    common::git(&upstream, &["tag", "v1.0"]);

    collector::run(&config).unwrap();
    preprocess::run(&config).unwrap();

    let target = dir.path().join("standalone");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("other.c"), common::c_source(99)).unwrap();

    let result_path = detect::run(&config, &target).unwrap();
    let report = fs::read_to_string(&result_path).unwrap();
    assert!(report.is_empty(), "unexpected detections: {report:?}");
}
