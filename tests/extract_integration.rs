//! Extractor driven end to end over real files with the real tagger.
//! Skips cleanly when universal-ctags is not installed.

mod common;

use std::fs;

use lineage::config::Config;
use lineage::extract::temp::TempSpace;
use lineage::extract::Extractor;

fn pool() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
}

#[test]
fn extracts_and_fingerprints_a_tree() {
    if !common::universal_ctags_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("proj");
    fs::create_dir_all(tree.join("src")).unwrap();
    fs::write(tree.join("src/a.c"), common::c_source(1)).unwrap();
    fs::write(tree.join("src/b.c"), common::c_source(2)).unwrap();
    fs::write(tree.join("README.md"), "not source\n").unwrap();

    let config = Config::default();
    let extractor = Extractor::new(&config).unwrap();
    let temp_base = dir.path().join("temp");
    fs::create_dir_all(&temp_base).unwrap();
    let temp = TempSpace::create(&temp_base).unwrap();

    let index = extractor.extract_tree(&tree, "proj", &pool(), &temp);
    assert_eq!(index.file_count, 2);
    assert_eq!(index.func_count, 2);
    assert_eq!(index.len(), 2);
    assert!(index.line_count > 0);

    // Relpaths keep the leading slash and the tree-relative form.
    let paths: Vec<&str> = index
        .iter()
        .flat_map(|(_, relpaths)| relpaths.iter().map(String::as_str))
        .collect();
    assert!(paths.contains(&"/src/a.c"));
    assert!(paths.contains(&"/src/b.c"));
}

#[test]
fn identical_bodies_across_files_share_one_fingerprint() {
    if !common::universal_ctags_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("proj");
    fs::create_dir_all(&tree).unwrap();
    fs::write(tree.join("one.c"), common::c_source(7)).unwrap();
    fs::write(tree.join("two.c"), common::c_source(7)).unwrap();

    let config = Config::default();
    let extractor = Extractor::new(&config).unwrap();
    let temp = TempSpace::create(dir.path()).unwrap();

    let index = extractor.extract_tree(&tree, "proj", &pool(), &temp);
    // One fingerprint, two containing files.
    assert_eq!(index.len(), 1);
    assert_eq!(index.occurrences(), 2);
}

#[test]
fn extraction_is_idempotent() {
    if !common::universal_ctags_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("proj");
    fs::create_dir_all(&tree).unwrap();
    fs::write(tree.join("x.c"), common::c_source(9)).unwrap();

    let config = Config::default();
    let extractor = Extractor::new(&config).unwrap();
    let temp = TempSpace::create(dir.path()).unwrap();

    let first = extractor.extract_tree(&tree, "proj", &pool(), &temp);
    let second = extractor.extract_tree(&tree, "proj", &pool(), &temp);

    let a: Vec<_> = first.iter().map(|(fp, p)| (*fp, p.to_vec())).collect();
    let b: Vec<_> = second.iter().map(|(fp, p)| (*fp, p.to_vec())).collect();
    assert_eq!(a, b);
    assert_eq!(first.func_count, second.func_count);
}

#[test]
fn non_utf8_sources_are_transcoded_not_lost() {
    if !common::universal_ctags_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("proj");
    fs::create_dir_all(&tree).unwrap();

    // Latin-1 comment bytes make the file invalid UTF-8.
    let mut bytes = common::c_source(5).into_bytes();
    bytes.splice(0..0, b"/* caf\xE9 r\xE9sum\xE9 */\n".iter().copied());
    fs::write(tree.join("legacy.c"), &bytes).unwrap();

    let config = Config::default();
    let extractor = Extractor::new(&config).unwrap();
    let temp = TempSpace::create(dir.path()).unwrap();

    let index = extractor.extract_tree(&tree, "proj", &pool(), &temp);
    assert_eq!(index.func_count, 1);
    assert!(index
        .iter()
        .any(|(_, relpaths)| relpaths.contains(&"/legacy.c".to_string())));
}
