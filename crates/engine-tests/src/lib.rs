#![allow(dead_code)]

use std::{fs, io, path::PathBuf};
use tempfile::TempDir;

pub mod utils;

/// Writes `contents` to `name` inside a fresh temporary directory. The
/// directory lives as long as the returned guard.
pub fn write_input(name: &str, contents: &str) -> io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok((dir, path))
}

/// A node file of `count` people, `id:ID(people)` keyed, with an age and a
/// label column.
pub fn people_csv(count: usize) -> String {
    let mut csv = String::from("id:ID(people),name,age:int,:LABEL\n");
    for i in 0..count {
        csv.push_str(&format!("{i},person-{i},{},Person;Member\n", 20 + i % 50));
    }
    csv
}

/// A relationship file linking person `i` to person `i + 1`.
pub fn knows_csv(count: usize) -> String {
    let mut csv = String::from(":START_ID(people),:END_ID(people),:TYPE,since:int\n");
    for i in 0..count {
        csv.push_str(&format!("{i},{},KNOWS,{}\n", i + 1, 2000 + i % 20));
    }
    csv
}
