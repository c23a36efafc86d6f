//! Exercises the apply collaborator contract with an in-memory tree.

use remod_adapter::{apply_edits, ApplyCommands, ApplyError, TextEdit};
use remod_types::{ErrorCode, FileCommand, TransformationId};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Rejects stale snapshots instead of overwriting.
#[derive(Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryTree {
    fn with(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, d)| (PathBuf::from(p), d.to_string()))
                .collect(),
        }
    }

    fn read(&self, path: &str) -> Option<&str> {
        self.files.get(&PathBuf::from(path)).map(String::as_str)
    }

    fn current(&self, path: &PathBuf) -> Result<&String, ApplyError> {
        self.files
            .get(path)
            .ok_or_else(|| ApplyError::NotFound { path: path.clone() })
    }
}

impl ApplyCommands for MemoryTree {
    fn apply(&mut self, commands: &[FileCommand]) -> Result<(), ApplyError> {
        for command in commands {
            match command {
                FileCommand::CreateFile { path, new_data, .. } => {
                    if self.files.contains_key(path) {
                        return Err(ApplyError::AlreadyExists { path: path.clone() });
                    }
                    self.files.insert(path.clone(), new_data.clone());
                }
                FileCommand::UpdateFile {
                    path,
                    old_data,
                    new_data,
                    ..
                } => {
                    if self.current(path)? != old_data {
                        return Err(ApplyError::Stale { path: path.clone() });
                    }
                    self.files.insert(path.clone(), new_data.clone());
                }
                FileCommand::DeleteFile { path, .. } => {
                    self.current(path)?;
                    self.files.remove(path);
                }
                FileCommand::MoveFile { old_path, new_path, .. } => {
                    let data = self.current(old_path)?.clone();
                    self.files.remove(old_path);
                    self.files.insert(new_path.clone(), data);
                }
                FileCommand::CopyFile { old_path, new_path, .. } => {
                    let data = self.current(old_path)?.clone();
                    self.files.insert(new_path.clone(), data);
                }
            }
        }
        Ok(())
    }
}

fn id() -> TransformationId {
    TransformationId::named("apply-contract")
}

#[test]
fn applies_every_command_kind() {
    let mut tree = MemoryTree::with(&[("a.ts", "let a;"), ("b.ts", "let b;"), ("c.ts", "let c;")]);
    let new_a = apply_edits("let a;", vec![TextEdit::new(4, 5, "alpha")]).expect("edit");
    let commands = vec![
        FileCommand::update(id(), "a.ts", "let a;", new_a, false).expect("differs"),
        FileCommand::delete(id(), "b.ts", "let b;"),
        FileCommand::moving(id(), "c.ts", "d.ts"),
        FileCommand::copying(id(), "d.ts", "e.ts"),
        FileCommand::create(id(), "f.ts", "export {};", false),
    ];
    tree.apply(&commands).expect("apply");

    assert_eq!(tree.read("a.ts"), Some("let alpha;"));
    assert_eq!(tree.read("b.ts"), None);
    assert_eq!(tree.read("c.ts"), None);
    assert_eq!(tree.read("d.ts"), Some("let c;"));
    assert_eq!(tree.read("e.ts"), Some("let c;"));
    assert_eq!(tree.read("f.ts"), Some("export {};"));
}

#[test]
fn stale_snapshot_is_detectable() {
    let mut tree = MemoryTree::with(&[("a.ts", "changed elsewhere")]);
    let cmd = FileCommand::update(id(), "a.ts", "original", "rewritten", false).expect("differs");
    let err = tree.apply(&[cmd]).expect_err("stale");
    assert_eq!(err.code(), "APPLY_STALE");
    assert!(err.is_recoverable());
}

#[test]
fn create_refuses_existing_path() {
    let mut tree = MemoryTree::with(&[("a.ts", "x")]);
    let err = tree
        .apply(&[FileCommand::create(id(), "a.ts", "y", false)])
        .expect_err("exists");
    assert_eq!(err, ApplyError::AlreadyExists { path: "a.ts".into() });
}
