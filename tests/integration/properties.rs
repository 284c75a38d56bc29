// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{laptop, laptop_name, InventoryFixture};

use stowage::{
    inventory::{CommitOutcome, FieldUpdate, InventoryError, RemoveMode},
    naming::NamingError,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::{
    fs::remove_file,
    path::{Path, PathBuf},
};

// Shelf with two laptops, and a bin below it with a third one.
fn stocked() -> Result<InventoryFixture> {
    let fixture = InventoryFixture::new()?;
    let mut inventory = fixture.inventory()?;
    inventory.add_asset(fixture.path("shelf"), laptop("S1"))?;
    inventory.add_asset(fixture.path("shelf"), laptop("S2"))?;
    inventory.add_asset(fixture.path("shelf/bin"), laptop("S3"))?;
    let outcome = inventory.commit(None)?;
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));

    Ok(fixture)
}

// Rack holding an asset directory with one child asset.
fn racked() -> Result<(InventoryFixture, PathBuf, PathBuf)> {
    let fixture = InventoryFixture::new()?;
    let mut inventory = fixture.inventory()?;
    let mut record = laptop("AD");
    record.set("is_asset_directory", true);
    let parent = inventory.add_asset(fixture.path("rack"), record)?;
    let child = inventory.add_asset(fixture.path(&parent), laptop("C1"))?;
    inventory.commit(None)?;

    Ok((fixture, parent, child))
}

fn shelved(serial: &str) -> PathBuf {
    Path::new("shelf").join(laptop_name(serial))
}

#[test]
fn add_asset_creates_anchors_in_one_commit() -> Result<()> {
    let fixture = stocked()?;

    assert_eq!(fixture.commit_count()?, 2);
    assert!(fixture.exists(shelved("S1")));
    assert!(fixture.exists(shelved("S2")));
    assert!(fixture.exists(Path::new("shelf/bin").join(laptop_name("S3"))));
    assert_eq!(fixture.read("shelf/.anchor")?, "");
    assert_eq!(fixture.read("shelf/bin/.anchor")?, "");

    let tracked = fixture.tracked()?;
    assert!(tracked.contains(&PathBuf::from("shelf/.anchor")));
    assert!(tracked.contains(&PathBuf::from("shelf/bin/.anchor")));
    assert!(tracked.contains(&shelved("S1")));
    Ok(())
}

#[test]
fn remove_same_path_twice_equals_removing_once() -> Result<()> {
    let twice = stocked()?;
    let mut inventory = twice.inventory()?;
    let target = twice.path(shelved("S1"));
    let removed = inventory.remove([&target, &target], RemoveMode::All)?;
    assert_eq!(removed, vec![shelved("S1")]);
    inventory.commit(None)?;

    let once = stocked()?;
    let mut inventory = once.inventory()?;
    inventory.remove([once.path(shelved("S1"))], RemoveMode::All)?;
    inventory.commit(None)?;

    assert_eq!(twice.tracked()?, once.tracked()?);
    assert_eq!(twice.commit_count()?, 3);
    assert_eq!(once.commit_count()?, 3);
    assert!(!twice.exists(shelved("S1")));
    Ok(())
}

#[test]
fn remove_directory_cascades_in_one_commit() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    inventory.remove([fixture.path("shelf")], RemoveMode::All)?;
    inventory.commit(None)?;

    assert!(!fixture.exists("shelf"));
    assert_eq!(fixture.commit_count()?, 3);
    let leftovers = fixture
        .tracked()?
        .into_iter()
        .filter(|path| path.starts_with("shelf"))
        .collect::<Vec<_>>();
    assert_eq!(leftovers, Vec::<PathBuf>::new());
    Ok(())
}

#[test]
fn nested_targets_collapse_into_one_removal() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    let removed = inventory.remove(
        [fixture.path("shelf/bin"), fixture.path("shelf")],
        RemoveMode::All,
    )?;
    assert_eq!(removed, vec![PathBuf::from("shelf")]);
    inventory.commit(None)?;

    assert!(!fixture.exists("shelf"));
    Ok(())
}

#[test]
fn invalid_path_aborts_whole_removal() -> Result<()> {
    let fixture = stocked()?;
    let head = fixture.head()?;
    let mut inventory = fixture.inventory()?;

    let result = inventory.remove(
        [fixture.path(shelved("S1")), fixture.path("nowhere")],
        RemoveMode::All,
    );
    match result {
        Err(InventoryError::InvalidOperation(problems)) => {
            let paths = problems
                .into_iter()
                .map(|problem| problem.path)
                .collect::<Vec<_>>();
            assert_eq!(paths, vec![PathBuf::from("nowhere")]);
        }
        other => panic!("expected invalid operation, got {other:?}"),
    }

    assert!(!inventory.has_pending());
    assert_eq!(inventory.commit(None)?, CommitOutcome::NothingToCommit);
    assert_eq!(fixture.head()?, head);
    assert!(fixture.exists(shelved("S1")));
    Ok(())
}

#[test]
fn root_and_protected_paths_cannot_be_removed() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;

    let root = inventory.remove([fixture.root()], RemoveMode::All);
    assert!(matches!(root, Err(InventoryError::InvalidOperation(_))));

    let control = inventory.remove([fixture.path(".stowage")], RemoveMode::All);
    assert!(matches!(control, Err(InventoryError::InvalidOperation(_))));

    let anchor = inventory.remove([fixture.path("shelf/.anchor")], RemoveMode::All);
    assert!(matches!(anchor, Err(InventoryError::InvalidOperation(_))));

    assert!(fixture.exists(".stowage/config.toml"));
    Ok(())
}

#[test]
fn rename_onto_sibling_name_collides() -> Result<()> {
    let fixture = stocked()?;
    let head = fixture.head()?;
    let mut inventory = fixture.inventory()?;

    let result = inventory.modify(
        [fixture.path(shelved("S1"))],
        &[FieldUpdate::Set {
            key: "serial".into(),
            value: "S2".into(),
        }],
        true,
    );
    assert!(matches!(
        result,
        Err(InventoryError::Naming(NamingError::Collision { .. }))
    ));

    assert!(fixture.read(shelved("S1"))?.contains("serial: S1"));
    assert!(fixture.read(shelved("S2"))?.contains("serial: S2"));
    assert_eq!(fixture.head()?, head);
    Ok(())
}

#[test]
fn remove_asset_aspect_keeps_directory() -> Result<()> {
    let (fixture, parent, child) = racked()?;
    let mut inventory = fixture.inventory()?;
    inventory.remove([fixture.path(&parent)], RemoveMode::Asset)?;
    inventory.commit(None)?;

    let repo = fixture.repo()?;
    assert!(!repo.is_asset_path(fixture.path(&parent))?);
    assert!(repo.is_inventory_dir(fixture.path(&parent))?);
    assert!(fixture.exists(&child));
    assert!(!fixture.exists(parent.join(".stowage-asset")));
    Ok(())
}

#[test]
fn remove_directory_aspect_keeps_record() -> Result<()> {
    let (fixture, parent, child) = racked()?;
    let mut inventory = fixture.inventory()?;
    inventory.remove([fixture.path(&parent)], RemoveMode::Dir)?;
    inventory.commit(None)?;

    let repo = fixture.repo()?;
    assert!(!repo.is_inventory_dir(fixture.path(&parent))?);
    assert!(repo.is_asset_path(fixture.path(&parent))?);
    let record = repo.read_record(&parent, false)?;
    assert_eq!(record.get_string("serial"), Some("AD".into()));
    assert!(!fixture.exists(&child));
    Ok(())
}

#[test]
fn remove_everything_of_asset_directory() -> Result<()> {
    let (fixture, parent, child) = racked()?;
    let mut inventory = fixture.inventory()?;
    inventory.remove([fixture.path(&parent)], RemoveMode::All)?;
    inventory.commit(None)?;

    assert!(!fixture.exists(&parent));
    assert!(!fixture.exists(&child));
    assert!(fixture.exists("rack/.anchor"));
    Ok(())
}

#[test]
fn setting_current_value_changes_nothing() -> Result<()> {
    let fixture = stocked()?;
    let count = fixture.commit_count()?;
    let mut inventory = fixture.inventory()?;

    let modified = inventory.modify(
        [fixture.path(shelved("S1"))],
        &[FieldUpdate::Set {
            key: "make".into(),
            value: "apple".into(),
        }],
        true,
    )?;
    assert_eq!(modified, Vec::<PathBuf>::new());
    assert!(!inventory.has_pending());
    assert_eq!(inventory.commit(None)?, CommitOutcome::NothingToCommit);
    assert_eq!(fixture.commit_count()?, count);
    Ok(())
}

#[test]
fn commit_message_carries_operations_record() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    inventory.remove([fixture.path("shelf/bin")], RemoveMode::All)?;
    inventory.commit(Some("clear out bin"))?;

    let message = fixture.repo()?.commit_message(None)?;
    let expect = format!(
        "clear out bin\n\n--- Inventory Operations ---\nRemoved assets:\n- shelf/bin/{}\nRemoved directories:\n- shelf/bin",
        laptop_name("S3")
    );
    assert_eq!(message.trim_end(), expect);
    Ok(())
}

#[test]
fn nested_move_sources_are_rejected_before_commit() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    inventory.add_directory(fixture.path("attic"))?;
    inventory.commit(None)?;
    let head = fixture.head()?;

    let nested = Path::new("shelf/bin").join(laptop_name("S3"));
    let result = inventory.move_to(
        [fixture.path("shelf/bin"), fixture.path(&nested)],
        fixture.path("attic"),
    );
    let Err(InventoryError::InvalidOperation(problems)) = result else {
        panic!("expected invalid operation, got {result:?}");
    };
    let paths = problems
        .into_iter()
        .map(|problem| problem.path)
        .collect::<Vec<_>>();
    assert_eq!(paths, vec![nested.clone()]);

    assert!(!inventory.has_pending());
    assert_eq!(inventory.commit(None)?, CommitOutcome::NothingToCommit);
    assert_eq!(fixture.head()?, head);
    assert!(fixture.exists(&nested));
    assert!(!fixture.exists("attic/bin"));
    assert!(fixture.repo()?.is_clean_worktree()?);
    Ok(())
}

#[test]
fn remove_mode_must_fit_target() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;

    let directory = inventory.remove([fixture.path("shelf/bin")], RemoveMode::Asset);
    assert!(matches!(directory, Err(InventoryError::Usage(_))));

    let asset = inventory.remove([fixture.path(shelved("S1"))], RemoveMode::Dir);
    assert!(matches!(asset, Err(InventoryError::Usage(_))));

    assert!(!inventory.has_pending());
    assert!(fixture.exists(shelved("S1")));
    assert!(fixture.exists("shelf/bin/.anchor"));
    Ok(())
}

#[test]
fn unparseable_record_aborts_commit() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    inventory.add_directory(fixture.path("attic"))?;
    inventory.commit(None)?;
    let head = fixture.head()?;

    let broken = Path::new("shelf/bin").join(laptop_name("S3"));
    fixture.write(&broken, "key: [unclosed")?;
    inventory.move_to([fixture.path("shelf/bin")], fixture.path("attic"))?;

    let result = inventory.commit(None);
    assert!(matches!(result, Err(InventoryError::Record(_))));
    assert!(!inventory.has_pending());
    assert!(fixture.exists(&broken));
    assert!(!fixture.exists("attic/bin"));
    assert_eq!(fixture.head()?, head);
    Ok(())
}

#[test]
fn failed_execution_leaves_tree_uncommitted() -> Result<()> {
    let fixture = stocked()?;
    let head = fixture.head()?;
    let mut inventory = fixture.inventory()?;
    let added = inventory.add_asset(fixture.path("shelf"), laptop("S9"))?;
    inventory.remove([fixture.path(shelved("S1"))], RemoveMode::All)?;
    remove_file(fixture.path(shelved("S1")))?;

    match inventory.commit(None) {
        Err(InventoryError::Execution {
            completed, total, ..
        }) => {
            assert_eq!((completed, total), (1, 2));
        }
        other => panic!("expected execution failure, got {other:?}"),
    }

    assert!(!inventory.has_pending());
    assert!(fixture.exists(&added));
    assert_eq!(fixture.head()?, head);
    assert!(!fixture.repo()?.is_clean_worktree()?);
    Ok(())
}
