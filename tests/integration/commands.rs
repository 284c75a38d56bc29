// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{laptop_name, InventoryFixture};

use stowage::{
    commands::{self, Base, CommandError, NewAssets, Selection},
    fsck::FsckError,
    inventory::{CommitOutcome, InventoryError, RemoveMode},
    repo::RepoError,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn shelved(serial: &str) -> PathBuf {
    Path::new("shelf").join(laptop_name(serial))
}

fn laptop_assignments(serial: &str) -> Vec<String> {
    vec![
        "type=laptop".into(),
        "make=apple".into(),
        "model=macbook".into(),
        format!("serial={serial}"),
    ]
}

fn stocked() -> Result<InventoryFixture> {
    let fixture = InventoryFixture::new()?;
    let mut inventory = fixture.inventory()?;
    commands::mkdir(&mut inventory, &[fixture.path("shelf/bin")], None)?;
    for serial in ["S1", "S2"] {
        commands::new_asset(
            &mut inventory,
            fixture.path("shelf"),
            &laptop_assignments(serial),
            None,
        )?;
    }

    Ok(fixture)
}

#[test]
fn new_asset_commits_once_per_command() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let mut inventory = fixture.inventory()?;
    let (added, outcome) = commands::new_asset(
        &mut inventory,
        fixture.path("shelf"),
        &laptop_assignments("S1"),
        None,
    )?;

    assert_eq!(added, shelved("S1"));
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    assert_eq!(fixture.commit_count()?, 2);
    assert!(fixture.read(&added)?.contains("serial: S1"));
    Ok(())
}

#[test]
fn new_asset_rejects_key_assigned_twice() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let count = fixture.commit_count()?;
    let mut inventory = fixture.inventory()?;
    let mut assignments = laptop_assignments("S1");
    assignments.extend(["color=red".into(), "color=blue".into()]);

    let result = commands::new_asset(&mut inventory, fixture.path("shelf"), &assignments, None);
    assert!(matches!(
        result,
        Err(CommandError::Inventory(InventoryError::Usage(_)))
    ));
    assert!(!fixture.exists(shelved("S1")));
    assert!(!inventory.has_pending());
    assert_eq!(fixture.commit_count()?, count);
    Ok(())
}

#[test]
fn new_asset_starts_from_template() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let template = PathBuf::from(".stowage/templates/laptop");
    fixture.write(&template, "type: laptop\nmake: apple\nmodel: macbook\n")?;
    fixture.repo()?.stage_and_commit(&[template], "add laptop template")?;

    let mut inventory = fixture.inventory()?;
    let spec = NewAssets {
        directory: Some(fixture.path("shelf")),
        base: Base::Template("laptop".into()),
        assignments: vec!["serial=S1".into()],
        ..Default::default()
    };
    let (added, _) = commands::new_assets(&mut inventory, &spec, None)?;

    assert_eq!(added, vec![shelved("S1")]);
    assert!(fixture.read(shelved("S1"))?.contains("model: macbook"));

    let missing = NewAssets {
        base: Base::Template("phone".into()),
        ..spec
    };
    let result = commands::new_assets(&mut inventory, &missing, None);
    assert!(matches!(
        result,
        Err(CommandError::Repo(RepoError::NoSuchTemplate(_)))
    ));
    Ok(())
}

#[test]
fn new_asset_clones_existing_record() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    commands::set(
        &mut inventory,
        &Selection::new([fixture.path(shelved("S1"))]),
        &["color=red".into()],
        false,
        None,
    )?;

    let spec = NewAssets {
        directory: Some(fixture.path("shelf/bin")),
        base: Base::Clone(fixture.path(shelved("S1"))),
        assignments: vec!["serial=S9".into()],
        ..Default::default()
    };
    let (added, _) = commands::new_assets(&mut inventory, &spec, None)?;

    let clone = Path::new("shelf/bin").join(laptop_name("S9"));
    assert_eq!(added, vec![clone.clone()]);
    let content = fixture.read(&clone)?;
    assert!(content.contains("color: red"));
    assert!(content.contains("serial: S9"));
    assert!(fixture.read(shelved("S1"))?.contains("serial: S1"));
    Ok(())
}

#[test]
fn new_assets_from_table_share_one_commit() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let count = fixture.commit_count()?;
    let rows = commands::parse_table(
        "type\tmake\tmodel\tserial\tdirectory\n\
         laptop\tapple\tmacbook\tT1\tshelf\n\
         laptop\tapple\tmacbook\tT2\track\n",
    )?;
    let mut inventory = fixture.inventory()?;
    let spec = NewAssets {
        assignments: vec!["color=red".into()],
        rows,
        ..Default::default()
    };
    let (added, outcome) = commands::new_assets(&mut inventory, &spec, None)?;

    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    assert_eq!(
        added,
        vec![
            shelved("T1"),
            Path::new("rack").join(laptop_name("T2")),
        ]
    );
    assert_eq!(fixture.commit_count()?, count + 1);
    assert!(fixture.read(shelved("T1"))?.contains("color: red"));
    assert!(!fixture.read(shelved("T1"))?.contains("directory"));
    Ok(())
}

#[test]
fn table_directory_conflicts_with_given_directory() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let count = fixture.commit_count()?;
    let rows = commands::parse_table("serial\tdirectory\nT1\tshelf\n")?;
    let mut inventory = fixture.inventory()?;
    let spec = NewAssets {
        directory: Some(fixture.path("rack")),
        rows,
        ..Default::default()
    };

    let result = commands::new_assets(&mut inventory, &spec, None);
    assert!(matches!(
        result,
        Err(CommandError::Inventory(InventoryError::Usage(_)))
    ));
    assert_eq!(fixture.commit_count()?, count);
    Ok(())
}

#[test]
fn dirty_tree_is_refused() -> Result<()> {
    let fixture = stocked()?;
    let head = fixture.head()?;
    fixture.write("stray.txt", "x")?;

    let mut inventory = fixture.inventory()?;
    let result = commands::rm(
        &mut inventory,
        &[fixture.path(shelved("S1"))],
        RemoveMode::All,
        None,
    );
    match result {
        Err(CommandError::DirtyTree(paths)) => {
            assert_eq!(paths, vec![PathBuf::from("stray.txt")]);
        }
        other => panic!("expected dirty tree, got {other:?}"),
    }

    assert!(fixture.exists(shelved("S1")));
    assert_eq!(fixture.head()?, head);
    Ok(())
}

#[test]
fn rm_generates_subject() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    commands::rm(
        &mut inventory,
        &[fixture.path(shelved("S2")), fixture.path(shelved("S1"))],
        RemoveMode::All,
        None,
    )?;

    let message = fixture.repo()?.commit_message(None)?;
    let subject = message.lines().next().unwrap_or_default();
    assert_eq!(
        subject,
        format!(
            "rm [2]: shelf/{}, shelf/{}",
            laptop_name("S1"),
            laptop_name("S2")
        )
    );
    Ok(())
}

#[test]
fn failed_command_leaves_nothing_pending() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    let result = commands::rm(
        &mut inventory,
        &[fixture.path(shelved("S1")), fixture.path("nowhere")],
        RemoveMode::All,
        None,
    );

    assert!(matches!(result, Err(CommandError::Inventory(_))));
    assert!(!inventory.has_pending());
    assert!(fixture.exists(shelved("S1")));
    Ok(())
}

#[test]
fn mv_renames_single_directory() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    commands::mv(
        &mut inventory,
        &[fixture.path("shelf")],
        fixture.path("cabinet"),
        Some("rename shelf"),
    )?;

    assert!(!fixture.exists("shelf"));
    assert!(fixture.exists(Path::new("cabinet").join(laptop_name("S1"))));
    assert!(fixture.exists("cabinet/bin/.anchor"));
    let message = fixture.repo()?.commit_message(None)?;
    assert!(message.starts_with("rename shelf\n"));
    Ok(())
}

#[test]
fn mv_moves_into_existing_directory() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    commands::mv(
        &mut inventory,
        &[fixture.path(shelved("S1")), fixture.path(shelved("S2"))],
        fixture.path("shelf/bin"),
        None,
    )?;

    assert!(fixture.exists(Path::new("shelf/bin").join(laptop_name("S1"))));
    assert!(fixture.exists(Path::new("shelf/bin").join(laptop_name("S2"))));
    assert!(!fixture.exists(shelved("S1")));
    Ok(())
}

#[test]
fn set_to_current_value_commits_nothing() -> Result<()> {
    let fixture = stocked()?;
    let count = fixture.commit_count()?;
    let mut inventory = fixture.inventory()?;
    let outcome = commands::set(
        &mut inventory,
        &Selection::new([fixture.path(shelved("S1"))]),
        &["make=apple".into()],
        true,
        None,
    )?;

    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert_eq!(fixture.commit_count()?, count);
    Ok(())
}

#[test]
fn set_and_unset_over_filtered_selection() -> Result<()> {
    let fixture = stocked()?;
    let mut inventory = fixture.inventory()?;
    let selection = Selection::new([fixture.path("shelf")]).with_filters(&["serial=S2".into()])?;
    commands::set(&mut inventory, &selection, &["color=red".into()], false, None)?;

    assert!(fixture.read(shelved("S2"))?.contains("color: red"));
    assert!(!fixture.read(shelved("S1"))?.contains("color"));

    commands::unset(&mut inventory, &selection, &["color".into()], false, None)?;
    assert!(!fixture.read(shelved("S2"))?.contains("color"));
    Ok(())
}

#[test]
fn get_reports_rows_in_path_order() -> Result<()> {
    let fixture = stocked()?;
    let inventory = fixture.inventory()?;
    let rows = commands::get(
        &inventory,
        &["serial".into(), "model".into()],
        &Selection::default(),
    )?;

    let serials = rows
        .iter()
        .map(|row| (row.path.clone(), row.values[0].1.clone()))
        .collect::<Vec<_>>();
    assert_eq!(
        serials,
        vec![(shelved("S1"), "S1".to_string()), (shelved("S2"), "S2".to_string())]
    );
    assert_eq!(rows[0].values[1], ("model".to_string(), "macbook".to_string()));
    Ok(())
}

#[test]
fn config_round_trips_through_inventory_file() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let mut repo = fixture.repo()?;
    commands::config_set(&mut repo, "assets.filename", "{make}.{serial}", "inventory")?;

    assert_eq!(
        commands::config_get(&repo, "assets.filename")?,
        Some("{make}.{serial}".to_string())
    );
    assert_eq!(fixture.commit_count()?, 2);

    let result = commands::config_set(&mut repo, "assets.filename", "x", "nowhere");
    assert!(matches!(result, Err(CommandError::Config(_))));
    Ok(())
}

#[test]
fn fsck_rejects_unknown_check() -> Result<()> {
    let fixture = InventoryFixture::new()?;
    let result = commands::fsck(&fixture.repo()?, &["bogus".into()]);

    assert!(matches!(
        result,
        Err(CommandError::Fsck(FsckError::UnknownCheck(_)))
    ));
    Ok(())
}
