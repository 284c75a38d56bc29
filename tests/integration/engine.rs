// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{fake_inventory, laptop, laptop_name, FakeVcs, ScriptedPrompt};

use stowage::{
    config::{ConfigLocation, Settings},
    filter::Filter,
    inventory::{
        snapshot::EntryKind, CommitOutcome, FieldUpdate, Inventory, InventoryError, RemoveMode,
        CONFIRM_QUESTION,
    },
    repo::InventoryRepo,
};

use anyhow::Result;
use simple_test_case::test_case;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type FakeInventory = Inventory<FakeVcs, ScriptedPrompt>;

fn shelf() -> Result<(TempDir, FakeInventory)> {
    let (dir, mut inventory) = fake_inventory(ScriptedPrompt::yes(), Settings::default())?;
    let root = dir.path().to_path_buf();
    inventory.add_asset(root.join("shelf"), laptop("S1"))?;
    inventory.add_asset(root.join("shelf"), laptop("S2"))?;
    inventory.commit(None)?;

    Ok((dir, inventory))
}

fn shelved(serial: &str) -> PathBuf {
    Path::new("shelf").join(laptop_name(serial))
}

fn set(key: &str, value: &str) -> FieldUpdate {
    FieldUpdate::Set {
        key: key.into(),
        value: stowage::record::parse_value(value),
    }
}

fn commits(inventory: &FakeInventory) -> usize {
    inventory.repo().vcs().commits().len()
}

#[test]
fn declined_commit_touches_nothing() -> Result<()> {
    let prompt = ScriptedPrompt::no();
    let (dir, mut inventory) = fake_inventory(prompt.clone(), Settings::default())?;
    inventory.add_asset(dir.path().join("shelf"), laptop("S1"))?;

    pretty_assertions::assert_eq!(inventory.commit(None)?, CommitOutcome::Declined);
    assert!(!dir.path().join("shelf").exists());
    assert!(!inventory.has_pending());
    pretty_assertions::assert_eq!(commits(&inventory), 1);
    pretty_assertions::assert_eq!(*prompt.questions.borrow(), vec![CONFIRM_QUESTION.to_string()]);
    assert!(prompt
        .shown
        .borrow()
        .contains(&format!("+ shelf/{}", laptop_name("S1"))));
    Ok(())
}

#[test]
fn refused_commit_discards_pending_operations() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let refusal = inventory.repo().vcs().commit_refusal();
    refusal.set(true);
    inventory.add_asset(dir.path().join("shelf"), laptop("S3"))?;

    let result = inventory.commit(None);
    assert!(matches!(result, Err(InventoryError::Repo(_))));
    assert!(!inventory.has_pending());
    pretty_assertions::assert_eq!(commits(&inventory), 2);

    refusal.set(false);
    pretty_assertions::assert_eq!(inventory.commit(None)?, CommitOutcome::NothingToCommit);
    pretty_assertions::assert_eq!(commits(&inventory), 2);
    Ok(())
}

#[test]
fn yes_and_quiet_skip_interaction() -> Result<()> {
    let prompt = ScriptedPrompt::no();
    let settings = Settings {
        yes: true,
        quiet: true,
    };
    let (dir, mut inventory) = fake_inventory(prompt.clone(), settings)?;
    inventory.add_asset(dir.path().join("shelf"), laptop("S1"))?;

    assert!(matches!(
        inventory.commit(None)?,
        CommitOutcome::Committed { .. }
    ));
    assert!(prompt.questions.borrow().is_empty());
    assert!(prompt.shown.borrow().is_empty());
    assert!(dir.path().join(shelved("S1")).is_file());
    Ok(())
}

#[test]
fn generated_subject_names_verb_and_paths() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    inventory.remove([dir.path().join(shelved("S2"))], RemoveMode::All)?;

    let CommitOutcome::Committed { message, .. } = inventory.commit(None)? else {
        panic!("expected commit");
    };
    let subject = message.lines().next().unwrap_or_default();
    pretty_assertions::assert_eq!(subject, format!("rm [1]: shelf/{}", laptop_name("S2")));
    Ok(())
}

#[test]
fn later_requests_see_earlier_ones() -> Result<()> {
    let (dir, mut inventory) = fake_inventory(ScriptedPrompt::yes(), Settings::default())?;
    let root = dir.path();
    let added = inventory.add_asset(root.join("a/b"), laptop("S1"))?;
    pretty_assertions::assert_eq!(added, Path::new("a/b").join(laptop_name("S1")));

    // Queued directory is already usable as a move destination.
    inventory.add_directory(root.join("c"))?;
    inventory.move_to([root.join(&added)], root.join("c"))?;
    inventory.commit(None)?;

    assert!(root.join("a/b/.anchor").is_file());
    assert!(root.join("c").join(laptop_name("S1")).is_file());
    assert!(!root.join(&added).exists());
    Ok(())
}

#[test]
fn duplicate_asset_name_is_rejected() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let result = inventory.add_asset(dir.path().join("elsewhere"), laptop("S1"));

    assert!(matches!(result, Err(InventoryError::AlreadyExists { .. })));
    assert!(!inventory.has_pending());
    Ok(())
}

#[test]
fn reserved_keys_cannot_be_stored() -> Result<()> {
    let (dir, mut inventory) = fake_inventory(ScriptedPrompt::yes(), Settings::default())?;
    let mut record = laptop("S1");
    record.set("path", "somewhere");

    let result = inventory.add_asset(dir.path().join("shelf"), record);
    assert!(matches!(result, Err(InventoryError::Usage(_))));
    Ok(())
}

#[test]
fn move_onto_asset_makes_asset_directory() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let root = dir.path();
    inventory.move_to([root.join(shelved("S2"))], root.join(shelved("S1")))?;
    inventory.commit(None)?;

    pretty_assertions::assert_eq!(
        inventory.index().kind(&shelved("S1")),
        Some(EntryKind::AssetDirectory)
    );
    assert!(root.join(shelved("S1")).join(".stowage-asset").is_file());
    assert!(root.join(shelved("S1")).join(laptop_name("S2")).is_file());
    let record = inventory.get_record(root.join(shelved("S1")))?;
    pretty_assertions::assert_eq!(record.get_string("serial"), Some("S1".into()));
    Ok(())
}

#[test]
fn move_reports_every_problem() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let root = dir.path();
    inventory.add_directory(root.join("bin"))?;
    inventory.commit(None)?;

    let result = inventory.move_to(
        [root.join("shelf"), root.join("missing"), root.join("bin")],
        root.join("shelf"),
    );
    let Err(InventoryError::InvalidOperation(problems)) = result else {
        panic!("expected invalid operation");
    };
    let paths = problems
        .into_iter()
        .map(|problem| problem.path)
        .collect::<Vec<_>>();
    pretty_assertions::assert_eq!(
        paths,
        vec![PathBuf::from("shelf"), PathBuf::from("missing")]
    );
    assert!(!inventory.has_pending());
    Ok(())
}

#[test]
fn rename_directory_within_parent() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let root = dir.path();
    inventory.rename_directory(root.join("shelf"), root.join("cabinet"))?;
    inventory.commit(None)?;

    assert!(root.join("cabinet").join(laptop_name("S1")).is_file());
    assert!(!root.join("shelf").exists());

    let result = inventory.rename_directory(root.join("cabinet"), root.join("cabinet/inner"));
    assert!(matches!(result, Err(InventoryError::InvalidOperation(_))));
    Ok(())
}

#[test]
fn naming_field_update_renames_asset() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let root = dir.path();
    let modified = inventory.modify([root.join(shelved("S1"))], &[set("serial", "S9")], true)?;
    pretty_assertions::assert_eq!(modified, vec![shelved("S9")]);
    inventory.commit(None)?;

    assert!(!root.join(shelved("S1")).exists());
    let record = inventory.get_record(root.join(shelved("S9")))?;
    pretty_assertions::assert_eq!(record.get_string("serial"), Some("S9".into()));
    Ok(())
}

#[test]
fn surrogate_placeholder_mints_serial() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let modified = inventory.modify(
        [dir.path().join(shelved("S1"))],
        &[set("serial", "faux")],
        true,
    )?;
    inventory.commit(None)?;

    let name = modified[0]
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let serial = name.trim_start_matches("laptop_apple_macbook.");
    assert!(serial.starts_with("faux"));
    pretty_assertions::assert_eq!(serial.len(), "faux".len() + 6);
    Ok(())
}

#[test_case(vec![set("serial", "S9")], false; "naming field without rename flag")]
#[test_case(vec![set("color", "red"), set("color", "blue")], true; "duplicate keys")]
#[test_case(vec![set("directory", "elsewhere")], true; "reserved key")]
#[test_case(vec![set("is_asset_directory", "maybe")], true; "non boolean asset directory flag")]
#[test]
fn malformed_updates_are_usage_errors(updates: Vec<FieldUpdate>, rename: bool) -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let result = inventory.modify([dir.path().join(shelved("S1"))], &updates, rename);

    assert!(matches!(result, Err(InventoryError::Usage(_))));
    assert!(!inventory.has_pending());
    Ok(())
}

#[test]
fn asset_directory_flag_converts_back_and_forth() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let target = dir.path().join(shelved("S1"));

    inventory.modify([&target], &[set("is_asset_directory", "true")], false)?;
    inventory.commit(None)?;
    pretty_assertions::assert_eq!(
        inventory.index().kind(&shelved("S1")),
        Some(EntryKind::AssetDirectory)
    );
    assert!(target.join(".anchor").is_file());

    inventory.modify([&target], &[set("is_asset_directory", "false")], false)?;
    inventory.commit(None)?;
    pretty_assertions::assert_eq!(inventory.index().kind(&shelved("S1")), Some(EntryKind::Asset));
    assert!(target.is_file());
    Ok(())
}

#[test]
fn modify_rejects_directories() -> Result<()> {
    let (dir, mut inventory) = shelf()?;
    let result = inventory.modify([dir.path().join("shelf")], &[set("color", "red")], false);

    assert!(matches!(result, Err(InventoryError::InvalidOperation(_))));
    Ok(())
}

fn colored() -> Result<(TempDir, FakeInventory)> {
    let (dir, mut inventory) = fake_inventory(ScriptedPrompt::yes(), Settings::default())?;
    let root = dir.path().to_path_buf();
    let mut red = laptop("S1");
    red.set("color", "red");
    let mut blue = laptop("S2");
    blue.set("color", "blue");
    inventory.add_asset(root.join("shelf"), red)?;
    inventory.add_asset(root.join("shelf"), blue)?;
    inventory.add_asset(root.join("shelf/bin"), laptop("S3"))?;
    inventory.commit(None)?;

    Ok((dir, inventory))
}

fn filters(expressions: &[&str]) -> Result<Vec<Filter>> {
    Ok(expressions
        .iter()
        .map(|expression| Filter::compile(expression))
        .collect::<Result<Vec<_>, _>>()?)
}

#[test_case(&["color=red"], 0, vec!["S1"]; "content filter")]
#[test_case(&["color=<unset>"], 0, vec!["S3"]; "unset values")]
#[test_case(&["serial=S[12]"], 0, vec!["S1", "S2"]; "glob over naming field")]
#[test_case(&["make=apple", "color=b*"], 0, vec!["S2"]; "filters combine")]
#[test_case(&[], 1, vec!["S1", "S2"]; "depth limit")]
#[test]
fn select_assets(expressions: &[&str], depth: usize, expect: Vec<&str>) -> Result<()> {
    let (dir, inventory) = colored()?;
    let selected = inventory.select([dir.path().join("shelf")], depth, &filters(expressions)?)?;

    let serials = selected
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| {
            name.to_string_lossy()
                .trim_start_matches("laptop_apple_macbook.")
                .to_string()
        })
        .collect::<Vec<_>>();
    pretty_assertions::assert_eq!(serials, expect);
    Ok(())
}

#[test]
fn query_fills_unset_keys() -> Result<()> {
    let (dir, inventory) = colored()?;
    let rows = inventory.query(
        &["serial".into(), "color".into(), "path".into()],
        [dir.path().join("shelf/bin")],
        0,
        &[],
    )?;

    pretty_assertions::assert_eq!(rows.len(), 1);
    pretty_assertions::assert_eq!(
        rows[0].values,
        vec![
            ("serial".to_string(), "S3".to_string()),
            ("color".to_string(), "<unset>".to_string()),
            ("path".to_string(), format!("shelf/bin/{}", laptop_name("S3"))),
        ]
    );
    Ok(())
}

#[test]
fn query_defaults_to_naming_fields_and_path() -> Result<()> {
    let (dir, inventory) = colored()?;
    let rows = inventory.query(&[], [dir.path().join(shelved("S1"))], 0, &[])?;

    let keys = rows[0]
        .values
        .iter()
        .map(|(key, _)| key.as_str())
        .collect::<Vec<_>>();
    pretty_assertions::assert_eq!(keys, vec!["type", "make", "model", "serial", "path"]);
    Ok(())
}

#[test]
fn configured_template_names_assets() -> Result<()> {
    let dir = tempfile::Builder::new().prefix("stowage-").tempdir()?;
    let mut repo = InventoryRepo::init_with(FakeVcs::new(dir.path()))?;
    repo.set_config("assets.filename", "{make}-{serial}", ConfigLocation::Inventory)?;
    pretty_assertions::assert_eq!(
        repo.get_config("assets.filename")?,
        Some("{make}-{serial}".to_string())
    );
    pretty_assertions::assert_eq!(repo.vcs().commits().len(), 2);

    let mut inventory = Inventory::new(repo, ScriptedPrompt::yes(), Settings::default())?;
    let added = inventory.add_asset(dir.path().join("shelf"), laptop("S1"))?;
    pretty_assertions::assert_eq!(added, PathBuf::from("shelf/apple-S1"));
    Ok(())
}

#[test_case("asset", RemoveMode::Asset; "asset")]
#[test_case("dir", RemoveMode::Dir; "dir")]
#[test_case("all", RemoveMode::All; "all")]
#[test]
fn parse_remove_modes(input: &str, expect: RemoveMode) -> Result<()> {
    pretty_assertions::assert_eq!(input.parse::<RemoveMode>()?, expect);
    pretty_assertions::assert_eq!(expect.to_string(), input);
    Ok(())
}

#[test]
fn unknown_remove_mode_is_usage_error() {
    let result = "everything".parse::<RemoveMode>();
    assert!(matches!(result, Err(InventoryError::Usage(_))));
}
