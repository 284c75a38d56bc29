// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{laptop, laptop_name, InventoryFixture};

use stowage::fsck::{fsck, Check};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::{
    fs::create_dir,
    path::{Path, PathBuf},
};

fn stocked() -> Result<InventoryFixture> {
    let fixture = InventoryFixture::new()?;
    let mut inventory = fixture.inventory()?;
    inventory.add_asset(fixture.path("shelf"), laptop("S1"))?;
    inventory.add_asset(fixture.path("shelf/bin"), laptop("S2"))?;
    inventory.commit(None)?;

    Ok(fixture)
}

fn shelved(serial: &str) -> PathBuf {
    Path::new("shelf").join(laptop_name(serial))
}

#[test]
fn healthy_inventory_passes_every_check() -> Result<()> {
    let fixture = stocked()?;
    let report = fsck(&fixture.repo()?, &[])?;

    assert_eq!(report.checks, Check::ALL.to_vec());
    assert_eq!(report.failures, Vec::new());
    assert!(report.is_ok());
    Ok(())
}

#[test]
fn failures_are_aggregated_across_checks() -> Result<()> {
    let fixture = stocked()?;
    fixture.write(shelved("S1"), "key: [unclosed")?;
    create_dir(fixture.path("loose"))?;

    let report = fsck(&fixture.repo()?, &[])?;
    assert!(!report.is_ok());

    let broken = report
        .failures_of(Check::AssetYaml)
        .map(|failure| failure.path.clone())
        .collect::<Vec<_>>();
    assert_eq!(broken, vec![Some(shelved("S1"))]);

    let unanchored = report
        .failures_of(Check::Anchors)
        .map(|failure| failure.path.clone())
        .collect::<Vec<_>>();
    assert_eq!(unanchored, vec![Some(PathBuf::from("loose"))]);

    let dirty = report
        .failures_of(Check::CleanTree)
        .map(|failure| failure.path.clone())
        .collect::<Vec<_>>();
    assert_eq!(dirty, vec![Some(shelved("S1"))]);
    Ok(())
}

#[test]
fn misnamed_asset_is_reported() -> Result<()> {
    let fixture = stocked()?;
    let mut content = fixture.read(shelved("S1"))?;
    content = content.replace("serial: S1", "serial: S7");
    fixture.write(shelved("S1"), &content)?;

    let report = fsck(&fixture.repo()?, &[Check::AssetNames])?;
    assert_eq!(report.checks, vec![Check::AssetNames]);

    let misnamed = report
        .failures_of(Check::AssetNames)
        .map(|failure| failure.path.clone())
        .collect::<Vec<_>>();
    assert_eq!(misnamed, vec![Some(shelved("S1"))]);
    Ok(())
}

#[test]
fn reserved_key_in_record_is_reported() -> Result<()> {
    let fixture = stocked()?;
    let content = fixture.read(shelved("S1"))?;
    fixture.write(shelved("S1"), &format!("{content}path: elsewhere\n"))?;

    let report = fsck(&fixture.repo()?, &[Check::PseudoKeys])?;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].check, Check::PseudoKeys);
    Ok(())
}
