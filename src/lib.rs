// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Text-based inventory tracker over a Git work tree.
//!
//! # Inventories
//!
//! An __inventory__ is a Git work tree where every tracked file is the YAML
//! record of one __asset__, and every tracked directory groups assets. Git
//! does not track empty directories, so each inventory directory carries an
//! empty __anchor__ file named `.anchor`. A directory can also be an asset on
//! its own. Such an __asset directory__ keeps its record in `.stowage-asset`.
//!
//! Asset file names are derived from record content through a naming
//! template like `{type}_{make}_{model}.{serial}`. Changing a naming field
//! renames the asset.
//!
//! # Transactions
//!
//! Every change goes through an [`inventory::Inventory`]. Requests are
//! validated and planned in memory first, shown as a diff, and then carried
//! out as exactly one Git commit. A request that is not valid leaves the tree
//! and its history untouched.

pub mod commands;
pub mod config;
pub mod filter;
pub mod fsck;
pub mod inventory;
pub mod naming;
pub mod path;
pub mod record;
pub mod repo;
pub mod ui;

pub use inventory::{CommitOutcome, FieldUpdate, Inventory, InventoryError, RemoveMode};
pub use repo::InventoryRepo;
