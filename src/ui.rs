// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User interaction.
//!
//! The inventory asks before it changes anything. Asking happens through the
//! [`Prompt`] trait, so the terminal can be swapped out for a scripted answer
//! in tests.

use inquire::Confirm;
use tracing::debug;

/// Interactive capability used by the inventory.
pub trait Prompt {
    /// Ask yes or no question.
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Present lines of text to the user, e.g., a diff of pending changes.
    fn show(&mut self, lines: &[String]);
}

/// Prompt through the terminal with inquire.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompt;

impl Prompt for InquirePrompt {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = Confirm::new(question).with_default(false).prompt()?;
        debug!("user answered {answer} to {question:?}");

        Ok(answer)
    }

    fn show(&mut self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

/// User interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum UiError {
    /// Terminal prompt fails or is cancelled.
    #[error(transparent)]
    Inquire(#[from] inquire::InquireError),
}

/// Friendly result alias :3
pub type Result<T, E = UiError> = std::result::Result<T, E>;
