//! Delete confirmation policies
//!
//! Deletes ask a [`Confirmation`] before touching the stores. Interactive
//! callers use [`Prompt`]; tests and scripts pass [`AssumeYes`], [`AssumeNo`]
//! or a closure.

use dialoguer::Confirm;
use tracing::warn;

/// Decides whether a destructive operation may proceed.
pub trait Confirmation {
    /// Return `true` to proceed. `prompt` describes what is about to happen.
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirmation for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Always proceed (the `confirmed=True` case).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Never proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirmation for AssumeNo {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Ask on the terminal with a `[y/N]` prompt. Defaults to no.
///
/// A terminal that cannot be read (no TTY, closed stdin) counts as a refusal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prompt;

impl Confirmation for Prompt {
    fn confirm(&self, prompt: &str) -> bool {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "confirmation prompt failed; treating as refusal");
                false
            }
        }
    }
}
