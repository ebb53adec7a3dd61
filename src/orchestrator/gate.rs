//! Confirmation gate for destructive operations.
//!
//! Whether to proceed is a pure function of the auto-approve policy and the
//! user's answer (if one was given), so the rule can be tested without a
//! terminal. Prompting itself sits behind [`Prompter`].

use dialoguer::{Confirm, Select, theme::ColorfulTheme};

use crate::errors::{LabError, LabResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Proceed,
    Declined,
    /// No policy applies and no answer yet; the user must be asked.
    Ask,
}

/// Auto-approve wins over everything; otherwise the answer decides.
pub fn decide(auto_approve: bool, answer: Option<bool>) -> Confirmation {
    match (auto_approve, answer) {
        (true, _) => Confirmation::Proceed,
        (false, Some(true)) => Confirmation::Proceed,
        (false, Some(false)) => Confirmation::Declined,
        (false, None) => Confirmation::Ask,
    }
}

pub trait Prompter: Send + Sync {
    fn confirm(&self, prompt: &str) -> LabResult<bool>;

    /// `Ok(None)` when the user backs out of the selection.
    fn select(&self, prompt: &str, items: &[String]) -> LabResult<Option<usize>>;
}

/// Ask at most once, honouring auto-approve.
pub fn confirm(prompter: &dyn Prompter, auto_approve: bool, prompt: &str) -> LabResult<bool> {
    let decision = match decide(auto_approve, None) {
        Confirmation::Ask => decide(false, Some(prompter.confirm(prompt)?)),
        decided => decided,
    };
    Ok(decision == Confirmation::Proceed)
}

/// Interactive prompts on the controlling terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str) -> LabResult<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| LabError::Prompt(e.to_string()))
    }

    fn select(&self, prompt: &str, items: &[String]) -> LabResult<Option<usize>> {
        if items.is_empty() {
            return Ok(None);
        }
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()
            .map_err(|e| LabError::Prompt(e.to_string()))
    }
}
