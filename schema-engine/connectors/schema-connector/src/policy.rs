use crate::MigrationError;

/// A four-valued decision for one change category, resolved once per
/// ambiguous change the differ encounters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPolicy {
    /// Apply the change silently.
    Proceed,
    /// Do not apply; emit a comment marker in its place.
    Skip,
    /// Apply, but record a reason and raise `ManualMigrationRequired` once
    /// the surrounding call finishes.
    RequireManualMigration,
    /// Block on the injected [`Prompter`] until it resolves to one of the
    /// other three values.
    #[default]
    Prompt,
}

impl ActionPolicy {
    pub fn parse(s: &str) -> Result<Self, MigrationError> {
        match s {
            "proceed" => Ok(Self::Proceed),
            "skip" => Ok(Self::Skip),
            "require_manual_migration" => Ok(Self::RequireManualMigration),
            "prompt" => Ok(Self::Prompt),
            other => Err(MigrationError::validation(format!(
                "unknown action policy: {other:?}"
            ))),
        }
    }
}

/// The category of change a single policy value governs. The differ
/// consults one of these per detected rename or destructive change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCategory {
    Rename,
    DestructiveChange,
    ChangedIndex,
    ChangedView,
    ChangedTrigger,
}

/// The caller's reply to a blocking `PROMPT` decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptReply {
    Proceed,
    Skip,
    Manual,
}

impl PromptReply {
    /// `y` -> Proceed, `n` -> Skip, `m` -> Manual; anything else means
    /// "re-prompt" and is represented by `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "y" => Some(Self::Proceed),
            "n" => Some(Self::Skip),
            "m" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn into_policy(self) -> ActionPolicy {
        match self {
            Self::Proceed => ActionPolicy::Proceed,
            Self::Skip => ActionPolicy::Skip,
            Self::Manual => ActionPolicy::RequireManualMigration,
        }
    }
}

/// Blocking prompt callback invoked when a policy is `Prompt`. Implementors
/// must keep asking until they get a reply [`PromptReply::parse`] accepts;
/// the differ itself never re-prompts on malformed input on the caller's
/// behalf.
pub trait Prompter: Send + Sync {
    fn prompt(&self, category: ActionCategory, description: &str) -> PromptReply;
}

/// A prompter that always answers with a fixed reply, for non-interactive
/// callers (tests, CI, `make --yes`).
pub struct FixedPrompter(pub PromptReply);

impl Prompter for FixedPrompter {
    fn prompt(&self, _category: ActionCategory, _description: &str) -> PromptReply {
        self.0
    }
}

/// Resolves a policy for one change, consulting the prompter if necessary.
/// This is the single seat where `Prompt` is ever turned into a concrete
/// decision; everything downstream only ever sees the three terminal
/// values.
pub fn resolve(policy: ActionPolicy, category: ActionCategory, description: &str, prompter: &dyn Prompter) -> ActionPolicy {
    match policy {
        ActionPolicy::Prompt => prompter.prompt(category, description).into_policy(),
        other => other,
    }
}
