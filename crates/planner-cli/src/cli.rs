use clap::{Args, Parser, Subcommand, ValueEnum};

/// Recurring tasks, expanded into concrete occurrences you can skip, complete and adjust
#[derive(Parser, Debug)]
#[command(name = "planner", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Add a new task, optionally recurring
    Add(AddCommand),
    /// Check a rule's text form, or replace the rule of a task
    Rule(RuleCommand),
    /// Show upcoming occurrences of a task or of a rule
    Preview(PreviewCommand),
    /// List tasks, or the occurrences of one task
    List(ListCommand),
    /// Bring stored occurrences in line with the rules
    Reconcile(ReconcileCommand),
    /// Remove the occurrence on a given day
    Skip(SkipCommand),
    /// Mark an occurrence as completed
    Done(OccurrenceCommand),
    /// Mark a completed occurrence as pending again
    Undo(OccurrenceCommand),
    /// Change the title or due time of one occurrence
    Override(OverrideCommand),
    /// List or remove the skipped days of a task
    Exceptions(ExceptionsCommand),
    /// Show the next reminder of a task
    Remind(RemindCommand),
    /// Delete a task with all of its occurrences
    Delete(DeleteCommand),
}

/// Rule options shared by `add` and `rule`.
#[derive(Args, Debug, Clone, Default)]
pub struct RuleArgs {
    /// Compact rule text, e.g. "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10"
    #[arg(long, conflicts_with_all = ["every", "on"])]
    pub rule: Option<String>,
    /// Human-friendly frequency
    #[arg(long, value_enum)]
    pub every: Option<RecurrenceShortcut>,
    /// Repeat every N units of the frequency
    #[arg(long, requires = "every")]
    pub interval: Option<u32>,
    /// Days of week for weekly rules (mon,tue,wed,thu,fri,sat,sun)
    #[arg(long)]
    pub on: Option<String>,
    /// Last day on which an occurrence may fall (e.g. '2030-12-31')
    #[arg(long, conflicts_with = "count")]
    pub until: Option<String>,
    /// Maximum number of occurrences, counted from the first one
    #[arg(long)]
    pub count: Option<u32>,
}

impl RuleArgs {
    pub fn is_present(&self) -> bool {
        self.rule.is_some() || self.every.is_some()
    }

    /// Options that only refine a rule given some other way.
    pub fn has_modifiers(&self) -> bool {
        self.on.is_some() || self.until.is_some() || self.count.is_some()
    }
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title of the task
    pub title: String,
    /// Free-form notes
    #[arg(short, long)]
    pub notes: Option<String>,
    /// When the task is due (e.g. '2030-01-07 09:00', 'tomorrow')
    #[arg(short, long)]
    pub due: Option<String>,
    #[command(flatten)]
    pub recurrence: RuleArgs,
    /// First day of the recurrence when it differs from the due date
    #[arg(long)]
    pub starts: Option<String>,
    /// Time of day of each occurrence (e.g. '9:00', '14:30')
    #[arg(long)]
    pub at: Option<String>,
    /// IANA timezone of the task, e.g. 'America/New_York'
    #[arg(long)]
    pub timezone: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RuleCommand {
    /// Rule text to check; omit when building the rule with --every
    pub text: Option<String>,
    #[command(flatten)]
    pub recurrence: RuleArgs,
    /// Apply the rule to this task instead of only printing it
    #[arg(long)]
    pub task: Option<String>,
    /// Remove the rule of --task, turning it into a one-off task
    #[arg(long, requires = "task", conflicts_with_all = ["text", "rule", "every"])]
    pub clear: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PreviewCommand {
    /// The ID of the task to preview
    #[arg(required_unless_present = "rule")]
    pub id: Option<String>,
    /// Preview a rule that is not attached to any task
    #[arg(long, requires = "start", conflicts_with = "id")]
    pub rule: Option<String>,
    /// First occurrence of --rule (e.g. '2030-01-07 09:00')
    #[arg(long)]
    pub start: Option<String>,
    /// Only show occurrences at or after this time
    #[arg(long)]
    pub from: Option<String>,
    /// Number of occurrences to show
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// Show the occurrences of this task instead of the task list
    pub id: Option<String>,
    /// Start of the listed range (defaults to the materialization horizon)
    #[arg(long, requires = "id")]
    pub from: Option<String>,
    /// End of the listed range
    #[arg(long, requires = "id")]
    pub to: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ReconcileCommand {
    /// Only reconcile this task
    pub id: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct SkipCommand {
    /// The ID of the task
    pub id: String,
    /// The day whose occurrence is removed
    pub date: String,
}

#[derive(Parser, Debug, Clone)]
pub struct OccurrenceCommand {
    /// The ID of the task
    pub id: String,
    /// The occurrence, by scheduled time or by day (e.g. '2030-01-07 09:00', '2030-01-07')
    pub at: String,
}

#[derive(Parser, Debug, Clone)]
pub struct OverrideCommand {
    /// The ID of the task
    pub id: String,
    /// The occurrence, by scheduled time or by day
    pub at: String,
    /// Title shown for this occurrence only
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "title")]
    pub clear_title: bool,
    /// Due time of this occurrence only
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long, conflicts_with = "due")]
    pub clear_due: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ExceptionsCommand {
    /// The ID of the task
    pub id: String,
    /// Bring back the occurrence on this day
    #[arg(long)]
    pub remove: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RemindCommand {
    /// The ID of the task
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID of the task to delete
    pub id: String,
}

/// Common recurrence patterns
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceShortcut {
    /// Every day
    Daily,
    /// Every week; on the start day unless --on is given
    Weekly,
    /// Every month (same date, clamped to short months)
    Monthly,
    /// Every year (same date)
    Yearly,
    /// Monday to Friday
    Weekdays,
    /// Saturday and Sunday
    Weekends,
}
