//! Chat command grammar.
//!
//! Commands are recognised by fixed prefixes of the lower-cased text that
//! follows the bot mention. Matching is first-match in the order of
//! [`Command::parse`].

pub mod interpreter;

pub use interpreter::{CommandInterpreter, Disposition};

/// The closed set of commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Delete,
    Details,
    Help,
    IncreaseThreshold,
    ListThresholds,
    Link,
    ListSettings,
    ListSubreddits,
    SetThreshold,
    SetPostInterval,
    Pop,
    NumMemes,
    Kill,
    Echo,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.to_lowercase();
        let text = text.as_str();

        if text.starts_with("add") {
            Self::Add
        } else if text.starts_with("delete") || text.starts_with("remove") {
            Self::Delete
        } else if text.starts_with("details") {
            Self::Details
        } else if text == "help" {
            Self::Help
        } else if text.starts_with("increase threshold") {
            Self::IncreaseThreshold
        } else if text.starts_with("list thresholds") {
            Self::ListThresholds
        } else if text.starts_with("link") {
            Self::Link
        } else if text == "list settings" {
            Self::ListSettings
        } else if text == "list subreddits" {
            Self::ListSubreddits
        } else if text.starts_with("set threshold") {
            Self::SetThreshold
        } else if text.starts_with("set post interval") {
            Self::SetPostInterval
        } else if text.starts_with("pop") {
            Self::Pop
        } else if text.starts_with("num-memes") {
            Self::NumMemes
        } else if text == "kill" {
            Self::Kill
        } else if text.starts_with("echo ") {
            Self::Echo
        } else {
            Self::Unknown
        }
    }
}

/// Usage line and description for every command, as listed by `help`.
pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("add <sub>", "Adds <sub> to the list of subreddits scraped"),
    ("delete <sub>", "Deletes <sub> from the list of subreddits scraped"),
    ("details <meme_url>", "Gives details for a meme if meme_url has been scraped"),
    ("echo <text>", "Repeats <text> back"),
    ("help", "Prints a list of commands and short descriptions"),
    (
        "increase threshold <threshold> {optional_subreddit}",
        "Sets threshold for {optional_subreddit} to the old threshold + or - the <threshold> value passed. Defaults to global",
    ),
    ("kill", "Kills automemer. Program is stopped, no scraping, no posting"),
    ("link <url>", "Prints the link associated with the url passed"),
    ("list settings", "Prints out all settings"),
    ("list subreddits", "Prints a list of subreddits currently being scraped"),
    ("list thresholds", "Prints the thresholds for subs"),
    (
        "num-memes {postable_only} {by_sub}",
        "Prints the number of memes currently waiting to be posted. To only count memes with enough upvotes use `num-memes postable_only`, to get a breakdown by subreddit use `num-memes by_sub`",
    ),
    ("pop {num}", "pops {num} memes (or as many as there are) from the queue"),
    ("set post interval <int>", "sets the post interval to <int> minutes"),
    (
        "set threshold <threshold> {optional_subreddit}",
        "Sets threshold upvotes a meme must meet to be posted. If {optional_subreddit} is specified, sets <threshold> specifically for that sub, otherwise a global threshold is set (applied to subs without a specific threshold)",
    ),
];
