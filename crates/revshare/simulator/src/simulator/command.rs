use std::{fmt, str::FromStr};

use crate::CommandError;

/// Which tasks a start/stop command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every task.
    All,
    /// The task with this name.
    Task(String),
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `start all` or `start <name>`.
    Start(Target),
    /// `stop all` or `stop <name>`.
    Stop(Target),
    /// `show status`.
    ShowStatus,
    /// `exit`.
    Exit,
}

fn is_task_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || CommandError::Invalid(line.trim().to_string());
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            ["exit"] => Ok(Self::Exit),
            ["show", "status"] => Ok(Self::ShowStatus),
            [action @ ("start" | "stop"), name] => {
                let target = match *name {
                    "all" => Target::All,
                    name if is_task_name(name) => Target::Task(name.to_string()),
                    _ => return Err(invalid()),
                };
                Ok(if *action == "start" { Self::Start(target) } else { Self::Stop(target) })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Task(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(target) => write!(f, "start {target}"),
            Self::Stop(target) => write!(f, "stop {target}"),
            Self::ShowStatus => f.write_str("show status"),
            Self::Exit => f.write_str("exit"),
        }
    }
}
