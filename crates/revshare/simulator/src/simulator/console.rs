use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Command, Simulator, Target};
use crate::{CommandError, SimulatorResult};

/// Line-oriented operator console over any async reader and writer.
#[derive(Debug)]
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Reads commands from `input` and prints to `output`.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Consumes the console, returning its writer.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Next line without its terminator. `None` at end of input.
    pub async fn read_line(&mut self) -> SimulatorResult<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Writes `line` followed by a newline.
    pub async fn write_line(&mut self, line: &str) -> SimulatorResult<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Prints `question` and returns the trimmed answer.
    pub async fn prompt(&mut self, question: &str) -> SimulatorResult<String> {
        self.output.write_all(question.as_bytes()).await?;
        self.output.flush().await?;
        let answer = self.read_line().await?.unwrap_or_default();
        Ok(answer.trim().to_string())
    }

    /// Asks for a non-negative integer, rejecting zero unless `allow_zero`.
    pub async fn prompt_integer(&mut self, question: &str, allow_zero: bool) -> SimulatorResult<u64> {
        let answer = self.prompt(question).await?;
        match answer.parse::<u64>() {
            Ok(0) if !allow_zero => {
                Err(CommandError::InvalidInput(format!("{answer:?} must be positive")).into())
            }
            Ok(value) => Ok(value),
            Err(_) => {
                Err(CommandError::InvalidInput(format!("{answer:?} is not an integer")).into())
            }
        }
    }

    /// Asks a yes/no question. Only `y` confirms.
    pub async fn confirm(&mut self, question: &str) -> SimulatorResult<bool> {
        Ok(self.prompt(question).await? == "y")
    }

    /// Starts every task and serves commands until `exit`, end of input or `cancel`.
    ///
    /// Every task is asked to stop before returning.
    pub async fn run(&mut self, simulator: &Simulator, cancel: CancellationToken) -> SimulatorResult<()> {
        let started = simulator.start_all();
        info!(started, "simulation started");

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = self.read_line() => line?,
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }

            match Command::from_str(&line) {
                Ok(Command::Exit) => break,
                Ok(command) => {
                    if let Err(err) = self.execute(simulator, &command).await {
                        warn!(%command, error = %err, "command failed");
                        self.write_line(&format!("Error: {err}")).await?;
                    }
                }
                Err(err) => self.write_line(&format!("Error: {err}")).await?,
            }
        }

        let stopping = simulator.stop_all();
        info!(stopping, "simulation exiting");
        Ok(())
    }

    async fn execute(&mut self, simulator: &Simulator, command: &Command) -> SimulatorResult<()> {
        match command {
            Command::Start(Target::All) => {
                simulator.start_all();
            }
            Command::Start(Target::Task(name)) => {
                simulator.start_task(name)?;
            }
            Command::Stop(Target::All) => {
                simulator.stop_all();
            }
            Command::Stop(Target::Task(name)) => {
                simulator.stop_task(name)?;
            }
            Command::ShowStatus => {
                let report = simulator.show_status().await?;
                self.write_line(&report.to_string()).await?;
            }
            Command::Exit => {}
        }
        Ok(())
    }
}
