//! Task orchestration and the operator console.

mod command;
pub use command::{Command, Target};

mod orchestrator;
pub use orchestrator::{Simulator, StatusReport};

mod console;
pub use console::Console;
