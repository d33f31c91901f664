//! Transfer tasks: the shared attempt protocol, task lifecycle and workload variants.

mod result;
pub use result::TransferResult;

mod stats;
pub use stats::{TaskCounters, TaskStats, TaskStatus};

mod task;
pub use task::{TaskContext, TaskEnv, TaskState, TransferTask, Workload};

mod attempt;
pub use attempt::{PairDraw, Tally};

mod native;
pub use native::NativeTransfer;

mod token;
pub use token::TokenTransfer;

mod proxy;
pub use proxy::ProxyTransfer;

mod sponsor;
pub use sponsor::{SponsorNative, SponsorRange, SponsorToken};
