//! Local execution half of the agent.
//!
//! This module runs leased commands on the host and keeps an eye on the
//! host itself:
//! - **Command execution**: Spawns shell processes with a wall-clock budget
//! - **Resource watch**: Samples host CPU and memory against ceilings
//!
//! # Components
//!
//! - [`CommandExecutor`]: Runs `sh -c <command>` in its own process group,
//!   captures output and reports one result per item
//! - [`ResourceMonitor`]: Periodic host sampling; the first reading over a
//!   ceiling stops the whole agent
//!
//! # Execution Flow
//!
//! 1. The scheduler hands a work item to a batch worker
//! 2. [`CommandExecutor::execute`] spawns `sh -c <command>`
//! 3. Output is captured, escaped and size-capped
//! 4. The result lands in the shared buffer for submission
//!
//! # Security Note
//!
//! Commands are executed directly via shell without sandboxing; the agent
//! trusts its coordinator.

pub mod executor;
pub mod monitor;

pub use executor::CommandExecutor;
pub use monitor::{ResourceMonitor, ResourceSample, ResourceSampler, SystemSampler};
