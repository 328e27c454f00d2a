//! Engine process creation

use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::plan::InvocationPlan;

/// Creates the engine process for a plan
///
/// The child must have stderr piped; stdin is piped when available so the
/// engine can be asked to quit on platforms without signals.
pub trait Launcher: Send + Sync {
    fn launch(&self, plan: &InvocationPlan) -> std::io::Result<Child>;
}

/// Spawns the plan's program directly
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, plan: &InvocationPlan) -> std::io::Result<Child> {
        debug!("Spawning {}", plan.command_line());

        Command::new(plan.program())
            .args(plan.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}
