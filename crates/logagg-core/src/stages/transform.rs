//! Transform stage: run configured shell commands inside extracted paths.

use super::{StageContext, Tally};
use crate::error::StageError;
use crate::runner::{CommandRunner, CommandSpec};
use tracing::{debug, warn};

pub fn run(ctx: &StageContext<'_>, runner: &dyn CommandRunner) -> Result<String, StageError> {
    let data_dir = ctx.layout.data_dir(ctx.unit);
    let mut tally = Tally::default();

    for transform in &ctx.config.transform {
        let dir = data_dir.join(&transform.path);
        if !dir.exists() {
            debug!(path = %dir.display(), "transform path missing, skipping");
            ctx.record(format!("Skip transform, path not found: {}", transform.path.display()));
            continue;
        }

        for command in &transform.commands {
            ctx.check_cancelled()?;
            tally.total += 1;

            let spec = CommandSpec::new(command.as_str()).in_dir(&dir);
            ctx.record(format!("Run transform: {command}"));
            match runner.run(&spec, ctx.cancel) {
                Ok(_) => {}
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => {
                    warn!(
                        unit = %ctx.unit,
                        command = %command,
                        error = %e,
                        "transform command failed"
                    );
                    ctx.record(format!("Can't transform: {command}: {e}"));
                    tally.failed += 1;
                }
            }
        }
    }
    tally.finish(|n| format!("{n} transform commands run"))
}
