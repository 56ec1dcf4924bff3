//! Load stage: ship each extracted server directory to Logstash with filebeat.

use super::{StageContext, Tally};
use crate::error::StageError;
use crate::runner::{shell_quote, CommandRunner, CommandSpec};
use logagg_common::AggregationUnit;
use logagg_config::{ArchiveConfig, IntegrationToolConfig};
use tracing::{info, warn};

pub fn run(ctx: &StageContext<'_>, runner: &dyn CommandRunner) -> Result<String, StageError> {
    let mut tally = Tally::default();
    for archive in &ctx.config.archives {
        ctx.check_cancelled()?;
        tally.total += 1;

        ctx.record(format!("Start to load archive: {}", archive.name));
        let spec = filebeat_command(ctx.unit, archive, ctx.config);
        match runner.run(&spec, ctx.cancel) {
            Ok(_) => info!(unit = %ctx.unit, archive = %archive.name, "filebeat loader finished"),
            Err(StageError::Cancelled) => return Err(StageError::Cancelled),
            Err(e) => {
                warn!(unit = %ctx.unit, archive = %archive.name, error = %e, "load failed");
                ctx.record(format!("Can't load data: {e}"));
                tally.failed += 1;
            }
        }
    }
    tally.finish(|n| format!("{n} archives loaded"))
}

/// One-shot filebeat container reading `/data/<unit>/<server>`.
pub fn filebeat_command(
    unit: &AggregationUnit,
    archive: &ArchiveConfig,
    config: &IntegrationToolConfig,
) -> CommandSpec {
    let args = [
        "docker run --rm".to_string(),
        format!("--name {}", shell_quote(&format!("{unit}-{}", archive.name))),
        format!("-v {}", shell_quote(&format!("{}:/data", config.docker_volume))),
        shell_quote(&config.filebeat_image),
        "filebeat -e --strict.perms=false".to_string(),
        format!("-E {}", shell_quote(&format!("fields.server={}", archive.name))),
        format!("-E {}", shell_quote(&format!("fields.aggregation_unit={unit}"))),
        format!("-E {}", shell_quote(&format!("BASE_DIR=/data/{unit}/{}", archive.name))),
        format!("-E {}", shell_quote(&format!("fields.loggers={}", config.loggers.join(", ")))),
        format!(
            "-E {}",
            shell_quote(&format!("output.logstash.hosts=[{}]", config.logstash.endpoint()))
        ),
        format!("-E {}", shell_quote(&format!("output.logstash.index={unit}"))),
        "--once run".to_string(),
    ];
    CommandSpec::new(args.join(" "))
}
