//! Kibana dashboard deployment.

use crate::error::StageError;
use crate::runner::{shell_quote, CommandRunner, CommandSpec};
use logagg_common::{AggregationUnit, CancelFlag};
use logagg_config::IntegrationToolConfig;

/// Trait for deploying the dashboards of one unit.
pub trait DashboardDeployer: Send + Sync {
    fn deploy(
        &self,
        unit: &AggregationUnit,
        config: &IntegrationToolConfig,
        cancel: &CancelFlag,
    ) -> Result<(), StageError>;
}

/// Deploys dashboards by running the kibana-tools container.
pub struct DockerDashboardDeployer<'r> {
    runner: &'r dyn CommandRunner,
}

impl<'r> DockerDashboardDeployer<'r> {
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl DashboardDeployer for DockerDashboardDeployer<'_> {
    fn deploy(
        &self,
        unit: &AggregationUnit,
        config: &IntegrationToolConfig,
        cancel: &CancelFlag,
    ) -> Result<(), StageError> {
        self.runner.run(&kibana_tools_command(unit, config), cancel)?;
        Ok(())
    }
}

/// kibana-tools invocation. The label hides the Elastic password.
pub fn kibana_tools_command(unit: &AggregationUnit, config: &IntegrationToolConfig) -> CommandSpec {
    let render = |pass: &str| {
        format!(
            "docker run --rm --name {name} {image} bin/kibana-tools.sh \
             --host={host} --port={port} --user={user} --pass={pass} {unit}",
            name = shell_quote(&format!("{unit}-kibana-dashboard")),
            image = shell_quote(&config.kibana_tools_image),
            host = shell_quote(&config.kibana.host),
            port = config.kibana.port,
            user = shell_quote(&config.elastic.user),
            pass = pass,
            unit = shell_quote(unit.as_str()),
        )
    };
    CommandSpec::new(render(&shell_quote(&config.elastic.pass))).with_label(render("<redacted>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::DryRunCommandRunner;

    fn config() -> IntegrationToolConfig {
        IntegrationToolConfig::from_json_str(
            r#"{
                "kibana": {"host": "kibana", "port": 5601},
                "logstash": {"host": "logstash", "port": 5044},
                "elastic": {"host": "elastic", "port": 9200, "user": "elastic", "pass": "s3cret"},
                "filebeatImage": "fb",
                "kibanaToolsImage": "corfudb/kibana-tools:latest",
                "archives": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_command_line_and_redacted_label() {
        let unit = AggregationUnit::parse("corfu-run-42").unwrap();
        let spec = kibana_tools_command(&unit, &config());
        assert_eq!(
            spec.command,
            "docker run --rm --name corfu-run-42-kibana-dashboard \
             corfudb/kibana-tools:latest bin/kibana-tools.sh \
             --host=kibana --port=5601 --user=elastic --pass=s3cret corfu-run-42"
        );
        assert!(spec.label.contains("--pass=<redacted>"));
        assert!(!spec.label.contains("s3cret"));
    }

    #[test]
    fn test_deploy_runs_through_runner() {
        let runner = DryRunCommandRunner::new();
        let unit = AggregationUnit::parse("u1").unwrap();
        DockerDashboardDeployer::new(&runner)
            .deploy(&unit, &config(), &CancelFlag::new())
            .unwrap();
        assert_eq!(runner.commands().len(), 1);
    }
}
