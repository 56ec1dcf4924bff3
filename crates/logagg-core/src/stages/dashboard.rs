//! Dashboard deploy stage.

use super::StageContext;
use crate::dashboard::DashboardDeployer;
use crate::error::StageError;

pub fn run(ctx: &StageContext<'_>, deployer: &dyn DashboardDeployer) -> Result<String, StageError> {
    ctx.check_cancelled()?;
    deployer.deploy(ctx.unit, ctx.config, ctx.cancel)?;
    Ok(format!("dashboards deployed for {}", ctx.unit))
}
