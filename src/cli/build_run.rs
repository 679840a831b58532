use crate::assertions::http_client;
use crate::cli::Context;
use crate::config::Scenario;
use crate::errors::Result;
use colored::*;
use std::path::Path;

/// Build the scenario's application, run it, and poll its HTTP expectation
pub async fn run(ctx: &Context, scenario_path: &Path, skip_build: bool) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let base_dir = scenario_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let app = scenario.to_app_run(&ctx.settings, base_dir)?;
    let orchestrator = ctx.orchestrator().await?;
    let client = http_client(ctx.settings.request_timeout())?;
    let expectation = &scenario.expect;

    let assertion = |host_port: u16| {
        let client = client.clone();
        async move { expectation.check(&client, host_port).await }
    };

    let name = scenario
        .app_name
        .clone()
        .unwrap_or_else(|| scenario_path.display().to_string());
    println!("Running scenario {}...", name.cyan().bold());

    if skip_build || scenario.build.is_none() {
        orchestrator.run_and_assert(&app, assertion).await?;
    } else {
        orchestrator.build_run_and_assert(&app, assertion).await?;
    }

    println!(
        "{} {} answered {} {}",
        "✓".green(),
        name,
        expectation.status.to_string().green(),
        expectation.path.dimmed()
    );

    Ok(())
}
