use crate::ci::{check_version_stamp, parse_version_stamp, CiContext};
use crate::cli::Context;
use crate::docker::RunArguments;
use crate::errors::{HarnessError, Result};
use colored::*;

/// Check the version stamp `oryx --version` prints inside `image`.
/// Skipped outside CI.
pub async fn run(ctx: &Context, image: &str, base_version: Option<&str>) -> Result<()> {
    let ci = CiContext::from_env();
    if !ci.is_ci() {
        println!(
            "{}",
            "Skipping version check: AGENT_OS is not set (not running on a CI agent)".yellow()
        );
        return Ok(());
    }

    let base_version = base_version
        .map(str::to_string)
        .or_else(|| ctx.settings.platform_version.clone())
        .ok_or_else(|| {
            HarnessError::Config(
                "No base version. Pass --base-version or set RUNPROBE_PLATFORM_VERSION".to_string(),
            )
        })?;

    let args = RunArguments::new(image).with_command("oryx", ["--version"]);
    let orchestrator = ctx.orchestrator().await?;
    let result = orchestrator
        .exec(&args, |result| {
            // The stamp may land on either stream depending on the image
            let output = format!("{}{}", result.stdout, result.stderr);
            check_version_stamp(&output, &ci, &base_version)
        })
        .await?;

    let output = format!("{}{}", result.stdout, result.stderr);
    match parse_version_stamp(&output) {
        Some(stamp) => println!(
            "{} {} version {} commit {}",
            "✓".green(),
            image,
            stamp.version.green(),
            stamp.commit.dimmed()
        ),
        None => println!("{} {} carries the expected stamp", "✓".green(), image),
    }

    Ok(())
}
