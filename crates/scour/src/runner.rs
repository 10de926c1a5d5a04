use anyhow::{Context, Result};
use scour_core::{markdown, try_sanitize, PolicyViolation, SanitizeReport};
use std::path::Path;

use crate::cli::Args;
use crate::config::Config;
use crate::file_manager::FileManager;

/// How a run ended when no I/O or configuration error occurred.
#[derive(Debug)]
pub enum Outcome {
    Sanitized(SanitizeReport),
    /// Strict mode met disallowed content; nothing was written.
    Rejected(PolicyViolation),
}

pub async fn run(args: &Args, config: &Config) -> Result<Outcome> {
    let mut policy = config.resolve_policy(args.policy.as_deref())?;
    if (args.strict || config.output.strict) && !policy.fail_closed() {
        policy = policy
            .to_builder()
            .fail_closed(true)
            .build()
            .context("Failed to enable strict mode")?;
    }

    let files = FileManager::new(config.limits.max_input_bytes);
    let input = files.read(&args.input).await?;
    let html = if args.markdown {
        markdown::to_html(&input)
    } else {
        input
    };

    let result = match try_sanitize(&html, &policy) {
        Ok(result) => result,
        Err(violation) => return Ok(Outcome::Rejected(violation)),
    };

    match &args.output {
        Some(path) => files.write_file(Path::new(path), &result.html).await?,
        None => files.write_stdout(&result.html).await?,
    }
    log::info!("Sanitized {} with {} change(s)", args.input, result.report.total());
    Ok(Outcome::Sanitized(result.report))
}

pub fn format_report(report: &SanitizeReport) -> String {
    format!(
        "elements removed: {}, elements unwrapped: {}, attributes removed: {}, attributes altered: {}, comments removed: {}",
        report.elements_removed,
        report.elements_unwrapped,
        report.attributes_removed,
        report.attributes_altered,
        report.comments_removed
    )
}

pub fn format_violation(violation: &PolicyViolation) -> String {
    let mut out = format!(
        "Rejected: {} policy violation(s)",
        violation.violations.len()
    );
    for item in &violation.violations {
        out.push_str("\n  ");
        out.push_str(&item.to_string());
    }
    out
}
