use std::path::Path;

use anyhow::Context;
use console::style;

use pagegrade::commands::{grade_exercise, run_page_tests, schedule_tests};
use pagegrade::errors::GraderError;
use pagegrade::logging::{log_page_test, log_project_summary, log_test_result};
use pagegrade::options::{configure, GraderCommand, GraderContext};
use pagegrade::pages::ProjectTestResult;
use pagegrade::schedule::{FlatResults, TestCase, TestStatus};

#[tokio::main]
async fn main() {
    let (ctx, command) = match configure() {
        Ok(configured) => configured,
        Err(e) => {
            eprintln!("{}", style(&e).red());
            std::process::exit(GraderError::from(e).exit_code());
        }
    };

    if let Err(e) = dispatch(&ctx, command).await {
        eprintln!("{}", style(&e).red());
        std::process::exit(e.exit_code());
    }
}

async fn dispatch(ctx: &GraderContext, command: GraderCommand) -> Result<(), GraderError> {
    match command {
        GraderCommand::Run {
            exercise,
            build,
            remove,
        } => {
            let run = grade_exercise(ctx, &exercise, build, remove).await?;
            if let Err(e) = summarize_result_file(&run.result_file, ctx.params.verbose) {
                eprintln!("{}", style(format!("{e:#}")).red());
            }
        }
        GraderCommand::Schedule { config, output } => {
            schedule_tests(ctx, &config, &output).await?;
        }
        GraderCommand::Pages {
            spec,
            output,
            base_url,
            echo_spec,
        } => {
            run_page_tests(ctx, &spec, &output, base_url.as_deref(), echo_spec).await?;
        }
    }

    Ok(())
}

/// Reports what the tester container left in its result file.
fn summarize_result_file(path: &Path, verbose: bool) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    if contents.trim().is_empty() {
        anyhow::bail!("the tester container wrote no results to {}", path.display());
    }

    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid json", path.display()))?;

    println!("\n{}\n", style("Results").bold());

    if value.get("pageTestResults").is_some() {
        let results: ProjectTestResult = serde_json::from_value(value)
            .with_context(|| format!("{} holds malformed page test results", path.display()))?;
        for (name, result) in &results.page_test_results {
            log_page_test(name, result, verbose);
        }
        log_project_summary(&results, "");
    } else {
        let results: FlatResults = serde_json::from_value(value)
            .with_context(|| format!("{} holds malformed test results", path.display()))?;
        for result in &results.results {
            let test = TestCase {
                id: result.test_id,
                name: result.test_name.clone(),
                max_points: result.max_points,
                status: if result.successful {
                    TestStatus::Success
                } else {
                    TestStatus::Failure
                },
            };
            log_test_result(&test, result, verbose);
        }
        let passed = results.results.iter().filter(|r| r.successful).count();
        println!(
            "\n{}\n{}",
            style(format!("Passing tests: {passed}")).cyan(),
            style(format!("Failing tests: {}", results.results.len() - passed)).cyan()
        );
    }

    Ok(())
}
