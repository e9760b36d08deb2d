use std::path::Path;
use std::time::{Duration, Instant};

use console::style;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::browser::{ChromeBrowser, ChromeSettings};
use crate::container::{run_exercise, DockerCli, ExerciseRun};
use crate::errors::{GraderError, GraderInternalError};
use crate::logging::{
    log_page_test, log_project_summary, log_schedule_summary, log_skipped_tests, log_test_result,
    timing,
};
use crate::options::GraderContext;
use crate::pages::{
    load_project_test, ActionStepExecutor, Browser, ProjectTest, ProjectTestResult,
    ProjectTestRunner,
};
use crate::schedule::{
    execute_tests, load_flat_config, FlatResults, ScheduleSummary, TestGraph, UnittestRunner,
};

/// Writes a result file in one go, once every test has finished.
pub async fn write_results<T: Serialize>(path: &Path, results: &T) -> Result<(), GraderError> {
    let json = serde_json::to_string_pretty(results).map_err(GraderInternalError::Serialize)?;

    tokio::fs::write(path, json)
        .await
        .map_err(|source| GraderInternalError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(())
}

pub async fn schedule_tests(
    ctx: &GraderContext,
    config_path: &Path,
    output: &Path,
) -> Result<ScheduleSummary, GraderError> {
    let started = Instant::now();

    let config = load_flat_config(config_path).await?;
    let mut graph = TestGraph::build(&config.tests)?;

    if ctx.params.shuffle {
        match ctx.params.seed {
            Some(seed) => graph.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => graph.shuffle(&mut rand::thread_rng()),
        }
    }

    let runner = UnittestRunner {
        command_template: ctx.params.test_command.clone(),
        test_file_name: config.test_file_name.clone(),
        test_class_name: config.test_class_name.clone(),
        working_directory: None,
    };

    println!("\n{}\n", style("Running tests").bold());

    let verbose = ctx.params.verbose;
    let results = execute_tests(&mut graph, &runner, |test, result| {
        log_test_result(test, result, verbose)
    })
    .await?;

    write_results(output, &FlatResults { results }).await?;

    log_skipped_tests(&graph);
    let summary = graph.summary();
    log_schedule_summary(&summary, &timing(started.elapsed(), ctx.params.porcelain));

    Ok(summary)
}

pub async fn run_page_tests(
    ctx: &GraderContext,
    spec_path: &Path,
    output: &Path,
    base_url: Option<&str>,
    echo_spec: bool,
) -> Result<ProjectTestResult, GraderError> {
    let project = load_project_test(spec_path).await?;
    for warning in project.validate()? {
        eprintln!("{}", style(format!("⚠ {warning}")).yellow());
    }

    if echo_spec {
        let json = serde_json::to_string_pretty(&project).map_err(GraderInternalError::Serialize)?;
        println!("{json}");
    }

    let browser = ChromeBrowser::launch(&ChromeSettings {
        headless: ctx.params.headless,
        executable: ctx.params.chrome_path.clone(),
    })
    .await?;

    let outcome = run_project(ctx, &project, &browser, base_url, output).await;
    browser.shutdown().await?;

    outcome
}

/// Runs every page test of `project` in `browser` and records the results.
pub async fn run_project<B: Browser + ?Sized>(
    ctx: &GraderContext,
    project: &ProjectTest,
    browser: &B,
    base_url: Option<&str>,
    output: &Path,
) -> Result<ProjectTestResult, GraderError> {
    let started = Instant::now();

    let executor = ActionStepExecutor::new(Duration::from_millis(ctx.params.action_settle_ms));
    let mut runner = ProjectTestRunner::new(project, executor);
    if let Some(base_url) = base_url {
        runner = runner.with_base_url(base_url);
    }

    println!("\n{}\n", style("Running page tests").bold());

    let verbose = ctx.params.verbose;
    let result = runner
        .perform(browser, |name, result| log_page_test(name, result, verbose))
        .await?;

    write_results(output, &result).await?;
    log_project_summary(&result, &timing(started.elapsed(), ctx.params.porcelain));

    Ok(result)
}

pub async fn grade_exercise(
    ctx: &GraderContext,
    exercise: &str,
    build: bool,
    remove: bool,
) -> Result<ExerciseRun, GraderError> {
    let runtime = DockerCli::new(&ctx.params.runtime, &ctx.working_directory);

    println!(
        "\n{}\n",
        style(format!("Grading {exercise} in {}", ctx.params.image)).bold()
    );

    let run = run_exercise(&runtime, ctx, exercise, build, remove).await?;

    println!("{}", style("--- CONTAINER LOGS ---").on_yellow().bold());
    print!("{}", run.logs);
    println!("{}", style("--- END CONTAINER LOGS ---").on_yellow().bold());

    match run.exit_status {
        Some(0) => {}
        Some(status) => eprintln!(
            "{}",
            style(format!("Tester container exited with status {status}")).yellow()
        ),
        None => eprintln!(
            "{}",
            style(format!(
                "Tester container was killed after {} seconds",
                ctx.params.max_runtime
            ))
            .red()
        ),
    }

    Ok(run)
}
