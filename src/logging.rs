use std::time::Duration;

use console::{style, StyledObject};

use crate::pages::{
    ElementConditionResult, PageConditionResult, PageTestResult, ProjectTestResult,
    TextContentResult,
};
use crate::schedule::{ScheduleSummary, TestCase, TestGraph, TestResult, TestStatus};

fn mark(passed: bool, line: String) -> StyledObject<String> {
    if passed {
        style(format!("✓ {line}")).green()
    } else {
        style(format!("✘ {line}")).red()
    }
}

fn prefix(indent: usize) -> String {
    if indent > 0 {
        format!("{: <1$}↳ ", "", indent)
    } else {
        "".to_string()
    }
}

/// Formats the trailing ` in 1.234 seconds` of a summary, or nothing when the
/// output has to be stable.
pub fn timing(elapsed: Duration, porcelain: bool) -> String {
    if porcelain {
        "".to_string()
    } else {
        format!(
            " in {}.{:03} seconds",
            elapsed.as_secs(),
            elapsed.subsec_millis()
        )
    }
}

pub fn log_test_result(test: &TestCase, result: &TestResult, verbose: bool) {
    let points = match test.max_points {
        Some(points) if result.successful => format!(" ({points}/{points})"),
        Some(points) => format!(" (0/{points})"),
        None => "".to_string(),
    };
    println!("{}", mark(result.successful, format!("{}{points}", test.name)));

    if verbose && !result.successful {
        for line in result.stderr.iter().filter(|l| !l.is_empty()) {
            println!("    {}", style(line).dim());
        }
    }
}

pub fn log_skipped_tests(graph: &TestGraph) {
    for test in graph.tests() {
        match test.status {
            TestStatus::Skipped => {
                println!("{}", style(format!("⦸ {} (skipped)", test.name)).dim())
            }
            TestStatus::Ready => {
                println!("{}", style(format!("⦸ {} (never reached)", test.name)).dim())
            }
            _ => {}
        }
    }
}

pub fn log_schedule_summary(summary: &ScheduleSummary, duration: &str) {
    println!(
        "\n{}\n{}\n{}",
        style(format!("Passing tests: {}", summary.passed)).cyan(),
        style(format!("Failing tests: {}", summary.failed)).cyan(),
        style(format!(
            "Skipped tests: {}",
            summary.skipped + summary.unreached
        ))
        .cyan(),
    );
    if summary.total_points > 0 {
        println!(
            "{}",
            style(format!(
                "Points: {}/{}",
                summary.earned_points, summary.total_points
            ))
            .cyan()
        );
    }

    if summary.failed + summary.skipped + summary.unreached > 0 {
        println!("{}", style(format!("\nSome tests failed{duration}")).red());
    } else {
        println!("{}", style(format!("\nAll tests passed{duration}")).green());
    }
}

pub fn log_page_test(name: &str, result: &PageTestResult, verbose: bool) {
    let (passed, total) = result.tally();
    println!(
        "{}",
        mark(result.is_correct(), format!("{name} ({passed}/{total})"))
    );

    if !verbose {
        return;
    }

    if !result.saved_actions_performed {
        println!("  {}", style("✘ saved actions could not be replayed").red());
    }
    log_condition_results(&result.initial_page_results, 2);
    for (i, step) in result.action_results.iter().enumerate() {
        println!(
            "{}{}",
            prefix(2),
            mark(step.action_performed, format!("action {}", i + 1))
        );
        log_condition_results(&step.post_condition_results, 4);
    }
}

pub fn log_condition_results(results: &[PageConditionResult], indent: usize) {
    for result in results {
        match result {
            PageConditionResult::Url(url) => println!(
                "{}{}",
                prefix(indent),
                mark(
                    url.is_correct(),
                    format!("url ends with {} (at {})", url.awaited, url.gotten)
                )
            ),
            PageConditionResult::Element(element) => log_element_result(element, indent),
        }
    }
}

fn log_element_result(result: &ElementConditionResult, indent: usize) {
    println!(
        "{}{}",
        prefix(indent),
        mark(
            result.is_correct(),
            format!("element found {} time(s)", result.found_elements_count)
        )
    );

    let detail = prefix(indent + 2);
    for (class_name, present) in &result.class_name_results {
        println!("{detail}{}", mark(*present, format!("class {class_name}")));
    }
    if let Some(text) = &result.text_content_result {
        println!("{detail}{}", mark(text.is_correct(), describe_text("text", text)));
    }
    for (name, attribute) in &result.attribute_results {
        println!(
            "{detail}{}",
            mark(attribute.is_correct(), describe_text(name, attribute))
        );
    }
    for child in &result.child_results {
        log_element_result(child, indent + 2);
    }
}

fn describe_text(what: &str, result: &TextContentResult) -> String {
    let modifier = result
        .modifier
        .map(|m| format!(" {m:?}"))
        .unwrap_or_default();
    match &result.gotten {
        Some(gotten) => format!("{what}{modifier} {:?}, got {gotten:?}", result.awaited),
        None => format!("{what}{modifier} {:?}, got nothing", result.awaited),
    }
}

pub fn log_project_summary(result: &ProjectTestResult, duration: &str) {
    let passing = result
        .page_test_results
        .values()
        .filter(|r| r.is_correct())
        .count();
    let failing = result.page_test_results.len() - passing;
    let (checks_passed, checks_total) = result
        .page_test_results
        .values()
        .map(PageTestResult::tally)
        .fold((0, 0), |(p, t), (rp, rt)| (p + rp, t + rt));

    println!(
        "\n{}\n{}\n{}",
        style(format!("Passing page tests: {passing}")).cyan(),
        style(format!("Failing page tests: {failing}")).cyan(),
        style(format!("Checks passed: {checks_passed}/{checks_total}")).cyan(),
    );

    if failing > 0 {
        println!("{}", style(format!("\nSome page tests failed{duration}")).red());
    } else {
        println!("{}", style(format!("\nAll page tests passed{duration}")).green());
    }
}
