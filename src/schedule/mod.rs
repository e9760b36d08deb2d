//! Flat, process-backed tests that declare dependencies on one another.
//!
//! Tests are stored in an arena ([`TestGraph`]) and referenced by index. The
//! dependency and dependent edges are kept as two adjacency lists that are
//! built in a single pass once every test has been loaded, so a test may
//! depend on tests declared after it.

use std::collections::{HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::GraderInputError;

pub use config::{load_flat_config, FlatTestConfig, TestCaseConfig};
pub use process::{ProcessOutput, TestProcessRunner, UnittestRunner};
pub use runner::execute_tests;

mod config;
mod process;
mod runner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Ready,
    Success,
    Failure,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::Ready)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: Option<u64>,
    pub name: String,
    pub max_points: Option<u32>,
    pub status: TestStatus,
}

/// The record of one executed test. Skipped tests never produce one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    pub test_name: String,
    pub successful: bool,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl TestResult {
    fn from_run(test: &TestCase, output: ProcessOutput) -> Self {
        Self {
            test_id: test.id,
            max_points: test.max_points,
            test_name: test.name.clone(),
            successful: output.successful,
            stdout: split_lines(&output.stdout),
            stderr: split_lines(&output.stderr),
        }
    }
}

/// Captured streams are reported line by line, trailing empty line included.
fn split_lines(s: &str) -> Vec<String> {
    s.split('\n').map(ToString::to_string).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FlatResults {
    pub results: Vec<TestResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unreached: usize,
    pub earned_points: u64,
    pub total_points: u64,
}

#[derive(Debug)]
pub struct TestGraph {
    tests: Vec<TestCase>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    launch_order: Vec<usize>,
}

impl TestGraph {
    pub fn build(configs: &[TestCaseConfig]) -> Result<Self, GraderInputError> {
        let mut tests = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());

        for config in configs {
            if index.contains_key(&config.test_name) {
                return Err(GraderInputError::DuplicateTest {
                    name: config.test_name.clone(),
                });
            }
            index.insert(config.test_name.clone(), tests.len());
            tests.push(TestCase {
                id: config.id,
                name: config.test_name.clone(),
                max_points: config.max_points,
                status: TestStatus::Ready,
            });
        }

        let mut dependencies = vec![Vec::new(); tests.len()];
        let mut dependents = vec![Vec::new(); tests.len()];

        for (test, config) in configs.iter().enumerate() {
            for name in config.dependencies.iter().flatten() {
                let Some(&dependency) = index.get(name) else {
                    return Err(GraderInputError::UnknownDependency {
                        test: config.test_name.clone(),
                        dependency: name.clone(),
                    });
                };

                if dependencies[test].contains(&dependency) {
                    continue;
                }
                dependencies[test].push(dependency);
                dependents[dependency].push(test);
            }
        }

        let graph = Self {
            launch_order: (0..tests.len()).collect(),
            tests,
            index,
            dependencies,
            dependents,
        };
        graph.ensure_acyclic()?;

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn test(&self, index: usize) -> &TestCase {
        &self.tests[index]
    }

    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    pub fn launch_order(&self) -> &[usize] {
        &self.launch_order
    }

    /// Randomizes which of the independent tests is picked up first.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.launch_order.shuffle(rng);
    }

    pub fn summary(&self) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();

        for test in &self.tests {
            let points = u64::from(test.max_points.unwrap_or_default());
            summary.total_points += points;
            match test.status {
                TestStatus::Success => {
                    summary.passed += 1;
                    summary.earned_points += points;
                }
                TestStatus::Failure => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
                TestStatus::Ready => summary.unreached += 1,
            }
        }

        summary
    }

    fn set_status(&mut self, index: usize, status: TestStatus) {
        self.tests[index].status = status;
    }

    fn can_run(&self, index: usize) -> bool {
        self.tests[index].status != TestStatus::Skipped
            && self.dependencies[index]
                .iter()
                .all(|&d| self.tests[d].status == TestStatus::Success)
    }

    /// Marks every transitive dependent of `index` as skipped.
    fn skip_dependents(&mut self, index: usize) {
        let mut pending: Vec<usize> = self.dependents[index].clone();

        while let Some(current) = pending.pop() {
            if self.tests[current].status == TestStatus::Skipped {
                continue;
            }
            self.tests[current].status = TestStatus::Skipped;
            pending.extend(self.dependents[current].iter().copied());
        }
    }

    fn ensure_acyclic(&self) -> Result<(), GraderInputError> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..self.tests.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut visited = 0;

        while let Some(current) = ready.pop_front() {
            visited += 1;
            for &dependent in &self.dependents[current] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if visited == self.tests.len() {
            return Ok(());
        }

        Err(GraderInputError::DependencyCycle {
            tests: (0..self.tests.len())
                .filter(|&i| remaining[i] > 0)
                .map(|i| self.tests[i].name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}
