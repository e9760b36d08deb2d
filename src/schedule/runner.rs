use crate::errors::GraderInternalError;

use super::{TestCase, TestGraph, TestProcessRunner, TestResult, TestStatus};

/// Runs every reachable test in an order that respects dependencies.
///
/// Tests without dependencies seed a stack, taken from the graph's launch
/// order. A passing test pushes each dependent whose dependencies have all
/// passed; a failing test marks its transitive dependents as skipped, and
/// skipped tests are never executed. Results are returned in execution order,
/// and only executed tests have one.
///
/// `observe` is called after each test has run.
pub async fn execute_tests<R, F>(
    graph: &mut TestGraph,
    runner: &R,
    mut observe: F,
) -> Result<Vec<TestResult>, GraderInternalError>
where
    R: TestProcessRunner + ?Sized,
    F: FnMut(&TestCase, &TestResult),
{
    let mut runnable: Vec<usize> = graph
        .launch_order()
        .iter()
        .copied()
        .filter(|&test| graph.dependencies(test).is_empty())
        .collect();

    let mut results = Vec::with_capacity(graph.len());

    while let Some(current) = runnable.pop() {
        let output = runner.run_test(graph.test(current)).await?;

        let status = if output.successful {
            TestStatus::Success
        } else {
            TestStatus::Failure
        };
        graph.set_status(current, status);

        let result = TestResult::from_run(graph.test(current), output);

        if result.successful {
            for &dependent in graph.dependents(current) {
                if graph.can_run(dependent) {
                    runnable.push(dependent);
                }
            }
        } else {
            graph.skip_dependents(current);
        }

        observe(graph.test(current), &result);
        results.push(result);
    }

    Ok(results)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::super::test::case;
    use super::super::ProcessOutput;
    use super::*;

    /// Passes every test unless it is listed as failing, and records the
    /// order of invocations.
    struct ScriptedRunner {
        failing: HashSet<String>,
        invocations: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                invocations: Mutex::new(vec![]),
            }
        }

        fn invocations(&self) -> Vec<String> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TestProcessRunner for ScriptedRunner {
        async fn run_test(&self, test: &TestCase) -> Result<ProcessOutput, GraderInternalError> {
            self.invocations.lock().unwrap().push(test.name.clone());
            let successful = !self.failing.contains(&test.name);

            Ok(ProcessOutput {
                successful,
                stdout: format!("ran {}\n", test.name),
                stderr: if successful {
                    String::new()
                } else {
                    "AssertionError\n".to_string()
                },
            })
        }
    }

    struct BrokenRunner;

    #[async_trait]
    impl TestProcessRunner for BrokenRunner {
        async fn run_test(&self, _test: &TestCase) -> Result<ProcessOutput, GraderInternalError> {
            Err(GraderInternalError::Process {
                msg: "sh: not found".into(),
            })
        }
    }

    fn status_of(graph: &TestGraph, name: &str) -> TestStatus {
        graph.test(graph.index_of(name).unwrap()).status
    }

    fn names(results: &[TestResult]) -> Vec<&str> {
        results.iter().map(|r| r.test_name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_failed_root_skips_all_dependents() {
        let mut graph =
            TestGraph::build(&[case("a", &[]), case("b", &["a"]), case("c", &["a"])]).unwrap();
        let runner = ScriptedRunner::failing(&["a"]);

        let results = execute_tests(&mut graph, &runner, |_, _| {}).await.unwrap();

        assert_eq!(names(&results), vec!["a"]);
        assert!(!results[0].successful);
        assert_eq!(status_of(&graph, "a"), TestStatus::Failure);
        assert_eq!(status_of(&graph, "b"), TestStatus::Skipped);
        assert_eq!(status_of(&graph, "c"), TestStatus::Skipped);
        assert_eq!(runner.invocations(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failure_in_the_middle_of_a_chain() {
        let mut graph =
            TestGraph::build(&[case("a", &[]), case("b", &["a"]), case("c", &["b"])]).unwrap();
        let runner = ScriptedRunner::failing(&["b"]);

        let results = execute_tests(&mut graph, &runner, |_, _| {}).await.unwrap();

        assert_eq!(names(&results), vec!["a", "b"]);
        assert!(results[0].successful);
        assert!(!results[1].successful);
        assert_eq!(status_of(&graph, "c"), TestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_dependent_waits_for_every_dependency() {
        let mut graph =
            TestGraph::build(&[case("a", &[]), case("b", &[]), case("c", &["a", "b"])]).unwrap();
        let runner = ScriptedRunner::failing(&[]);

        let results = execute_tests(&mut graph, &runner, |_, _| {}).await.unwrap();

        // The stack pops the last independent test first.
        assert_eq!(names(&results), vec!["b", "a", "c"]);
        assert!(results.iter().all(|r| r.successful));
    }

    #[tokio::test]
    async fn test_one_failed_dependency_skips_a_shared_dependent() {
        let mut graph = TestGraph::build(&[
            case("a", &[]),
            case("b", &[]),
            case("c", &["a", "b"]),
            case("d", &["c"]),
        ])
        .unwrap();
        let runner = ScriptedRunner::failing(&["a"]);

        let results = execute_tests(&mut graph, &runner, |_, _| {}).await.unwrap();

        assert_eq!(names(&results), vec!["b", "a"]);
        assert_eq!(status_of(&graph, "b"), TestStatus::Success);
        assert_eq!(status_of(&graph, "c"), TestStatus::Skipped);
        assert_eq!(status_of(&graph, "d"), TestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_results_carry_ids_points_and_output() {
        let mut configs = vec![case("test_index", &[])];
        configs[0].id = Some(7);
        configs[0].max_points = Some(3);
        let mut graph = TestGraph::build(&configs).unwrap();

        let results = execute_tests(&mut graph, &ScriptedRunner::failing(&[]), |_, _| {})
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![TestResult {
                test_id: Some(7),
                max_points: Some(3),
                test_name: "test_index".into(),
                successful: true,
                stdout: vec!["ran test_index".into(), String::new()],
                stderr: vec![String::new()],
            }]
        );
    }

    #[tokio::test]
    async fn test_observer_sees_every_executed_test() {
        let mut graph =
            TestGraph::build(&[case("a", &[]), case("b", &["a"]), case("c", &[])]).unwrap();
        let mut observed = vec![];

        execute_tests(&mut graph, &ScriptedRunner::failing(&["c"]), |test, result| {
            observed.push((test.name.clone(), result.successful));
        })
        .await
        .unwrap();

        assert_eq!(
            observed,
            vec![
                ("c".to_string(), false),
                ("a".to_string(), true),
                ("b".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_failures_abort_the_run() {
        let mut graph = TestGraph::build(&[case("a", &[])]).unwrap();

        let err = execute_tests(&mut graph, &BrokenRunner, |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, GraderInternalError::Process { .. }));
    }

    /// Exercises the scheduling invariants over many shuffled launch orders
    /// of a diamond-shaped graph with a failing branch.
    #[tokio::test]
    async fn test_invariants_hold_for_shuffled_orders() {
        let configs = vec![
            case("root", &[]),
            case("left", &["root"]),
            case("right", &["root"]),
            case("join", &["left", "right"]),
            case("after_join", &["join"]),
            case("lonely", &[]),
            case("after_lonely", &["lonely"]),
        ];

        for seed in 0..32 {
            let mut graph = TestGraph::build(&configs).unwrap();
            graph.shuffle(&mut StdRng::seed_from_u64(seed));
            let runner = ScriptedRunner::failing(&["right", "lonely"]);

            let results = execute_tests(&mut graph, &runner, |_, _| {}).await.unwrap();

            assert!(graph.tests().all(|t| t.status.is_terminal()));
            assert_eq!(results.len(), runner.invocations().len());

            let executed: HashSet<&str> = names(&results).into_iter().collect();
            for test in graph.tests() {
                let ran = executed.contains(test.name.as_str());
                assert_eq!(ran, test.status != TestStatus::Skipped, "{}", test.name);
            }

            // Every executed test ran after all of its dependencies.
            let position = |name: &str| names(&results).iter().position(|n| *n == name);
            for (index, test) in graph.tests().enumerate() {
                let Some(at) = position(&test.name) else {
                    continue;
                };
                for &dependency in graph.dependencies(index) {
                    let before = position(&graph.test(dependency).name).unwrap();
                    assert!(before < at);
                }
            }

            assert_eq!(status_of(&graph, "join"), TestStatus::Skipped);
            assert_eq!(status_of(&graph, "after_join"), TestStatus::Skipped);
            assert_eq!(status_of(&graph, "after_lonely"), TestStatus::Skipped);
            assert_eq!(status_of(&graph, "left"), TestStatus::Success);
        }
    }
}
