//! Discovering and running test functions defined in a config

use crate::config::Config;
use crate::engine::{ScriptEngine, ScriptValue};
use crate::{CancellationToken, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Prefix that marks a top-level function as a test
pub const TEST_PREFIX: &str = "test_";

/// The result of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// The test body completed without error
    Pass,
    /// The test body raised an error
    Fail,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Pass => f.write_str("PASS"),
            TestOutcome::Fail => f.write_str("FAIL"),
        }
    }
}

/// Options for discovering and running tests.
#[derive(Debug, Clone)]
pub struct TestOptions<V> {
    vars: BTreeMap<String, V>,
    filter: Option<String>,
}

impl<V> Default for TestOptions<V> {
    fn default() -> Self {
        Self {
            vars: BTreeMap::new(),
            filter: None,
        }
    }
}

impl<V: Clone> TestOptions<V> {
    /// Run every test with an empty `ctx.vars`
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key: value` to each test's `ctx.vars`
    pub fn with_var(mut self, key: impl Into<String>, value: V) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Only run tests whose name contains `filter`
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn matches(&self, name: &str) -> bool {
        self.filter
            .as_deref()
            .map_or(true, |filter| name.contains(filter))
    }

    fn vars(&self) -> Vec<(String, V)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum TestState {
    NotRun,
    Ran {
        outcome: TestOutcome,
        duration: Duration,
        error: Option<Error>,
    },
}

/// A test case: a function in the top-level module whose name starts with
/// [`TEST_PREFIX`].
pub struct TestCase<E: ScriptEngine> {
    name: String,
    callable: E::Value,
    engine: Arc<E>,
    state: TestState,
}

impl<E: ScriptEngine> TestCase<E> {
    /// The test's function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`run`](Self::run) has completed
    pub fn has_run(&self) -> bool {
        matches!(self.state, TestState::Ran { .. })
    }

    /// Run the test with a fresh, empty `ctx.vars`.
    ///
    /// Returns the error if the test does not complete successfully.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.run_with_vars(cancel, Vec::new())
    }

    /// Run the test with `vars` injected into a fresh context
    pub fn run_with_vars(
        &mut self,
        cancel: &CancellationToken,
        vars: Vec<(String, E::Value)>,
    ) -> Result<()> {
        let ctx = self.engine.new_context(vars);

        let start = Instant::now();
        let result = self.engine.call(cancel, &self.callable, vec![ctx]);
        let duration = start.elapsed();

        let error = result.err().map(|source| Error::TestExecution {
            name: self.name.clone(),
            source: Box::new(source),
        });
        let outcome = if error.is_some() {
            TestOutcome::Fail
        } else {
            TestOutcome::Pass
        };
        self.state = TestState::Ran {
            outcome,
            duration,
            error: error.clone(),
        };

        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The outcome of the run.
    ///
    /// # Panics
    ///
    /// Panics if the test has not run yet.
    pub fn outcome(&self) -> TestOutcome {
        match &self.state {
            TestState::Ran { outcome, .. } => *outcome,
            TestState::NotRun => panic!("can't get the result of test {} before it has run", self.name),
        }
    }

    /// How long the run took.
    ///
    /// # Panics
    ///
    /// Panics if the test has not run yet.
    pub fn duration(&self) -> Duration {
        match &self.state {
            TestState::Ran { duration, .. } => *duration,
            TestState::NotRun => panic!("can't get the duration of test {} before it has run", self.name),
        }
    }

    /// The error the run produced, or `None` if it passed.
    ///
    /// # Panics
    ///
    /// Panics if the test has not run yet.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            TestState::Ran { error, .. } => error.as_ref(),
            TestState::NotRun => panic!("can't get the error of test {} before it has run", self.name),
        }
    }

    fn into_result(self) -> TestResult {
        match self.state {
            TestState::Ran {
                outcome,
                duration,
                error,
            } => TestResult {
                name: self.name,
                outcome,
                duration,
                error,
            },
            TestState::NotRun => panic!("test {} has not run", self.name),
        }
    }
}

/// The recorded result of one test in a batch run
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test function name
    pub name: String,
    /// Pass or fail
    pub outcome: TestOutcome,
    /// Wall-clock duration of the call
    pub duration: Duration,
    /// The failure, if any
    pub error: Option<Error>,
}

/// The results of running every discovered test
#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    /// One entry per test, in discovery order
    pub results: Vec<TestResult>,
    /// Human-readable failure messages, one per failing test
    pub failures: Vec<String>,
}

impl TestSummary {
    /// Number of passing tests
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome == TestOutcome::Pass)
            .count()
    }

    /// Number of failing tests
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// The aggregate error, present when at least one test failed
    pub fn error(&self) -> Option<Error> {
        if self.failures.is_empty() {
            None
        } else {
            Some(Error::TestsFailed {
                failed: self.failures.len(),
                total: self.results.len(),
            })
        }
    }
}

impl<E: ScriptEngine> Config<E> {
    /// Every test defined in the top-level module, sorted by name
    pub fn tests(&self) -> Vec<TestCase<E>> {
        self.discover_tests(|_| true)
    }

    fn discover_tests(&self, keep: impl Fn(&str) -> bool) -> Vec<TestCase<E>> {
        let mut tests: Vec<TestCase<E>> = self
            .locals()
            .iter()
            .filter(|(name, value)| {
                name.starts_with(TEST_PREFIX) && value.is_callable() && keep(name)
            })
            .map(|(name, value)| TestCase {
                name: name.clone(),
                callable: value.clone(),
                engine: self.engine().clone(),
                state: TestState::NotRun,
            })
            .collect();
        tests.sort_by(|a, b| a.name.cmp(&b.name));
        tests
    }

    /// Run every discovered test, continuing past failures.
    ///
    /// The summary lists one failure message per failing test;
    /// [`TestSummary::error`] gives the aggregate error.
    pub fn run_tests(
        &self,
        cancel: &CancellationToken,
        options: TestOptions<E::Value>,
    ) -> TestSummary {
        let mut summary = TestSummary::default();

        for mut test in self.discover_tests(|name| options.matches(name)) {
            match test.run_with_vars(cancel, options.vars()) {
                Ok(()) => info!("{} ... ok ({:?})", test.name(), test.duration()),
                Err(err) => {
                    warn!("{} ... FAILED ({:?})", test.name(), test.duration());
                    summary.failures.push(err.to_string());
                }
            }
            summary.results.push(test.into_result());
        }

        summary
    }
}
