//! Integration tests for loading configs and running main and tests

mod support;

use cfgscript_core::{
    load, CancellationToken, Config, Error, ExecOptions, LoadOptions, MemoryFileReader,
    ModulePath, TestOptions, TestOutcome,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{FakeEngine, FakeValue};
use tempfile::TempDir;

fn load_memory(
    engine: &Arc<FakeEngine>,
    reader: MemoryFileReader,
    filename: &str,
) -> cfgscript_core::Result<Config<FakeEngine>> {
    load(
        engine.clone(),
        &CancellationToken::new(),
        filename,
        LoadOptions::new().with_file_reader(Arc::new(reader)),
    )
}

fn run_main(config: &Config<FakeEngine>) -> cfgscript_core::Result<Vec<String>> {
    config.main(&CancellationToken::new(), ExecOptions::new())
}

#[test]
fn test_diamond_imports_execute_shared_module_once() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new()
        .with_file("main.cfg", "load b.cfg\nload c.cfg\ndef main global builtin")
        .with_file("b.cfg", "load d.cfg\nset from_b str b")
        .with_file("c.cfg", "load d.cfg\nset from_c str c")
        .with_file("d.cfg", "set shared int 42");

    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    assert_eq!(engine.executions_of("/d.cfg"), 1);
    assert_eq!(engine.executions().len(), 4);

    let tables = engine.imported("d.cfg");
    assert_eq!(tables.len(), 2);
    assert!(Arc::ptr_eq(&tables[0], &tables[1]));

    assert!(config.locals().contains_key("shared"));
    assert!(config.locals().contains_key("from_b"));
    assert!(config.locals().contains_key("from_c"));
}

#[test]
fn test_import_spellings_share_one_module() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new()
        .with_file("main.cfg", "load lib/util.cfg\nload ./lib/../lib/util.cfg")
        .with_file("lib/util.cfg", "set x int 1");

    load_memory(&engine, reader, "main.cfg").unwrap();
    assert_eq!(engine.executions_of("/lib/util.cfg"), 1);
}

#[test]
fn test_three_module_cycle() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new()
        .with_file("a.cfg", "load b.cfg")
        .with_file("b.cfg", "load c.cfg")
        .with_file("c.cfg", "load a.cfg");

    let err = load_memory(&engine, reader, "a.cfg").err().unwrap();
    match err {
        Error::Cycle { path, chain } => {
            assert_eq!(path, ModulePath::new("/a.cfg"));
            assert_eq!(
                chain,
                vec![
                    ModulePath::new("/a.cfg"),
                    ModulePath::new("/b.cfg"),
                    ModulePath::new("/c.cfg"),
                ]
            );
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
}

#[test]
fn test_self_import_is_a_cycle() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("a.cfg", "load a.cfg");

    let err = load_memory(&engine, reader, "a.cfg").err().unwrap();
    assert!(matches!(err, Error::Cycle { .. }));
    assert_eq!(engine.executions_of("/a.cfg"), 1);
}

#[test]
fn test_failed_module_is_not_retried() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new()
        .with_file("main.cfg", "try_load bad.cfg\ntry_load ./bad.cfg\nset ok int 1")
        .with_file("bad.cfg", "set x int 1\nfail broken on purpose");

    load_memory(&engine, reader, "main.cfg").unwrap();

    assert_eq!(engine.executions_of("/bad.cfg"), 1);
    let errors = engine.import_errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], errors[1]);
    assert!(errors[0].contains("[/bad.cfg:2:1] broken on purpose"));
}

#[test]
fn test_nested_errors_propagate_unchanged() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new()
        .with_file("main.cfg", "load lib.cfg")
        .with_file("lib.cfg", "fail nope");

    let err = load_memory(&engine, reader, "main.cfg").err().unwrap();
    let script = err.script_error().expect("script error");
    assert_eq!(script.message, "nope");
    assert_eq!(script.position.as_ref().unwrap().file.as_ref(), "/lib.cfg");
}

#[test]
fn test_missing_module_is_a_fetch_error() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "load missing.cfg");

    let err = load_memory(&engine, reader, "main.cfg").err().unwrap();
    match err {
        Error::Fetch { path, .. } => assert_eq!(path, ModulePath::new("/missing.cfg")),
        other => panic!("expected a fetch error, got {:?}", other),
    }
}

#[test]
fn test_invalid_module_name_is_a_resolve_error() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "load lib\\util.cfg");

    let err = load_memory(&engine, reader, "main.cfg").err().unwrap();
    assert!(matches!(err, Error::Resolve { .. }));
}

#[test]
fn test_separate_loads_do_not_share_a_cache() {
    let engine = FakeEngine::new();
    let first = MemoryFileReader::new()
        .with_file("main.cfg", "load lib.cfg")
        .with_file("lib.cfg", "set name str first");
    let second = MemoryFileReader::new()
        .with_file("main.cfg", "load lib.cfg")
        .with_file("lib.cfg", "set name str second");

    let a = load_memory(&engine, first, "main.cfg").unwrap();
    let b = load_memory(&engine, second, "main.cfg").unwrap();

    assert_eq!(engine.executions_of("/lib.cfg"), 2);
    assert!(matches!(a.locals().get("name"), Some(FakeValue::Str(s)) if s == "first"));
    assert!(matches!(b.locals().get("name"), Some(FakeValue::Str(s)) if s == "second"));
}

#[test]
fn test_concurrent_loads() {
    let engine = FakeEngine::new();

    std::thread::scope(|scope| {
        for i in 0..4 {
            let engine = engine.clone();
            scope.spawn(move || {
                let reader = MemoryFileReader::new()
                    .with_file("main.cfg", "load shared.cfg\ndef main list r:x")
                    .with_file("shared.cfg", format!("set id int {}", i));
                let config = load_memory(&engine, reader, "main.cfg").unwrap();
                assert!(matches!(config.locals().get("id"), Some(FakeValue::Int(n)) if *n == i));
                assert_eq!(run_main(&config).unwrap(), vec!["x".to_string()]);
            });
        }
    });

    assert_eq!(engine.executions_of("/shared.cfg"), 4);
}

#[test]
fn test_load_from_disk_uses_config_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("main.cfg"), "load lib/a.cfg\ndef main list r:done").unwrap();
    // Nested loads resolve against the config directory, not the importer.
    fs::write(root.join("lib/a.cfg"), "load lib/b.cfg").unwrap();
    fs::write(root.join("lib/b.cfg"), "set deep int 2").unwrap();

    let engine = FakeEngine::new();
    let filename = root.join("main.cfg");
    let filename = filename.to_str().unwrap();
    let config = load(
        engine.clone(),
        &CancellationToken::new(),
        filename,
        LoadOptions::new(),
    )
    .unwrap();

    assert_eq!(config.filename(), filename);
    assert!(config.locals().contains_key("deep"));
    assert_eq!(engine.executions()[0], filename);
    assert_eq!(run_main(&config).unwrap(), vec!["done".to_string()]);
}

#[test]
fn test_cancelled_load() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "set x int 1");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = load(
        engine.clone(),
        &cancel,
        "main.cfg",
        LoadOptions::new().with_file_reader(Arc::new(reader)),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::Cancelled));
    assert!(engine.executions().is_empty());
}

#[test]
fn test_expired_deadline_cancels_main() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main none");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    let cancel = CancellationToken::with_deadline(Instant::now() - Duration::from_millis(1));
    let err = config.main(&cancel, ExecOptions::new()).err().unwrap();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn test_globals_and_test_helpers() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main global extra");

    let config = load(
        engine.clone(),
        &CancellationToken::new(),
        "main.cfg",
        LoadOptions::new()
            .with_file_reader(Arc::new(reader))
            .with_global("extra", FakeValue::Str("injected".to_string()))
            .with_test_helpers(),
    )
    .unwrap();

    assert!(config.globals().contains_key("builtin"));
    assert!(config.globals().contains_key("assert"));
    assert_eq!(run_main(&config).unwrap(), vec!["injected".to_string()]);
}

#[test]
fn test_test_helpers_are_opt_in() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "set x int 1");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    assert!(config.globals().contains_key("builtin"));
    assert!(!config.globals().contains_key("assert"));
}

#[test]
fn test_main_returns_records_in_order() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main list r:a r:b r:c");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    assert_eq!(
        run_main(&config).unwrap(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
}

#[test]
fn test_main_returning_none_is_empty() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main none");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    assert!(run_main(&config).unwrap().is_empty());
}

#[test]
fn test_missing_main_names_the_file() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "set x int 1");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    let err = run_main(&config).err().unwrap();
    assert!(matches!(err, Error::NoMainFunction { ref filename } if filename == "main.cfg"));
    assert_eq!(err.to_string(), "no `main' function found in \"main.cfg\"");
}

#[test]
fn test_main_must_be_callable() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "set main int 3");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    let err = run_main(&config).err().unwrap();
    assert_eq!(err.to_string(), "`main' must be a function (got a int)");
}

#[test]
fn test_main_returning_non_list() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main int 3");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    match run_main(&config).err().unwrap() {
        Error::InvalidReturnShape { kind, index } => {
            assert_eq!(kind, "int");
            assert_eq!(index, None);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_main_returning_non_record_element() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main list r:a s:oops r:c");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    match run_main(&config).err().unwrap() {
        Error::InvalidReturnShape { kind, index } => {
            assert_eq!(kind, "string");
            assert_eq!(index, Some(1));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_main_sees_injected_vars() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main var env");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    let options = ExecOptions::new().with_var("env", FakeValue::Str("prod".to_string()));
    let records = config.main(&CancellationToken::new(), options).unwrap();
    assert_eq!(records, vec!["prod".to_string()]);
}

#[test]
fn test_config_is_reusable_after_failed_main() {
    let engine = FakeEngine::new();
    let reader = MemoryFileReader::new().with_file("main.cfg", "def main var env");
    let config = load_memory(&engine, reader, "main.cfg").unwrap();

    let err = run_main(&config).err().unwrap();
    let script = err.script_error().expect("script error");
    assert!(script.message.contains("missing var"));
    assert!(script.backtrace.starts_with("Traceback"));

    let options = ExecOptions::new().with_var("env", FakeValue::Str("dev".to_string()));
    let records = config.main(&CancellationToken::new(), options).unwrap();
    assert_eq!(records, vec!["dev".to_string()]);
    assert_eq!(engine.executions().len(), 1);
}

const TEST_CONFIG: &str = "\
def test_b fail expected b
def test_a none
def helper none
set test_value int 1
def test_c var env
";

fn load_tests(engine: &Arc<FakeEngine>) -> Config<FakeEngine> {
    let reader = MemoryFileReader::new().with_file("tests.cfg", TEST_CONFIG);
    load_memory(engine, reader, "tests.cfg").unwrap()
}

#[test]
fn test_discovery_is_sorted_and_skips_non_functions() {
    let engine = FakeEngine::new();
    let config = load_tests(&engine);

    let names: Vec<String> = config.tests().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["test_a", "test_b", "test_c"]);
}

#[test]
fn test_single_test_case() {
    let engine = FakeEngine::new();
    let config = load_tests(&engine);
    let cancel = CancellationToken::new();

    let mut tests = config.tests();
    assert!(!tests[0].has_run());

    tests[0].run(&cancel).unwrap();
    assert_eq!(tests[0].outcome(), TestOutcome::Pass);
    assert!(tests[0].error().is_none());

    let err = tests[1].run(&cancel).err().unwrap();
    assert!(matches!(err, Error::TestExecution { ref name, .. } if name == "test_b"));
    assert_eq!(tests[1].outcome(), TestOutcome::Fail);
    assert_eq!(
        tests[1].error().and_then(|e| e.script_error()).map(|e| e.message.as_str()),
        Some("expected b")
    );
}

#[test]
#[should_panic(expected = "before it has run")]
fn test_outcome_before_run_panics() {
    let engine = FakeEngine::new();
    let config = load_tests(&engine);
    let tests = config.tests();
    let _ = tests[0].outcome();
}

#[test]
fn test_batch_run_reports_every_failure() {
    let engine = FakeEngine::new();
    let config = load_tests(&engine);

    let summary = config.run_tests(&CancellationToken::new(), TestOptions::new());

    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.passed(), 1);
    assert_eq!(summary.failed(), 2);
    assert!(summary.failures[0].contains("test_b"));
    assert!(summary.failures[0].contains("expected b"));
    assert!(summary.failures[1].contains("test_c"));
    assert!(matches!(
        summary.error(),
        Some(Error::TestsFailed { failed: 2, total: 3 })
    ));
}

#[test]
fn test_batch_run_with_vars_and_filter() {
    let engine = FakeEngine::new();
    let config = load_tests(&engine);

    let options = TestOptions::new()
        .with_var("env", FakeValue::Str("ci".to_string()))
        .with_filter("test_c");
    let summary = config.run_tests(&CancellationToken::new(), options);

    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].name, "test_c");
    assert_eq!(summary.results[0].outcome, TestOutcome::Pass);
    assert!(summary.error().is_none());
}
