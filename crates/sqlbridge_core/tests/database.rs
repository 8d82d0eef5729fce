//! Database, statement iterator and host function tests.

use sqlbridge_core::{Config, Database, Error, Params, ReadOptions, ResultGroup, Row, Value};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open() -> Database {
    init_tracing();
    Database::open(None).unwrap()
}

fn query(db: &Database, sql: &str) -> Vec<ResultGroup> {
    db.exec(sql, None, ReadOptions::default()).unwrap()
}

fn engine_message(err: Error) -> String {
    match err {
        Error::Engine { message } => message,
        other => panic!("expected an engine error, got {other:?}"),
    }
}

// ---- exec / run / each ----

#[test]
fn exec_returns_one_group_per_row_producing_statement() {
    let db = open();
    let groups = query(
        &db,
        "CREATE TABLE t(a); INSERT INTO t VALUES (1); SELECT * FROM t;",
    );
    assert_eq!(
        groups,
        [ResultGroup {
            columns: vec!["a".into()],
            values: vec![vec![Value::Number(1.0)]],
        }]
    );
}

#[test]
fn exec_skips_statements_without_rows() {
    let db = open();
    let groups = query(
        &db,
        "CREATE TABLE t(a, b);
         INSERT INTO t VALUES (1, 'x'), (2, 'y');
         SELECT a FROM t WHERE a > 5;
         SELECT b, a FROM t ORDER BY a;
         SELECT 'done' AS status;",
    );
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].columns, ["b", "a"]);
    assert_eq!(
        groups[0].values,
        [
            [Value::from("x"), Value::Number(1.0)],
            [Value::from("y"), Value::Number(2.0)],
        ]
    );
    assert_eq!(groups[1].values, [[Value::from("done")]]);
}

#[test]
fn exec_binds_params_to_first_statement_only() {
    let db = open();
    let params = Params::from(vec![Value::from(5)]);
    let groups = db
        .exec("SELECT ?1 * 2; SELECT ?1;", Some(&params), ReadOptions::default())
        .unwrap();
    assert_eq!(groups[0].values, [[Value::Number(10.0)]]);
    assert_eq!(groups[1].values, [[Value::Null]]);
}

#[test]
fn exec_compile_error_surfaces_engine_message() {
    let db = open();
    let err = db
        .exec("SELECT 1; SELEC 2;", None, ReadOptions::default())
        .unwrap_err();
    assert!(engine_message(err).contains("syntax error"));
}

#[test]
fn exec_with_big_int_option() {
    let db = open();
    let groups = db
        .exec("SELECT 9007199254740993", None, ReadOptions::big_int())
        .unwrap();
    assert_eq!(groups[0].values, [[Value::BigInt(9_007_199_254_740_993)]]);
}

#[test]
fn run_without_params_executes_every_statement() {
    let db = open();
    db.run(
        "CREATE TABLE t(a); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);",
        None,
    )
    .unwrap();
    assert_eq!(query(&db, "SELECT count(*) FROM t")[0].values, [[Value::Number(2.0)]]);
}

#[test]
fn run_with_params_and_rows_modified() {
    let db = open();
    db.run("CREATE TABLE t(a, b)", None)
        .unwrap()
        .run(
            "INSERT INTO t VALUES (?, ?)",
            Some(&Params::from(vec![Value::from(1), Value::from("one")])),
        )
        .unwrap();
    assert_eq!(db.get_rows_modified().unwrap(), 1);

    db.run("INSERT INTO t SELECT a + 1, b FROM t", None).unwrap();
    db.run("UPDATE t SET b = 'x'", None).unwrap();
    assert_eq!(db.get_rows_modified().unwrap(), 2);
}

#[test]
fn run_failure_carries_engine_message() {
    let db = open();
    let err = db.run("INSERT INTO missing VALUES (1)", None).unwrap_err();
    assert!(engine_message(err).contains("no such table: missing"));
}

#[test]
fn each_visits_rows_then_calls_done() {
    let db = open();
    db.run("CREATE TABLE t(a, b); INSERT INTO t VALUES (1, 'x'), (2, 'y');", None)
        .unwrap();

    let mut rows: Vec<Row> = Vec::new();
    let mut done = false;
    db.each_with_done(
        "SELECT a, b FROM t WHERE a >= ? ORDER BY a",
        Some(&Params::from(vec![Value::from(1)])),
        ReadOptions::default(),
        |row| {
            rows.push(row);
            Ok::<_, Error>(())
        },
        || {
            done = true;
            Ok(())
        },
    )
    .unwrap();

    assert!(done);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["a"], Value::Number(2.0));
    assert_eq!(rows[1]["b"], Value::from("y"));
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), ["a", "b"]);
}

#[derive(Debug)]
enum VisitError {
    Stop,
    Db(Error),
}

impl From<Error> for VisitError {
    fn from(e: Error) -> Self {
        Self::Db(e)
    }
}

#[test]
fn each_frees_statement_when_callback_fails() {
    let db = open();
    db.run("CREATE TABLE t(a); INSERT INTO t VALUES (1), (2), (3);", None)
        .unwrap();

    let mut seen = 0;
    let result = db.each("SELECT a FROM t", None, ReadOptions::default(), |_| {
        seen += 1;
        Err(VisitError::Stop)
    });
    assert!(matches!(result, Err(VisitError::Stop)));
    assert_eq!(seen, 1);

    // A statement still reading the table would lock it.
    db.run("DROP TABLE t", None).unwrap();
}

#[test]
fn each_reports_prepare_errors_through_caller_error_type() {
    let db = open();
    let result = db.each("SELECT * FROM nope", None, ReadOptions::default(), |_| {
        Ok::<_, VisitError>(())
    });
    assert!(matches!(result, Err(VisitError::Db(Error::Engine { .. }))));
}

// ---- prepare ----

#[test]
fn prepare_nothing_fails() {
    let db = open();
    assert!(matches!(db.prepare("   ", None), Err(Error::NothingToPrepare)));
    assert!(matches!(
        db.prepare("-- only a comment", None),
        Err(Error::NothingToPrepare)
    ));
}

#[test]
fn prepare_with_params_binds_them() {
    let db = open();
    let mut stmt = db
        .prepare("SELECT ? || ?", Some(&Params::from(vec![Value::from("a"), Value::from("b")])))
        .unwrap();
    assert!(stmt.step().unwrap());
    assert_eq!(stmt.get(None, ReadOptions::default()).unwrap(), [Value::from("ab")]);
}

// ---- statement iterator ----

#[test]
fn iterator_yields_statements_in_order() {
    let db = open();
    let mut it = db.iterate_statements("SELECT 1; SELECT 2;").unwrap();

    let mut first = it.next().unwrap().unwrap();
    assert!(first.step().unwrap());
    assert_eq!(first.get(None, ReadOptions::default()).unwrap(), [Value::Number(1.0)]);
    assert_eq!(it.get_remaining_sql(), " SELECT 2;");

    let mut second = it.next().unwrap().unwrap();
    assert!(!first.is_live());
    assert!(second.step().unwrap());
    assert_eq!(second.get(None, ReadOptions::default()).unwrap(), [Value::Number(2.0)]);

    assert!(it.next().is_none());
    assert!(!second.is_live());
    assert_eq!(it.get_remaining_sql(), "");
    assert!(it.next().is_none());
}

#[test]
fn iterator_keeps_trailing_comment_as_remainder() {
    let db = open();
    let mut it = db.iterate_statements("SELECT 1; -- trailing").unwrap();
    assert!(it.next().unwrap().is_ok());
    assert!(it.next().is_none());
    assert_eq!(it.get_remaining_sql(), " -- trailing");
}

#[test]
fn iterator_captures_remainder_on_compile_error() {
    let db = open();
    let mut it = db.iterate_statements("SELECT 1; SELEC 2; SELECT 3;").unwrap();
    assert!(it.next().unwrap().is_ok());

    let err = it.next().unwrap().unwrap_err();
    assert!(engine_message(err).contains("syntax error"));
    assert_eq!(it.get_remaining_sql().trim(), "SELEC 2; SELECT 3;");
    assert!(it.next().is_none());
}

#[test]
fn iterator_fails_once_database_is_closed() {
    let db = open();
    let mut it = db.iterate_statements("SELECT 1; SELECT 2;").unwrap();
    let first = it.next().unwrap().unwrap();

    db.close().unwrap();

    assert!(!first.is_live());
    assert!(matches!(it.next(), Some(Err(Error::DatabaseClosed))));
    assert!(it.next().is_none());
}

#[test]
fn empty_text_yields_nothing() {
    let db = open();
    let mut it = db.iterate_statements("").unwrap();
    assert!(it.next().is_none());
    assert_eq!(it.get_remaining_sql(), "");
}

// ---- host functions ----

#[test]
fn host_function_result_is_returned() {
    let db = open();
    db.create_function("double", |args: &[Value]| {
        let n = args.first().and_then(Value::as_f64).ok_or("expected a number")?;
        Ok(Value::Number(n * 2.0))
    })
    .unwrap();
    assert_eq!(query(&db, "SELECT double(21)")[0].values, [[Value::Number(42.0)]]);
}

#[test]
fn host_function_sees_argument_kinds() {
    let db = open();
    db.create_function("kinds", |args: &[Value]| {
        let kinds: Vec<&str> = args
            .iter()
            .map(|v| match v {
                Value::Null => "null",
                Value::Number(_) => "number",
                Value::Text(_) => "text",
                Value::Blob(_) => "blob",
                Value::Bool(_) | Value::BigInt(_) => "other",
            })
            .collect();
        Ok(Value::Text(kinds.join(",")))
    })
    .unwrap();
    assert_eq!(
        query(&db, "SELECT kinds(1, 2.5, 'a', x'00', NULL)")[0].values,
        [[Value::from("number,number,text,blob,null")]]
    );
}

#[test]
fn host_function_result_kinds() {
    let db = open();
    db.create_function("echo", |args: &[Value]| Ok(args[0].clone()))
        .unwrap();
    db.create_function("yes", |_: &[Value]| Ok(Value::Bool(true)))
        .unwrap();
    db.create_function("big", |_: &[Value]| Ok(Value::BigInt(i64::MAX)))
        .unwrap();

    let groups = db
        .exec(
            "SELECT echo('t'), echo(x'0a0b'), echo(NULL), echo(0.25), yes(), big()",
            None,
            ReadOptions::big_int(),
        )
        .unwrap();
    assert_eq!(
        groups[0].values,
        [[
            Value::from("t"),
            Value::Blob(vec![0x0a, 0x0b]),
            Value::Null,
            Value::Number(0.25),
            Value::BigInt(1),
            Value::BigInt(i64::MAX),
        ]]
    );
}

#[test]
fn host_function_error_becomes_engine_error() {
    let db = open();
    db.create_function("fail", |_: &[Value]| Err("it broke".into()))
        .unwrap();
    let err = db
        .exec("SELECT fail()", None, ReadOptions::default())
        .unwrap_err();
    assert_eq!(engine_message(err), "it broke");

    // The database is still usable.
    assert_eq!(query(&db, "SELECT 1")[0].values, [[Value::Number(1.0)]]);
}

#[test]
fn host_function_panic_becomes_engine_error() {
    let db = open();
    db.create_function("boom", |_: &[Value]| -> sqlbridge_core::FunctionResult {
        panic!("kaboom")
    })
    .unwrap();
    let err = db
        .exec("SELECT boom()", None, ReadOptions::default())
        .unwrap_err();
    assert_eq!(engine_message(err), "kaboom");
}

#[test]
fn function_names_with_nul_are_rejected() {
    let db = open();
    let result = db.create_function("bad\0name", |_: &[Value]| Ok(Value::Null));
    assert!(matches!(result, Err(Error::InvalidString(_))));
}

// ---- extension functions ----

#[test]
fn extension_functions_are_available() {
    let db = open();
    let groups = query(
        &db,
        "SELECT reverse('abc'), proper('hello wORLD'), replicate('ab', 2),
                padl('x', 3), padr('x', 3), padc('x', 3),
                leftstr('héllo', 2), rightstr('héllo', 2), leftstr(NULL, 1)",
    );
    assert_eq!(
        groups[0].values,
        [[
            Value::from("cba"),
            Value::from("Hello World"),
            Value::from("abab"),
            Value::from("  x"),
            Value::from("x  "),
            Value::from(" x "),
            Value::from("hé"),
            Value::from("lo"),
            Value::Null,
        ]]
    );
}

#[test]
fn extension_negative_count_is_domain_error() {
    let db = open();
    let err = db
        .exec("SELECT replicate('a', -1)", None, ReadOptions::default())
        .unwrap_err();
    assert_eq!(engine_message(err), "domain error");
}

#[test]
fn oversized_extension_results_are_errors() {
    let db = open();
    for sql in [
        "SELECT replicate('ab', 9223372036854775807)",
        "SELECT replicate('ab', 600000000)",
        "SELECT padl('a', 9223372036854775807)",
        "SELECT padc('a', 9223372036854775807)",
    ] {
        let err = db.exec(sql, None, ReadOptions::default()).unwrap_err();
        assert_eq!(engine_message(err), "string or blob too big", "{sql}");
    }
    let groups = query(&db, "SELECT leftstr('abc', 9223372036854775807)");
    assert_eq!(groups[0].values, [[Value::from("abc")]]);
}

#[test]
fn charindex_and_strfilter() {
    let db = open();
    let groups = query(
        &db,
        "SELECT charindex('b', 'abcabc'), charindex('b', 'abcabc', 3),
                charindex('z', 'abc'), charindex(NULL, 'abc'),
                strfilter('abcabc', 'bc'), strfilter('abc', NULL)",
    );
    assert_eq!(
        groups[0].values,
        [[
            Value::Number(2.0),
            Value::Number(5.0),
            Value::Number(0.0),
            Value::Null,
            Value::from("bcbc"),
            Value::Null,
        ]]
    );
}

#[test]
fn statistics_aggregates() {
    let db = open();
    db.run(
        "CREATE TABLE s(x); INSERT INTO s VALUES (1), (2), (2), (3), (7), (NULL), ('n/a');",
        None,
    )
    .unwrap();
    let groups = query(
        &db,
        "SELECT mode(x), median(x), lower_quartile(x), upper_quartile(x), variance(x) FROM s",
    );
    assert_eq!(
        groups[0].values,
        [[
            Value::Number(2.0),
            Value::Number(2.0),
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(5.5),
        ]]
    );

    let groups = query(&db, "SELECT stdev(x) FROM s WHERE x IN (1, 3)");
    assert_eq!(groups[0].values, [[Value::Number(2.0_f64.sqrt())]]);

    let groups = query(&db, "SELECT median(x), variance(x), mode(x) FROM s WHERE x > 100");
    assert_eq!(groups[0].values, [[Value::Null, Value::Null, Value::Null]]);
}

#[test]
fn aggregates_work_per_group() {
    let db = open();
    db.run(
        "CREATE TABLE g(k, v); INSERT INTO g VALUES ('a', 1), ('a', 3), ('b', 10);",
        None,
    )
    .unwrap();
    let groups = query(&db, "SELECT k, median(v) FROM g GROUP BY k ORDER BY k");
    assert_eq!(
        groups[0].values,
        [
            [Value::from("a"), Value::Number(2.0)],
            [Value::from("b"), Value::Number(10.0)],
        ]
    );
}

#[test]
fn extensions_can_be_disabled() {
    init_tracing();
    let db = Database::open_with_config(Config::new().register_extensions(false), None).unwrap();
    let err = db
        .exec("SELECT reverse('abc')", None, ReadOptions::default())
        .unwrap_err();
    assert!(engine_message(err).contains("no such function"));
}

// ---- export / close ----

#[test]
fn export_then_open_reproduces_state() {
    let db = open();
    db.run(
        "CREATE TABLE t(a, b); INSERT INTO t VALUES (1, 'x'), (2, x'ff');",
        None,
    )
    .unwrap();

    let bytes = db.export().unwrap();
    assert!(!bytes.is_empty());

    let copy = Database::open(Some(&bytes)).unwrap();
    assert_eq!(
        query(&copy, "SELECT a, b FROM t ORDER BY a"),
        query(&db, "SELECT a, b FROM t ORDER BY a")
    );
    assert_ne!(copy.filename(), db.filename());
}

#[test]
fn export_frees_open_statements_and_keeps_database_usable() {
    let db = open();
    let mut stmt = db.prepare("SELECT 1", None).unwrap();
    db.export().unwrap();

    assert!(matches!(stmt.step(), Err(Error::StatementClosed)));
    assert!(db.is_open());
    assert_eq!(query(&db, "SELECT reverse('ab')")[0].values, [[Value::from("ba")]]);
}

#[test]
fn close_twice_is_a_no_op() {
    let db = open();
    db.close().unwrap();
    db.close().unwrap();
    assert!(!db.is_open());
}

#[test]
fn operations_after_close_fail() {
    let db = open();
    db.close().unwrap();

    assert!(matches!(db.prepare("SELECT 1", None), Err(Error::DatabaseClosed)));
    assert!(matches!(db.run("SELECT 1", None), Err(Error::DatabaseClosed)));
    assert!(matches!(
        db.exec("SELECT 1", None, ReadOptions::default()),
        Err(Error::DatabaseClosed)
    ));
    assert!(matches!(db.export(), Err(Error::DatabaseClosed)));
    assert!(matches!(db.get_rows_modified(), Err(Error::DatabaseClosed)));
    assert!(matches!(
        db.create_function("f", |_: &[Value]| Ok(Value::Null)),
        Err(Error::DatabaseClosed)
    ));
}

#[test]
fn close_deletes_file_in_configured_directory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_with_config(Config::new().store_dir(dir.path()), None).unwrap();
    let path = dir.path().join(db.filename());
    assert!(path.exists());

    db.close().unwrap();
    assert!(!path.exists());
}

#[test]
fn opening_garbage_bytes_fails_on_first_query() {
    init_tracing();
    let garbage = Database::open(Some(b"definitely not a database file at all")).unwrap();
    let err = garbage
        .exec("SELECT * FROM sqlite_master", None, ReadOptions::default())
        .unwrap_err();
    assert!(engine_message(err).contains("not a database"));
}

#[test]
fn handle_error_translates_status() {
    let db = open();
    db.handle_error(0).unwrap();
    assert!(matches!(db.handle_error(1), Err(Error::Engine { .. })));
}
