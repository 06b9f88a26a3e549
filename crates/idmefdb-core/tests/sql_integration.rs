//! Integration tests for statement compilation and the result layer,
//! driven by a scripted in-memory backend.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use idmefdb_core::db::{Db, Format, IdentOrder, Limit};
use idmefdb_core::query::{FunctionKind, PathSelection, SelectedFlags, SelectedObject, SelectedPath};
use idmefdb_core::sql::{
    Connection, Dialect, ResultSet, RowData, Settings, Sql, SqlStatus, TimeUnit,
};
use idmefdb_core::{Error, QueryConfig};
use idmefdb_proto::{
    BrokenDownTime, Criteria, Criterion, CriterionOperator, CriterionValue, Path, Relation, Time,
    Value,
};

/// Backend state shared between the dialect, its connections and cursors.
#[derive(Default)]
struct Backend {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    statements: Vec<String>,
    fail_on: Vec<(String, Error)>,
    opens: usize,
    row_fetches: usize,
    field_fetches: usize,
    open_results: usize,
}

type Shared = Arc<Mutex<Backend>>;

struct MockDialect {
    backend: Shared,
}

impl Dialect for MockDialect {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, _settings: &Settings) -> Result<Box<dyn Connection>, Error> {
        self.backend.lock().opens += 1;
        Ok(Box::new(MockConnection {
            backend: Arc::clone(&self.backend),
        }))
    }

    fn operator_string(&self, operator: CriterionOperator) -> Option<&'static str> {
        Some(match (operator.relation(), operator.is_negated()) {
            (Relation::Equal, false) => "=",
            (Relation::Equal, true) => "!=",
            (Relation::Lesser, false) => "<",
            (Relation::LesserOrEqual, false) => "<=",
            (Relation::Greater, false) => ">",
            (Relation::GreaterOrEqual, false) => ">=",
            (Relation::Substr, false) => "LIKE",
            (Relation::Substr, true) => "NOT LIKE",
            (Relation::Regex, false) => "REGEXP",
            (Relation::Regex, true) => "NOT REGEXP",
            _ => return None,
        })
    }

    fn build_time_extract_string(
        &self,
        field: &str,
        unit: TimeUnit,
        _gmt_offset: i32,
    ) -> Result<String, Error> {
        Ok(format!("EXTRACT({} FROM {})", unit.name().to_uppercase(), field))
    }

    fn build_time_constraint_string(
        &self,
        field: &str,
        unit: TimeUnit,
        operator: CriterionOperator,
        value: i32,
        gmt_offset: i32,
    ) -> Result<String, Error> {
        let op = self
            .operator_string(operator)
            .ok_or_else(|| Error::Query("operator".into()))?;
        Ok(format!(
            "{} {} {}",
            self.build_time_extract_string(field, unit, gmt_offset)?,
            op,
            value
        ))
    }

    fn build_limit_offset_string(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            _ => String::new(),
        }
    }
}

struct MockConnection {
    backend: Shared,
}

impl Connection for MockConnection {
    fn query(&mut self, query: &str) -> Result<Option<Box<dyn ResultSet>>, Error> {
        let mut backend = self.backend.lock();
        backend.statements.push(query.to_string());

        let failure = backend
            .fail_on
            .iter()
            .position(|(prefix, _)| query.starts_with(prefix.as_str()));
        if let Some(index) = failure {
            let (_, error) = backend.fail_on.remove(index);
            return Err(error);
        }

        if !query.starts_with("SELECT") {
            return Ok(None);
        }

        backend.open_results += 1;
        Ok(Some(Box::new(MockResult {
            backend: Arc::clone(&self.backend),
            columns: backend.columns.clone(),
            rows: backend.rows.clone().into_iter(),
        })))
    }

    fn escape(&mut self, input: &str) -> Result<String, Error> {
        Ok(format!("'{}'", input.replace('\'', "''")))
    }

    fn escape_binary(&mut self, input: &[u8]) -> Result<String, Error> {
        self.escape(&String::from_utf8_lossy(input))
    }

    fn server_version(&mut self) -> Result<u64, Error> {
        Ok(1)
    }
}

struct MockResult {
    backend: Shared,
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Option<String>>>,
}

impl ResultSet for MockResult {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, column: usize) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    fn column_num(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn fetch_row(&mut self) -> Result<Option<Box<dyn RowData>>, Error> {
        self.backend.lock().row_fetches += 1;
        Ok(self.rows.next().map(|values| {
            Box::new(MockRow {
                backend: Arc::clone(&self.backend),
                values,
            }) as Box<dyn RowData>
        }))
    }
}

impl Drop for MockResult {
    fn drop(&mut self) {
        self.backend.lock().open_results -= 1;
    }
}

struct MockRow {
    backend: Shared,
    values: Vec<Option<String>>,
}

impl RowData for MockRow {
    fn fetch_field(&mut self, column: usize) -> Result<Option<Vec<u8>>, Error> {
        self.backend.lock().field_fetches += 1;
        self.values
            .get(column)
            .cloned()
            .ok_or(Error::InvalidColumnNum(column))
            .map(|value| value.map(String::into_bytes))
    }
}

struct TestContext {
    backend: Shared,
    sql: Sql,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(QueryConfig::utc())
    }

    fn with_config(config: QueryConfig) -> Self {
        let backend: Shared = Arc::default();
        let dialect = Arc::new(MockDialect {
            backend: Arc::clone(&backend),
        });
        let sql = Sql::new(dialect, Settings::new(), config).unwrap();
        Self { backend, sql }
    }

    fn db(&self) -> Db {
        Db::new(self.sql.clone(), Some("classic")).unwrap()
    }

    fn set_rows(&self, columns: &[&str], rows: &[&[Option<&str>]]) {
        let mut backend = self.backend.lock();
        backend.columns = columns.iter().map(|c| c.to_string()).collect();
        backend.rows = rows
            .iter()
            .map(|row| row.iter().map(|v| v.map(str::to_string)).collect())
            .collect();
    }

    fn fail_on(&self, prefix: &str, error: Error) {
        self.backend.lock().fail_on.push((prefix.to_string(), error));
    }

    fn statements(&self) -> Vec<String> {
        self.backend.lock().statements.clone()
    }

    fn last_statement(&self) -> String {
        self.backend
            .lock()
            .statements
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn text_criterion(p: &str, operator: CriterionOperator, value: &str) -> Criteria {
    Criterion::fixed(path(p), operator, Value::String(value.into()))
        .unwrap()
        .into()
}

fn select_paths(paths: &[&str]) -> PathSelection {
    let mut selection = PathSelection::new();
    for p in paths {
        selection.add_path(path(p), SelectedFlags::new());
    }
    selection
}

fn count_of(p: &str, flags: SelectedFlags) -> SelectedPath {
    let object =
        SelectedObject::function(FunctionKind::Count, vec![SelectedObject::path(path(p))])
            .unwrap();
    SelectedPath::new(object, flags)
}

// ============== Tests ==============

#[test]
fn test_values_query_end_to_end() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let selection = select_paths(&["alert.messageid"]);
    let criteria = text_criterion("alert.classification.text", CriterionOperator::EQUAL, "foo");

    let query = db
        .build_values_query(&selection, Some(&criteria), false, Limit::default())
        .unwrap();

    assert_eq!(
        query,
        "SELECT top_table.messageid FROM Prelude_Alert AS top_table \
         LEFT JOIN Prelude_Classification AS t0 ON (t0._message_ident=top_table._ident) \
         WHERE t0.text = 'foo'"
    );
}

#[test]
fn test_count_create_time() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.set_rows(&["count"], &[&[Some("3")]]);

    let mut selection = PathSelection::new();
    selection.add(count_of("alert.create_time", SelectedFlags::new()));

    let result = db
        .get_values(&selection, None, false, Limit::default())
        .unwrap();
    assert_eq!(
        ctx.last_statement(),
        "SELECT COUNT(t0.time) FROM Prelude_Alert AS top_table \
         LEFT JOIN Prelude_CreateTime AS t0 ON (t0._parent_type='A' AND t0._message_ident=top_table._ident)"
    );

    let row = result.next_values().unwrap().unwrap();
    assert_eq!(row, vec![Some(Value::UInt64(3))]);
    assert!(result.next_values().unwrap().is_none());
}

#[test]
fn test_create_time_occupies_three_columns() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.set_rows(
        &["time", "gmtoff", "usec", "text"],
        &[&[Some("2024-03-01 12:30:00"), Some("3600"), Some("42"), Some("foo")]],
    );

    let selection = select_paths(&["alert.create_time", "alert.classification.text"]);
    assert_eq!(selection.get(1).unwrap().position(), 3);

    let mut result = db
        .get_values(&selection, None, false, Limit::new(Some(10), None))
        .unwrap();
    assert_eq!(
        ctx.last_statement(),
        "SELECT t0.time, t0.gmtoff, t0.usec, t1.text FROM Prelude_Alert AS top_table \
         LEFT JOIN Prelude_CreateTime AS t0 ON (t0._parent_type='A' AND t0._message_ident=top_table._ident) \
         LEFT JOIN Prelude_Classification AS t1 ON (t1._message_ident=top_table._ident) LIMIT 10"
    );

    let row = result.next().unwrap().unwrap();
    let expected = Time::from_secs(1_709_296_200)
        .with_usec(42)
        .with_gmt_offset(3600);
    assert_eq!(
        row,
        vec![Some(Value::Time(expected)), Some(Value::String("foo".into()))]
    );
}

#[test]
fn test_null_values_decode_to_none() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.set_rows(&["text"], &[&[None]]);

    let result = db
        .get_values(&select_paths(&["alert.classification.text"]), None, false, Limit::default())
        .unwrap();
    assert_eq!(result.next_values().unwrap().unwrap(), vec![None]);
}

#[test]
fn test_group_and_order_modifiers() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let mut selection = PathSelection::new();
    selection.add_path(path("alert.classification.text"), SelectedFlags::new().group_by());
    selection.add(count_of("alert.messageid", SelectedFlags::new().order_desc()));

    let query = db
        .build_values_query(&selection, None, true, Limit::default())
        .unwrap();
    assert_eq!(
        query,
        "SELECT DISTINCT t0.text, COUNT(top_table.messageid) FROM Prelude_Alert AS top_table \
         LEFT JOIN Prelude_Classification AS t0 ON (t0._message_ident=top_table._ident) \
         GROUP BY 1 ORDER BY 2 DESC"
    );
}

#[test]
fn test_function_aliases() {
    let ctx = TestContext::with_config(QueryConfig::utc().with_alias_functions(true));
    let db = ctx.db();

    let mut selection = select_paths(&["alert.create_time"]);
    selection.add(count_of("alert.messageid", SelectedFlags::new()));
    selection.add(count_of("alert.classification.text", SelectedFlags::new()));

    let query = db
        .build_values_query(&selection, None, false, Limit::default())
        .unwrap();
    // the time spans three columns, aliases count functions only
    assert!(
        query.contains("COUNT(top_table.messageid) AS FUNC0, COUNT(t1.text) AS FUNC1 FROM"),
        "{}",
        query
    );
}

#[test]
fn test_extract_uses_dialect() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let object = SelectedObject::function(
        FunctionKind::Extract,
        vec![
            SelectedObject::path(path("alert.create_time")),
            SelectedObject::Int(i64::from(TimeUnit::Hour.code())),
        ],
    )
    .unwrap();
    let mut selection = PathSelection::new();
    selection.add(SelectedPath::new(object, SelectedFlags::new().group_by()));

    let query = db
        .build_values_query(&selection, None, false, Limit::default())
        .unwrap();
    assert!(query.starts_with("SELECT EXTRACT(HOUR FROM t0.time) FROM"));
    assert!(query.ends_with(" GROUP BY 1"));
}

#[test]
fn test_unsupported_interval_is_reported() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let object = SelectedObject::function(
        FunctionKind::Interval,
        vec![
            SelectedObject::path(path("alert.create_time")),
            SelectedObject::Int(1),
            SelectedObject::Int(i64::from(TimeUnit::Hour.code())),
        ],
    )
    .unwrap();
    let mut selection = PathSelection::new();
    selection.add(SelectedPath::new(object, SelectedFlags::new()));

    let err = db
        .build_values_query(&selection, None, false, Limit::default())
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn test_criteria_connectives() {
    let ctx = TestContext::new();
    let db = ctx.db();
    let selection = select_paths(&["alert.messageid"]);

    let a = text_criterion("alert.classification.text", CriterionOperator::EQUAL, "a");
    let b = text_criterion("alert.analyzer(0).name", CriterionOperator::EQUAL, "b");
    let c = text_criterion("alert.messageid", CriterionOperator::EQUAL, "c");

    let where_of = |criteria: Criteria| {
        let query = db
            .build_values_query(&selection, Some(&criteria), false, Limit::default())
            .unwrap();
        query.split(" WHERE ").nth(1).unwrap().to_string()
    };

    assert_eq!(
        where_of(a.clone().and(b.clone())),
        "t0.text = 'a' AND t1.name = 'b'"
    );
    assert_eq!(
        where_of(a.clone().or(b.clone())),
        "(t0.text = 'a') OR (t1.name = 'b')"
    );
    assert_eq!(where_of(a.clone().not()), "NOT(t0.text = 'a')");
    assert_eq!(
        where_of(a.clone().not().and(c.clone())),
        "NOT(t0.text = 'a') AND top_table.messageid = 'c'"
    );
    assert_eq!(
        where_of(a.or(b).and(c)),
        "((t0.text = 'a') OR (t1.name = 'b')) AND top_table.messageid = 'c'"
    );
}

#[test]
fn test_negated_operator_matches_null() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let criteria = text_criterion("alert.classification.text", CriterionOperator::NOT_EQUAL, "foo");
    let query = db
        .build_values_query(&select_paths(&["alert.messageid"]), Some(&criteria), false, Limit::default())
        .unwrap();
    assert!(query.ends_with(" WHERE (t0.text IS NULL OR t0.text != 'foo')"));
}

#[test]
fn test_null_checks_and_escaping() {
    let ctx = TestContext::new();
    let db = ctx.db();
    let selection = select_paths(&["alert.messageid"]);

    let criteria: Criteria = Criterion::null_check(path("alert.classification.text"), false).into();
    let query = db
        .build_values_query(&selection, Some(&criteria), false, Limit::default())
        .unwrap();
    assert!(query.ends_with(" WHERE t0.text IS NOT NULL"));

    let criteria = text_criterion("alert.classification.text", CriterionOperator::SUBSTR, "*O'Brien*");
    let query = db
        .build_values_query(&selection, Some(&criteria), false, Limit::default())
        .unwrap();
    assert!(query.ends_with(" WHERE t0.text LIKE '%O''Brien%'"));
}

#[test]
fn test_broken_down_time_criteria() {
    let ctx = TestContext::new();
    let db = ctx.db();
    let selection = select_paths(&["alert.messageid"]);

    let time_criterion = |operator, text: &str| -> Criteria {
        Criterion::new(
            path("alert.create_time"),
            operator,
            Some(CriterionValue::BrokenDownTime(BrokenDownTime::parse(text).unwrap())),
        )
        .unwrap()
        .into()
    };

    let where_of = |criteria: Criteria| {
        let query = db
            .build_values_query(&selection, Some(&criteria), false, Limit::default())
            .unwrap();
        query.split(" WHERE ").nth(1).unwrap().to_string()
    };

    assert_eq!(
        where_of(time_criterion(CriterionOperator::EQUAL, "year:2024 month:3")),
        "EXTRACT(YEAR FROM t0.time) = 2024 AND EXTRACT(MONTH FROM t0.time) = 3"
    );
    assert_eq!(
        where_of(time_criterion(CriterionOperator::GREATER, "year:2024")),
        "t0.time >= '2025-01-01 00:00:00'"
    );
    assert_eq!(
        where_of(time_criterion(CriterionOperator::LESSER, "year:2024")),
        "t0.time < '2024-01-01 00:00:00'"
    );
    assert_eq!(
        where_of(time_criterion(CriterionOperator::GREATER_OR_EQUAL, "hour:10")),
        "EXTRACT(HOUR FROM t0.time) * 3600 + EXTRACT(MIN FROM t0.time) * 60 + EXTRACT(SEC FROM t0.time) >= 36000"
    );

    // hand-built components bypass the parse range checks
    let overflowing: Criteria = Criterion::new(
        path("alert.create_time"),
        CriterionOperator::GREATER,
        Some(CriterionValue::BrokenDownTime(BrokenDownTime {
            hour: Some(i32::MAX),
            ..Default::default()
        })),
    )
    .unwrap()
    .into();
    let err = db
        .build_values_query(&selection, Some(&overflowing), false, Limit::default())
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn test_fixed_time_criterion() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let criteria: Criteria = Criterion::fixed(
        path("alert.detect_time"),
        CriterionOperator::GREATER,
        Value::Time(Time::from_secs(1_709_296_200)),
    )
    .unwrap()
    .into();
    let query = db
        .build_values_query(&select_paths(&["alert.messageid"]), Some(&criteria), false, Limit::default())
        .unwrap();
    assert!(query.contains("LEFT JOIN Prelude_DetectTime AS t0 ON (t0._message_ident=top_table._ident)"));
    assert!(query.ends_with(" WHERE t0.time > '2024-03-01 12:30:00'"));
}

#[test]
fn test_mixed_message_classes_are_rejected() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let criteria = text_criterion("heartbeat.analyzer(0).name", CriterionOperator::EQUAL, "x");
    let err = db
        .get_alert_idents(Some(&criteria), Limit::default(), IdentOrder::Unordered)
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingTopTable { .. }));
}

#[test]
fn test_alert_idents() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.set_rows(&["_ident", "time"], &[&[Some("7"), None], &[Some("3"), None]]);

    let result = db
        .get_alert_idents(None, Limit::new(Some(10), Some(5)), IdentOrder::CreateTimeDesc)
        .unwrap();
    assert_eq!(
        ctx.last_statement(),
        "SELECT DISTINCT(top_table._ident), t0.time FROM Prelude_Alert AS top_table \
         LEFT JOIN Prelude_CreateTime AS t0 ON (t0._parent_type='A' AND t0._message_ident=top_table._ident) \
         ORDER BY t0.time DESC LIMIT 10 OFFSET 5"
    );

    assert_eq!(result.get(1).unwrap(), Some(3));
    let idents: Vec<u64> = result.collect::<Result<_, _>>().unwrap();
    assert_eq!(idents, vec![7, 3]);
}

#[test]
fn test_heartbeat_idents_without_criteria() {
    let ctx = TestContext::new();
    let db = ctx.db();

    let result = db
        .get_heartbeat_idents(None, Limit::default(), IdentOrder::Unordered)
        .unwrap();
    assert_eq!(
        ctx.last_statement(),
        "SELECT DISTINCT(top_table._ident) FROM Prelude_Heartbeat AS top_table"
    );
    assert_eq!(result.count(), 0);
}

#[test]
fn test_format_autodetect() {
    let ctx = TestContext::new();
    ctx.set_rows(&["name"], &[&[Some("classic")]]);

    let db = Db::new(ctx.sql.clone(), None).unwrap();
    assert_eq!(db.format(), Format::Classic);
    assert_eq!(ctx.last_statement(), "SELECT name FROM _format");

    ctx.set_rows(&["name"], &[&[Some("other")]]);
    let err = Db::new(ctx.sql.clone(), None).unwrap_err();
    assert!(matches!(err, Error::UnknownFormat(_)));
}

#[test]
fn test_row_fetch_is_idempotent() {
    let ctx = TestContext::new();
    ctx.set_rows(&["a", "b"], &[&[Some("1"), None], &[Some("2"), Some("x")]]);

    let table = ctx.sql.query("SELECT a, b FROM t").unwrap().unwrap();
    let first = table.get_row(0).unwrap().unwrap();
    let again = table.get_row(0).unwrap().unwrap();
    assert_eq!(first.index(), again.index());
    assert_eq!(ctx.backend.lock().row_fetches, 1);

    assert_eq!(first.fetch_field(0).unwrap().unwrap().to_u32().unwrap(), 1);
    assert_eq!(again.fetch_field(0).unwrap().unwrap().as_str().unwrap(), "1");
    assert!(first.fetch_field(1).unwrap().is_none());
    assert!(again.fetch_field(1).unwrap().is_none());
    assert_eq!(ctx.backend.lock().field_fetches, 2);

    assert!(matches!(first.fetch_field(2), Err(Error::InvalidColumnNum(2))));
}

#[test]
fn test_random_row_access_fetches_once() {
    let ctx = TestContext::new();
    ctx.set_rows(
        &["a"],
        &[&[Some("0")], &[Some("1")], &[Some("2")], &[Some("3")], &[Some("4")]],
    );

    let table = ctx.sql.query("SELECT a FROM t").unwrap().unwrap();
    let fourth = table.get_row(3).unwrap().unwrap();
    assert_eq!(ctx.backend.lock().row_fetches, 4);
    let again = table.get_row(3).unwrap().unwrap();
    assert_eq!(ctx.backend.lock().row_fetches, 4);
    assert_eq!(fourth.index(), again.index());

    let second = table.get_row(1).unwrap().unwrap();
    assert_eq!(ctx.backend.lock().row_fetches, 4);
    assert_eq!(second.fetch_field(0).unwrap().unwrap().as_str().unwrap(), "1");
    assert_eq!(fourth.fetch_field(0).unwrap().unwrap().as_str().unwrap(), "3");
}

#[test]
fn test_row_bounds() {
    let ctx = TestContext::new();
    ctx.set_rows(&["a"], &[&[Some("1")], &[Some("2")]]);

    let table = ctx.sql.query("SELECT a FROM t").unwrap().unwrap();
    assert!(table.get_row(2).unwrap().is_none());
    assert!(matches!(table.get_row(3), Err(Error::OutOfRange(3))));
    assert_eq!(table.row_count().unwrap(), 2);

    let names: Vec<String> = (0..table.column_count())
        .map(|c| table.column_name(c).unwrap())
        .collect();
    assert_eq!(names, vec!["a"]);
    assert_eq!(table.column_num("a").unwrap(), 0);
    assert!(matches!(table.column_num("z"), Err(Error::InvalidColumnName(_))));
}

#[test]
fn test_sequential_fetch() {
    let ctx = TestContext::new();
    ctx.set_rows(&["a"], &[&[Some("1")], &[Some("2")]]);

    let table = ctx.sql.query("SELECT a FROM t").unwrap().unwrap();
    let mut seen = Vec::new();
    while let Some(row) = table.fetch_row().unwrap() {
        seen.push(row.fetch_field_by_name("a").unwrap().unwrap().to_string());
    }
    assert_eq!(seen, vec!["1", "2"]);
}

#[test]
fn test_rows_keep_table_alive() {
    let ctx = TestContext::new();
    ctx.set_rows(&["a"], &[&[Some("1")]]);

    let table = ctx.sql.query("SELECT a FROM t").unwrap().unwrap();
    assert_eq!(table.ref_count(), 1);

    let row = table.get_row(0).unwrap().unwrap();
    let same = table.get_row(0).unwrap().unwrap();
    assert_eq!(table.ref_count(), 2);

    drop(same);
    assert_eq!(table.ref_count(), 2);
    drop(row);
    assert_eq!(table.ref_count(), 1);

    let field = table.get_row(0).unwrap().unwrap().fetch_field(0).unwrap().unwrap();
    drop(table);
    assert_eq!(ctx.backend.lock().open_results, 1);
    assert_eq!(field.as_str().unwrap(), "1");

    drop(field);
    assert_eq!(ctx.backend.lock().open_results, 0);
}

#[test]
fn test_shared_row_outlives_table() {
    let ctx = TestContext::new();
    ctx.set_rows(&["a"], &[&[Some("1")]]);

    let table = ctx.sql.query("SELECT a FROM t").unwrap().unwrap();
    let row = table.get_row(0).unwrap().unwrap();
    let same = table.get_row(0).unwrap().unwrap();

    drop(table);
    assert_eq!(ctx.backend.lock().open_results, 1);

    drop(same);
    assert_eq!(ctx.backend.lock().open_results, 1);

    assert_eq!(row.fetch_field(0).unwrap().unwrap().as_str().unwrap(), "1");
    drop(row);
    assert_eq!(ctx.backend.lock().open_results, 0);
}

#[test]
fn test_transaction_states() {
    let ctx = TestContext::new();

    assert_eq!(ctx.sql.status(), SqlStatus::Disconnected);
    assert!(matches!(ctx.sql.transaction_end(), Err(Error::NotInTransaction)));

    ctx.sql.transaction_start().unwrap();
    assert_eq!(ctx.sql.status(), SqlStatus::Transaction);
    assert!(matches!(ctx.sql.transaction_start(), Err(Error::AlreadyInTransaction)));

    ctx.sql.transaction_end().unwrap();
    assert_eq!(ctx.sql.status(), SqlStatus::Connected);
    assert!(matches!(ctx.sql.transaction_abort(), Err(Error::NotInTransaction)));

    assert_eq!(ctx.statements(), vec!["BEGIN", "COMMIT"]);
}

#[test]
fn test_internal_transactions() {
    let ctx = TestContext::with_config(QueryConfig::utc().with_internal_transactions(true));

    ctx.sql.query("DELETE FROM Prelude_Alert WHERE _ident = 1").unwrap();
    ctx.sql.query("SELECT 1").unwrap();

    assert_eq!(
        ctx.statements(),
        vec!["BEGIN", "DELETE FROM Prelude_Alert WHERE _ident = 1", "COMMIT", "SELECT 1"]
    );
}

#[test]
fn test_delete_alert() {
    let ctx = TestContext::new();
    let db = ctx.db();

    db.delete_alert(5).unwrap();

    let statements = ctx.statements();
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
    assert_eq!(statements.len(), 37);
    assert!(statements.contains(&"DELETE FROM Prelude_Alert WHERE _ident = 5".to_string()));
    assert!(statements.contains(
        &"DELETE FROM Prelude_Node WHERE _message_ident = 5 AND _parent_type != 'H'".to_string()
    ));
    assert_eq!(ctx.sql.status(), SqlStatus::Connected);
}

#[test]
fn test_delete_heartbeats() {
    let ctx = TestContext::new();
    let db = ctx.db();

    assert_eq!(db.delete_heartbeats(&[]).unwrap(), 0);
    assert!(ctx.statements().is_empty());

    assert_eq!(db.delete_heartbeats(&[1, 2]).unwrap(), 2);
    assert!(ctx
        .statements()
        .contains(&"DELETE FROM Prelude_Heartbeat WHERE _ident IN (1, 2)".to_string()));
}

#[test]
fn test_delete_failure_rolls_back() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.fail_on("DELETE FROM Prelude_Alert ", Error::Query("locked".into()));

    let err = db.delete_alert(1).unwrap_err();
    assert!(matches!(err, Error::Query(ref msg) if msg == "locked"));
    assert_eq!(ctx.last_statement(), "ROLLBACK");
    assert_eq!(ctx.sql.status(), SqlStatus::Connected);
}

#[test]
fn test_failed_rollback_keeps_cause() {
    let ctx = TestContext::new();
    let db = ctx.db();
    ctx.fail_on("DELETE FROM Prelude_Alert ", Error::Query("locked".into()));
    ctx.fail_on("ROLLBACK", Error::Query("rollback refused".into()));

    match db.delete_alert(1).unwrap_err() {
        Error::AbortFailed { cause, rollback } => {
            assert!(matches!(*cause, Error::Query(ref msg) if msg == "locked"));
            assert!(matches!(*rollback, Error::Query(ref msg) if msg == "rollback refused"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_connection_loss_reconnects() {
    let ctx = TestContext::new();
    ctx.fail_on("SELECT broken", Error::Connection("gone".into()));

    ctx.sql.query("SELECT 1").unwrap();
    assert_eq!(ctx.sql.status(), SqlStatus::Connected);

    assert!(ctx.sql.query("SELECT broken").is_err());
    assert_eq!(ctx.sql.status(), SqlStatus::Disconnected);

    ctx.sql.query("SELECT 2").unwrap();
    assert_eq!(ctx.sql.status(), SqlStatus::Connected);
    assert_eq!(ctx.backend.lock().opens, 2);
}

#[test]
fn test_query_log_file() {
    let ctx = TestContext::new();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("queries.log");

    ctx.sql.enable_query_logging(&log).unwrap();
    ctx.sql.query("SELECT 1").unwrap();
    ctx.sql.disable_query_logging();
    ctx.sql.query("SELECT 2").unwrap();

    let content = std::fs::read_to_string(&log).unwrap();
    assert_eq!(content, "SELECT 1\n");
}

#[test]
fn test_escape_null_and_quotes() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sql.escape(None).unwrap(), "NULL");
    assert_eq!(ctx.sql.escape(Some("it's")).unwrap(), "'it''s'");
}
