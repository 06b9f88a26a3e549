//! End-to-end tests against an on-disk SQLite database holding a small
//! classic-format fixture.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use idmefdb_core::{
    Db, DialectRegistry, Error, IdentOrder, Limit, QueryConfig, Settings, Sql, SqlStatus,
};
use idmefdb_lang::{criteria_from_str, selection_from_strs};
use idmefdb_proto::{Time, Value};
use idmefdb_sqlite::SqliteDialect;

const SCHEMA: &str = r#"
CREATE TABLE _format (name TEXT, version TEXT);
INSERT INTO _format VALUES ('classic', '14.7');

CREATE TABLE Prelude_Alert (_ident INTEGER PRIMARY KEY, messageid TEXT);
CREATE TABLE Prelude_Heartbeat (_ident INTEGER PRIMARY KEY, messageid TEXT, heartbeat_interval INTEGER);
CREATE TABLE Prelude_CreateTime (_message_ident INTEGER, _parent_type TEXT, time DATETIME, gmtoff INTEGER, usec INTEGER);
CREATE TABLE Prelude_Classification (_message_ident INTEGER, ident TEXT, text TEXT);
CREATE TABLE Prelude_Source (_message_ident INTEGER, _index INTEGER, ident TEXT, spoofed TEXT, interface TEXT);
CREATE TABLE Prelude_Node (_message_ident INTEGER, _parent_type TEXT, _parent0_index INTEGER, ident TEXT, category TEXT, location TEXT, name TEXT);
CREATE TABLE Prelude_Address (_message_ident INTEGER, _parent_type TEXT, _parent0_index INTEGER, _index INTEGER, ident TEXT, category TEXT, vlan_name TEXT, vlan_num INTEGER, address TEXT, netmask TEXT);
CREATE TABLE Prelude_AdditionalData (_message_ident INTEGER, _parent_type TEXT, _index INTEGER, type TEXT, meaning TEXT, data BLOB);
CREATE TABLE Prelude_Analyzer (_message_ident INTEGER, _parent_type TEXT, _index INTEGER, analyzerid TEXT, name TEXT, manufacturer TEXT, model TEXT, version TEXT, class TEXT, ostype TEXT, osversion TEXT);

INSERT INTO Prelude_Alert VALUES (1, 'm1'), (2, 'm2'), (3, 'm3');
INSERT INTO Prelude_Heartbeat VALUES (10, 'h1', 600);

INSERT INTO Prelude_CreateTime VALUES
    (1, 'A', '2024-03-01 12:30:00', 3600, 5),
    (2, 'A', '2024-03-02 08:00:00', 0, 0),
    (3, 'A', '2023-12-31 23:00:00', 0, 0),
    (10, 'H', '2024-03-01 00:00:00', 0, 0);

INSERT INTO Prelude_Classification VALUES
    (1, NULL, 'SSH brute force'),
    (2, NULL, 'Port scan'),
    (3, NULL, 'ssh login');

INSERT INTO Prelude_Source VALUES (1, 0, NULL, NULL, NULL), (2, 0, NULL, NULL, NULL);
INSERT INTO Prelude_Node VALUES (1, 'S', 0, NULL, NULL, NULL, 'attacker');
INSERT INTO Prelude_Address VALUES
    (1, 'S', 0, 0, NULL, 'ipv4-addr', NULL, NULL, '10.0.0.1', NULL),
    (2, 'S', 0, 0, NULL, 'ipv4-addr', NULL, NULL, '192.168.1.5', NULL);

INSERT INTO Prelude_AdditionalData VALUES (1, 'A', 0, 'string', 'greeting', 'hello');
INSERT INTO Prelude_Analyzer VALUES
    (1, 'A', 0, 'a1', 'sshd', NULL, NULL, NULL, NULL, NULL, NULL),
    (10, 'H', 0, 'a1', 'sshd', NULL, NULL, NULL, NULL, NULL, NULL);
"#;

/// Tables only touched by deletion.
const DELETE_ONLY_TABLES: &[&str] = &[
    "Prelude_Action",
    "Prelude_Alertident",
    "Prelude_AnalyzerTime",
    "Prelude_Assessment",
    "Prelude_Reference",
    "Prelude_Confidence",
    "Prelude_CorrelationAlert",
    "Prelude_DetectTime",
    "Prelude_File",
    "Prelude_FileAccess",
    "Prelude_FileAccess_Permission",
    "Prelude_Impact",
    "Prelude_Inode",
    "Prelude_Checksum",
    "Prelude_Linkage",
    "Prelude_OverflowAlert",
    "Prelude_Process",
    "Prelude_ProcessArg",
    "Prelude_ProcessEnv",
    "Prelude_SnmpService",
    "Prelude_Service",
    "Prelude_Target",
    "Prelude_ToolAlert",
    "Prelude_User",
    "Prelude_UserId",
    "Prelude_WebService",
    "Prelude_WebServiceArg",
];

/// Test context holding a fixture database and a session on it.
struct TestContext {
    _dir: TempDir,
    path: String,
    db: Db,
}

impl TestContext {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prelude.sqlite").display().to_string();

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for table in DELETE_ONLY_TABLES {
            conn.execute_batch(&format!(
                "CREATE TABLE {} (_message_ident INTEGER, _parent_type TEXT)",
                table
            ))
            .unwrap();
        }
        drop(conn);

        let db = Db::new(open_sql(&path), None).unwrap();
        Self {
            _dir: dir,
            path,
            db,
        }
    }

    fn alert_idents(&self, criteria: &str, order: IdentOrder) -> Vec<u64> {
        let criteria = criteria_from_str(criteria).unwrap();
        self.db
            .get_alert_idents(Some(&criteria), Limit::default(), order)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn sorted_alert_idents(&self, criteria: &str) -> Vec<u64> {
        let mut idents = self.alert_idents(criteria, IdentOrder::Unordered);
        idents.sort_unstable();
        idents
    }

    fn values(&self, select: &[&str], criteria: Option<&str>) -> Vec<Vec<Option<Value>>> {
        let selection = selection_from_strs(select).unwrap();
        let criteria = criteria.map(|c| criteria_from_str(c).unwrap());
        self.db
            .get_values(&selection, criteria.as_ref(), false, Limit::default())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    /// Read a count with a separate connection.
    fn count(&self, query: &str) -> i64 {
        let conn = rusqlite::Connection::open(&self.path).unwrap();
        conn.query_row(query, [], |row| row.get(0)).unwrap()
    }
}

fn open_sql(path: &str) -> Sql {
    let registry = DialectRegistry::new().with(Arc::new(SqliteDialect::new()));
    let settings = Settings::parse(&format!("type=sqlite file='{}'", path)).unwrap();
    Sql::open(&registry, settings, QueryConfig::utc()).unwrap()
}

fn string(s: &str) -> Option<Value> {
    Some(Value::String(s.to_string()))
}

// ============== Tests ==============

#[test]
fn test_format_detected() {
    let ctx = TestContext::new();
    assert_eq!(ctx.db.format().name(), "classic");
    assert_eq!(ctx.db.sql().status(), SqlStatus::Connected);
}

#[test]
fn test_select_ordered_strings() {
    let ctx = TestContext::new();
    let rows = ctx.values(&["alert.classification.text/order_asc"], None);
    assert_eq!(
        rows,
        vec![
            vec![string("Port scan")],
            vec![string("SSH brute force")],
            vec![string("ssh login")],
        ]
    );
}

#[test]
fn test_substring_nocase() {
    let ctx = TestContext::new();
    assert_eq!(
        ctx.sorted_alert_idents("alert.classification.text <>* '*SSH*'"),
        vec![1, 3]
    );
    assert_eq!(
        ctx.sorted_alert_idents("alert.classification.text !<> '*scan'"),
        vec![1, 3]
    );
}

#[test]
fn test_regex() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sorted_alert_idents("alert.classification.text ~ '^Port'"), vec![2]);
    assert_eq!(
        ctx.sorted_alert_idents("alert.classification.text ~* '^ssh'"),
        vec![1, 3]
    );
    // class escapes keep their case under the nocase flag
    assert_eq!(
        ctx.sorted_alert_idents(r"alert.classification.text ~* '^p\S+ SCAN$'"),
        vec![2]
    );
}

#[test]
fn test_time_decoding() {
    let ctx = TestContext::new();
    let rows = ctx.values(&["alert.create_time"], Some("alert.messageid == 'm1'"));
    let expected = Time::from_secs(1_709_296_200)
        .with_gmt_offset(3600)
        .with_usec(5);
    assert_eq!(rows, vec![vec![Some(Value::Time(expected))]]);
}

#[test]
fn test_count() {
    let ctx = TestContext::new();
    let rows = ctx.values(&["count(alert.create_time)"], None);
    assert_eq!(rows, vec![vec![Some(Value::UInt64(3))]]);
}

#[test]
fn test_group_by_extract() {
    let ctx = TestContext::new();
    let rows = ctx.values(
        &[
            "extract(alert.create_time, year)/group_by,order_asc",
            "count(alert.create_time)",
        ],
        None,
    );
    assert_eq!(
        rows,
        vec![
            vec![Some(Value::Int32(2023)), Some(Value::UInt64(1))],
            vec![Some(Value::Int32(2024)), Some(Value::UInt64(2))],
        ]
    );
}

#[test]
fn test_broken_down_time() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sorted_alert_idents("alert.create_time >= year:2024"), vec![1, 2]);
    assert_eq!(ctx.sorted_alert_idents("alert.create_time < year:2024"), vec![3]);
    assert_eq!(ctx.sorted_alert_idents("alert.create_time == month:3"), vec![1, 2]);
    assert_eq!(ctx.sorted_alert_idents("alert.create_time < hour:10"), vec![2]);
}

#[test]
fn test_fixed_time() {
    let ctx = TestContext::new();
    assert_eq!(
        ctx.sorted_alert_idents("alert.create_time > '2024-03-01 12:30:00'"),
        vec![2]
    );
}

#[test]
fn test_ident_order_and_limit() {
    let ctx = TestContext::new();
    let desc = ctx
        .db
        .get_alert_idents(None, Limit::default(), IdentOrder::CreateTimeDesc)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(desc, vec![2, 1, 3]);

    let page = ctx
        .db
        .get_alert_idents(None, Limit::new(Some(1), Some(1)), IdentOrder::CreateTimeAsc)
        .unwrap();
    assert_eq!(page.get(0).unwrap(), Some(1));
    assert_eq!(page.get(1).unwrap(), None);
}

#[test]
fn test_nested_join() {
    let ctx = TestContext::new();
    let rows = ctx.values(
        &["alert.source(0).node.address(*).address"],
        Some("alert.source(0).node.name == attacker"),
    );
    assert_eq!(rows, vec![vec![string("10.0.0.1")]]);

    assert_eq!(
        ctx.sorted_alert_idents("alert.source.node.address.address == 192.168.1.5"),
        vec![2]
    );
}

#[test]
fn test_presence() {
    let ctx = TestContext::new();
    assert_eq!(ctx.sorted_alert_idents("alert.source(0).node.name"), vec![1]);
    assert_eq!(ctx.sorted_alert_idents("!alert.source(0).node.name"), vec![2, 3]);
}

#[test]
fn test_additional_data() {
    let ctx = TestContext::new();
    let rows = ctx.values(&["alert.additional_data(0).data"], Some("alert.messageid == 'm1'"));
    assert_eq!(rows, vec![vec![string("hello")]]);
}

#[test]
fn test_heartbeats() {
    let ctx = TestContext::new();
    let idents = ctx
        .db
        .get_heartbeat_idents(None, Limit::default(), IdentOrder::Unordered)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(idents, vec![10]);

    let rows = ctx.values(&["heartbeat.heartbeat_interval", "heartbeat.analyzer(0).name"], None);
    assert_eq!(rows, vec![vec![Some(Value::UInt32(600)), string("sshd")]]);
}

#[test]
fn test_quote_in_value() {
    let ctx = TestContext::new();
    assert!(ctx.sorted_alert_idents("alert.messageid == \"it's\"").is_empty());
}

#[test]
fn test_delete_alert() {
    let ctx = TestContext::new();
    ctx.db.delete_alert(1).unwrap();

    assert_eq!(ctx.count("SELECT COUNT(*) FROM Prelude_Alert"), 2);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM Prelude_Classification WHERE _message_ident = 1"),
        0
    );
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM Prelude_AdditionalData WHERE _message_ident = 1"),
        0
    );
    // heartbeat rows are untouched
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM Prelude_CreateTime WHERE _parent_type = 'H'"),
        1
    );
}

#[test]
fn test_delete_from_result() {
    let ctx = TestContext::new();
    let criteria = criteria_from_str("alert.classification.text ~* 'ssh'").unwrap();
    let idents = ctx
        .db
        .get_alert_idents(Some(&criteria), Limit::default(), IdentOrder::Unordered)
        .unwrap();
    assert_eq!(ctx.db.delete_alerts_from_result(idents).unwrap(), 2);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM Prelude_Alert"), 1);
    assert_eq!(ctx.db.delete_heartbeats(&[10]).unwrap(), 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM Prelude_Heartbeat"), 0);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM Prelude_Analyzer"), 0);
}

#[test]
fn test_delete_rolls_back() {
    let ctx = TestContext::new();
    {
        let conn = rusqlite::Connection::open(&ctx.path).unwrap();
        conn.execute_batch("DROP TABLE Prelude_WebServiceArg").unwrap();
    }

    let err = ctx.db.delete_alert(2).unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{:?}", err);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM Prelude_Alert WHERE _ident = 2"), 1);
    assert_eq!(ctx.db.sql().status(), SqlStatus::Connected);
}

#[test]
fn test_missing_file() {
    let sql = open_sql("/nonexistent/dir/prelude.sqlite");
    let err = Db::new(sql, None).unwrap_err();
    assert!(err.is_connection_error(), "{:?}", err);
}
