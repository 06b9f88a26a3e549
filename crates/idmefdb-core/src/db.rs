//! Database facade over a SQL session.
//!
//! [`Db`] compiles identifier, value and delete requests for the classic
//! schema and decodes their results lazily.

use std::fmt;

use idmefdb_proto::{Criteria, IdmefClass, Path, Value, ValueType};
use tracing::{debug, info};

use crate::error::Error;
use crate::query::{
    resolve_criteria, resolve_field, resolve_selection, FieldContext, Join, PathSelection,
    SelectedPath,
};
use crate::sql::{time_from_timestamp, Row, Sql, Table};

/// Schema layout of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Classic,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Classic => "classic",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.trim() {
            "classic" => Ok(Format::Classic),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordering of message identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentOrder {
    #[default]
    Unordered,
    CreateTimeAsc,
    CreateTimeDesc,
}

/// Pagination of a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Limit {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }
}

/// An IDMEF database.
#[derive(Debug, Clone)]
pub struct Db {
    sql: Sql,
    format: Format,
}

impl Db {
    /// Bind a session. Without an explicit format, the format is read from
    /// the database's `_format` table.
    pub fn new(sql: Sql, format: Option<&str>) -> Result<Self, Error> {
        let format = match format {
            Some(name) => Format::from_name(name)?,
            None => Self::detect_format(&sql)?,
        };
        Ok(Self { sql, format })
    }

    fn detect_format(sql: &Sql) -> Result<Format, Error> {
        let table = sql
            .query("SELECT name FROM _format")?
            .ok_or_else(|| Error::UnknownFormat(String::new()))?;
        let row = table
            .fetch_row()?
            .ok_or_else(|| Error::UnknownFormat(String::new()))?;
        let field = row
            .fetch_field(0)?
            .ok_or_else(|| Error::UnknownFormat(String::new()))?;

        let format = Format::from_name(field.as_str()?)?;
        info!(format = %format, "detected database format");
        Ok(format)
    }

    pub fn sql(&self) -> &Sql {
        &self.sql
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Identifiers of the alerts matching `criteria`.
    pub fn get_alert_idents(
        &self,
        criteria: Option<&Criteria>,
        limit: Limit,
        order: IdentOrder,
    ) -> Result<ResultIdents, Error> {
        self.get_message_idents(IdmefClass::Alert, criteria, limit, order)
    }

    /// Identifiers of the heartbeats matching `criteria`.
    pub fn get_heartbeat_idents(
        &self,
        criteria: Option<&Criteria>,
        limit: Limit,
        order: IdentOrder,
    ) -> Result<ResultIdents, Error> {
        self.get_message_idents(IdmefClass::Heartbeat, criteria, limit, order)
    }

    fn get_message_idents(
        &self,
        top_class: IdmefClass,
        criteria: Option<&Criteria>,
        limit: Limit,
        order: IdentOrder,
    ) -> Result<ResultIdents, Error> {
        let mut join = Join::with_top_class(top_class);

        let condition = criteria
            .map(|criteria| resolve_criteria(&self.sql, criteria, &mut join))
            .transpose()?;

        let order_field = match order {
            IdentOrder::Unordered => None,
            IdentOrder::CreateTimeAsc | IdentOrder::CreateTimeDesc => {
                let path = Path::parse(&format!("{}.create_time", top_class))?;
                Some(resolve_field(&path, FieldContext::Where, &mut join)?)
            }
        };

        let mut query = String::from("SELECT DISTINCT(top_table._ident)");
        if let Some(field) = &order_field {
            query.push_str(", ");
            query.push_str(field);
        }
        query.push_str(" FROM ");
        query.push_str(&join.to_sql()?);
        if let Some(condition) = &condition {
            query.push_str(" WHERE ");
            query.push_str(condition);
        }
        if let Some(field) = &order_field {
            let direction = if order == IdentOrder::CreateTimeAsc {
                "ASC"
            } else {
                "DESC"
            };
            query.push_str(&format!(" ORDER BY {} {}", field, direction));
        }
        query.push_str(&self.sql.build_limit_offset_string(limit.limit, limit.offset));

        debug!(class = %top_class, "fetching message idents");
        let table = self.expect_table(&query)?;
        Ok(ResultIdents { table })
    }

    /// Values of `selection` for the messages matching `criteria`.
    pub fn get_values(
        &self,
        selection: &PathSelection,
        criteria: Option<&Criteria>,
        distinct: bool,
        limit: Limit,
    ) -> Result<ResultValues, Error> {
        let query = self.build_values_query(selection, criteria, distinct, limit)?;
        let table = self.expect_table(&query)?;
        Ok(ResultValues {
            sql: self.sql.clone(),
            table,
            selection: selection.clone(),
        })
    }

    /// Compile the statement `get_values` runs.
    pub fn build_values_query(
        &self,
        selection: &PathSelection,
        criteria: Option<&Criteria>,
        distinct: bool,
        limit: Limit,
    ) -> Result<String, Error> {
        if selection.is_empty() {
            return Err(Error::Query("empty selection".into()));
        }

        let mut join = Join::new();
        let select = resolve_selection(&self.sql, selection, &mut join)?;
        let condition = criteria
            .map(|criteria| resolve_criteria(&self.sql, criteria, &mut join))
            .transpose()?;

        let mut query = String::from("SELECT ");
        if distinct {
            query.push_str("DISTINCT ");
        }
        query.push_str(select.fields());
        query.push_str(" FROM ");
        query.push_str(&join.to_sql()?);
        if let Some(condition) = &condition {
            query.push_str(" WHERE ");
            query.push_str(condition);
        }
        query.push_str(&select.modifiers_to_string());
        query.push_str(&self.sql.build_limit_offset_string(limit.limit, limit.offset));

        Ok(query)
    }

    /// Delete one alert and everything stored with it.
    pub fn delete_alert(&self, ident: u64) -> Result<(), Error> {
        self.delete_messages(ALERT_TABLES, &format!("= {}", ident))
    }

    /// Delete one heartbeat and everything stored with it.
    pub fn delete_heartbeat(&self, ident: u64) -> Result<(), Error> {
        self.delete_messages(HEARTBEAT_TABLES, &format!("= {}", ident))
    }

    /// Delete a list of alerts, returning how many idents were given.
    pub fn delete_alerts(&self, idents: &[u64]) -> Result<usize, Error> {
        if idents.is_empty() {
            return Ok(0);
        }
        self.delete_messages(ALERT_TABLES, &ident_list(idents))?;
        Ok(idents.len())
    }

    /// Delete a list of heartbeats, returning how many idents were given.
    pub fn delete_heartbeats(&self, idents: &[u64]) -> Result<usize, Error> {
        if idents.is_empty() {
            return Ok(0);
        }
        self.delete_messages(HEARTBEAT_TABLES, &ident_list(idents))?;
        Ok(idents.len())
    }

    /// Delete every alert of an identifier result.
    pub fn delete_alerts_from_result(&self, result: ResultIdents) -> Result<usize, Error> {
        let idents = result.collect::<Result<Vec<_>, _>>()?;
        self.delete_alerts(&idents)
    }

    /// Delete every heartbeat of an identifier result.
    pub fn delete_heartbeats_from_result(&self, result: ResultIdents) -> Result<usize, Error> {
        let idents = result.collect::<Result<Vec<_>, _>>()?;
        self.delete_heartbeats(&idents)
    }

    fn delete_messages(&self, tables: &[DeleteTarget], idents: &str) -> Result<(), Error> {
        self.sql.transaction_start()?;

        for target in tables {
            let query = target.to_sql(idents);
            if let Err(e) = self.sql.query(&query) {
                return Err(self.sql.abort_with(e));
            }
        }

        self.sql.transaction_end()
    }

    fn expect_table(&self, query: &str) -> Result<Table, Error> {
        self.sql
            .query(query)?
            .ok_or_else(|| Error::Query("statement returned no rows".into()))
    }
}

/// One table cleaned when deleting messages.
struct DeleteTarget {
    table: &'static str,
    ident_column: &'static str,
    parent_type: Option<&'static str>,
}

const fn target(table: &'static str, parent_type: Option<&'static str>) -> DeleteTarget {
    DeleteTarget {
        table,
        ident_column: "_message_ident",
        parent_type,
    }
}

const fn message(table: &'static str) -> DeleteTarget {
    DeleteTarget {
        table,
        ident_column: "_ident",
        parent_type: None,
    }
}

impl DeleteTarget {
    fn to_sql(&self, idents: &str) -> String {
        let mut query = format!(
            "DELETE FROM {} WHERE {} {}",
            self.table, self.ident_column, idents
        );
        if let Some(parent_type) = self.parent_type {
            query.push_str(" AND _parent_type ");
            query.push_str(parent_type);
        }
        query
    }
}

const ALERT_ONLY: Option<&str> = Some("= 'A'");
const NOT_HEARTBEAT: Option<&str> = Some("!= 'H'");
const HEARTBEAT_ONLY: Option<&str> = Some("= 'H'");

const ALERT_TABLES: &[DeleteTarget] = &[
    target("Prelude_Action", None),
    target("Prelude_AdditionalData", ALERT_ONLY),
    target("Prelude_Address", NOT_HEARTBEAT),
    message("Prelude_Alert"),
    target("Prelude_Alertident", None),
    target("Prelude_Analyzer", ALERT_ONLY),
    target("Prelude_AnalyzerTime", ALERT_ONLY),
    target("Prelude_Assessment", None),
    target("Prelude_Classification", None),
    target("Prelude_Reference", None),
    target("Prelude_Confidence", None),
    target("Prelude_CorrelationAlert", None),
    target("Prelude_CreateTime", ALERT_ONLY),
    target("Prelude_DetectTime", None),
    target("Prelude_File", None),
    target("Prelude_FileAccess", None),
    target("Prelude_FileAccess_Permission", None),
    target("Prelude_Impact", None),
    target("Prelude_Inode", None),
    target("Prelude_Checksum", None),
    target("Prelude_Linkage", None),
    target("Prelude_Node", NOT_HEARTBEAT),
    target("Prelude_OverflowAlert", None),
    target("Prelude_Process", NOT_HEARTBEAT),
    target("Prelude_ProcessArg", NOT_HEARTBEAT),
    target("Prelude_ProcessEnv", NOT_HEARTBEAT),
    target("Prelude_SnmpService", None),
    target("Prelude_Service", None),
    target("Prelude_Source", None),
    target("Prelude_Target", None),
    target("Prelude_ToolAlert", None),
    target("Prelude_User", None),
    target("Prelude_UserId", None),
    target("Prelude_WebService", None),
    target("Prelude_WebServiceArg", None),
];

const HEARTBEAT_TABLES: &[DeleteTarget] = &[
    target("Prelude_AdditionalData", HEARTBEAT_ONLY),
    target("Prelude_Address", HEARTBEAT_ONLY),
    target("Prelude_Analyzer", HEARTBEAT_ONLY),
    target("Prelude_AnalyzerTime", HEARTBEAT_ONLY),
    target("Prelude_CreateTime", HEARTBEAT_ONLY),
    target("Prelude_Node", HEARTBEAT_ONLY),
    target("Prelude_Process", HEARTBEAT_ONLY),
    target("Prelude_ProcessArg", HEARTBEAT_ONLY),
    target("Prelude_ProcessEnv", HEARTBEAT_ONLY),
    message("Prelude_Heartbeat"),
];

fn ident_list(idents: &[u64]) -> String {
    let list: Vec<String> = idents.iter().map(u64::to_string).collect();
    format!("IN ({})", list.join(", "))
}

/// Message identifiers, fetched row by row.
#[derive(Debug)]
pub struct ResultIdents {
    table: Table,
}

impl ResultIdents {
    /// Identifier at `index`, `None` past the end.
    pub fn get(&self, index: usize) -> Result<Option<u64>, Error> {
        match self.table.get_row(index)? {
            Some(row) => decode_ident(&row).map(Some),
            None => Ok(None),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl Iterator for ResultIdents {
    type Item = Result<u64, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.table.fetch_row() {
            Ok(Some(row)) => Some(decode_ident(&row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn decode_ident(row: &Row) -> Result<u64, Error> {
    row.fetch_field(0)?
        .ok_or_else(|| Error::value("NULL", ValueType::UInt64))?
        .to_u64()
}

/// Rows of selected values, decoded on demand.
#[derive(Debug)]
pub struct ResultValues {
    sql: Sql,
    table: Table,
    selection: PathSelection,
}

impl ResultValues {
    pub fn selection(&self) -> &PathSelection {
        &self.selection
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Decode the next row: one entry per selected object, `None` for NULL.
    pub fn next_values(&self) -> Result<Option<Vec<Option<Value>>>, Error> {
        let Some(row) = self.table.fetch_row()? else {
            return Ok(None);
        };

        self.selection
            .iter()
            .map(|selected| decode_selected(&self.sql, &row, selected))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

impl Iterator for ResultValues {
    type Item = Result<Vec<Option<Value>>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_values().transpose()
    }
}

fn decode_selected(sql: &Sql, row: &Row, selected: &SelectedPath) -> Result<Option<Value>, Error> {
    let position = selected.position();
    let Some(field) = row.fetch_field(position)? else {
        return Ok(None);
    };

    let object = selected.object();
    let Some(value_type) = object.value_type() else {
        return Err(Error::Query(format!("cannot decode '{}'", object)));
    };

    match value_type {
        ValueType::Time => {
            let (gmt_offset, usec) = match selected.column_count() {
                3 => (
                    optional_field(row, position + 1)?.unwrap_or(0),
                    optional_field(row, position + 2)?.unwrap_or(0),
                ),
                2 => (optional_field(row, position + 1)?.unwrap_or(0), 0),
                _ => (0, 0),
            };
            Ok(Some(Value::Time(time_from_timestamp(
                field.as_str()?,
                gmt_offset,
                usec,
            )?)))
        }
        ValueType::Data if selected.column_count() == 2 => {
            let kind = row.fetch_field(position + 1)?;
            let kind = kind.as_ref().map(|k| k.as_str()).transpose()?;
            decode_additional_data(sql, field.value(), kind).map(Some)
        }
        ValueType::Data => Ok(Some(Value::Data(sql.unescape_binary(field.value())?))),
        _ => Ok(Some(Value::parse(value_type, field.as_str()?)?)),
    }
}

fn optional_field<T: std::str::FromStr>(row: &Row, column: usize) -> Result<Option<T>, Error> {
    row.fetch_field(column)?.map(|field| field.parse()).transpose()
}

/// Additional data payloads are stored as text, except byte strings.
fn decode_additional_data(sql: &Sql, data: &[u8], kind: Option<&str>) -> Result<Value, Error> {
    match kind {
        Some("byte-string") => Ok(Value::Data(sql.unescape_binary(data)?)),
        _ => Ok(Value::String(String::from_utf8_lossy(data).into_owned())),
    }
}
