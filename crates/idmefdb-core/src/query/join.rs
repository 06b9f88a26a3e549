//! Joined tables of a compiled statement.
//!
//! Every distinct path shape resolved while building a statement becomes one
//! aliased `LEFT JOIN` against the message table. Tables are kept in
//! discovery order, which is also the emission order.

use idmefdb_proto::{IdmefClass, Path, PathIndex};

use crate::error::Error;

/// Alias of the message table in every statement.
pub const TOP_TABLE: &str = "top_table";

/// One aliased `LEFT JOIN` participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedTable {
    path: Path,
    table_name: String,
    alias: String,
    parent_type: Option<char>,
    index_constraints: Vec<String>,
}

impl JoinedTable {
    fn new(path: Path, table_name: String, alias: String) -> Result<Self, Error> {
        let parent_type = resolve_parent_type(&path);
        let index_constraints = resolve_index_constraints(&path, &alias)?;
        Ok(Self {
            path,
            table_name,
            alias,
            parent_type,
            index_constraints,
        })
    }

    /// The path this table was created for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Physical table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Alias (`t0`, `t1`, ...).
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Parent type discriminator, `None` when the table serves a single role.
    pub fn parent_type(&self) -> Option<char> {
        self.parent_type
    }

    /// Index constraints, ANDed in the join condition.
    pub fn index_constraints(&self) -> &[String] {
        &self.index_constraints
    }

    /// Check if `path` has the same shape as this table's path.
    ///
    /// When the last element is a list, names and ancestor indexes must be
    /// equal and the final indexes equal or one of them undefined. Otherwise
    /// the leaf name is ignored: every leaf of the same parent object lives
    /// in the same table.
    fn matches(&self, path: &Path) -> bool {
        let depth = path.depth();
        if depth != self.path.depth() || depth == 0 {
            return false;
        }

        let last = depth - 1;
        let (ours, theirs) = (self.path.index_at(last), path.index_at(last));

        if !theirs.is_listed() {
            return !ours.is_listed() && self.path.ncompare(path, last);
        }

        self.path.ncompare(path, last)
            && self.path.name_at(last) == path.name_at(last)
            && (ours == theirs || ours == PathIndex::Undefined || theirs == PathIndex::Undefined)
    }

    fn to_sql(&self) -> String {
        let mut condition = Vec::with_capacity(2 + self.index_constraints.len());
        if let Some(parent_type) = self.parent_type {
            condition.push(format!("{}._parent_type='{}'", self.alias, parent_type));
        }
        condition.push(format!("{}._message_ident={}._ident", self.alias, TOP_TABLE));
        condition.extend(self.index_constraints.iter().cloned());

        format!(
            " LEFT JOIN {} AS {} ON ({})",
            self.table_name,
            self.alias,
            condition.join(" AND ")
        )
    }
}

/// The set of tables joined by one statement.
#[derive(Debug, Clone, Default)]
pub struct Join {
    top_class: Option<IdmefClass>,
    tables: Vec<JoinedTable>,
    next_id: usize,
}

impl Join {
    /// Create an empty join.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a join whose message table is already known.
    pub fn with_top_class(top_class: IdmefClass) -> Self {
        Self {
            top_class: Some(top_class),
            ..Self::default()
        }
    }

    pub fn top_class(&self) -> Option<IdmefClass> {
        self.top_class
    }

    /// Pin the message class, failing if a different one is already pinned.
    pub fn set_top_class(&mut self, top_class: IdmefClass) -> Result<(), Error> {
        match self.top_class {
            Some(existing) if existing != top_class => Err(Error::ConflictingTopTable {
                existing: existing.to_string(),
                requested: top_class.to_string(),
            }),
            _ => {
                self.top_class = Some(top_class);
                Ok(())
            }
        }
    }

    /// Tables in creation order.
    pub fn tables(&self) -> &[JoinedTable] {
        &self.tables
    }

    /// Find a table created for a path of the same shape.
    pub fn lookup_table(&self, path: &Path) -> Option<&JoinedTable> {
        self.tables.iter().find(|table| table.matches(path))
    }

    /// Create a table for `path` and append it to the join.
    pub fn new_table(&mut self, path: &Path, table_name: String) -> Result<&JoinedTable, Error> {
        self.set_top_class(path.root_class())?;

        let alias = format!("t{}", self.next_id);
        let table = JoinedTable::new(path.clone(), table_name, alias)?;
        self.next_id += 1;
        self.tables.push(table);

        let index = self.tables.len() - 1;
        Ok(&self.tables[index])
    }

    /// Return the table for `path`, creating it with `table_name` on a miss.
    pub fn lookup_or_create(
        &mut self,
        path: &Path,
        table_name: impl FnOnce() -> Result<String, Error>,
    ) -> Result<&JoinedTable, Error> {
        match self.tables.iter().position(|table| table.matches(path)) {
            Some(index) => {
                self.set_top_class(path.root_class())?;
                Ok(&self.tables[index])
            }
            None => {
                let name = table_name()?;
                self.new_table(path, name)
            }
        }
    }

    /// Render the FROM clause body: the message table and every join.
    pub fn to_sql(&self) -> Result<String, Error> {
        let top = match self.top_class {
            Some(IdmefClass::Alert) => "Prelude_Alert",
            Some(IdmefClass::Heartbeat) => "Prelude_Heartbeat",
            Some(other) => return Err(Error::UnresolvableTable(other.to_string())),
            None => return Err(Error::Query("statement references no message class".into())),
        };

        let mut out = format!("{} AS {}", top, TOP_TABLE);
        for table in &self.tables {
            out.push_str(&table.to_sql());
        }
        Ok(out)
    }
}

/// Role discriminator of a table row, derived from the path's class ancestry.
fn resolve_parent_type(path: &Path) -> Option<char> {
    if path.root_class() == IdmefClass::Heartbeat {
        return Some('H');
    }

    match path.class_at(1) {
        Some(IdmefClass::Classification | IdmefClass::Assessment | IdmefClass::OverflowAlert) => {
            return None
        }
        Some(IdmefClass::ToolAlert) => {
            return (path.class_at(2) == Some(IdmefClass::Alertident)).then_some('T')
        }
        Some(IdmefClass::CorrelationAlert) => {
            return (path.class_at(2) == Some(IdmefClass::Alertident)).then_some('C')
        }
        Some(IdmefClass::Source) => return (path.depth() > 3).then_some('S'),
        Some(IdmefClass::Target) => return resolve_target_parent_type(path),
        _ => {}
    }

    if path.leaf_name() == "detect_time" {
        return None;
    }
    Some('A')
}

fn resolve_target_parent_type(path: &Path) -> Option<char> {
    if path.depth() == 3 {
        return None;
    }

    if path.class_at(2) == Some(IdmefClass::File) {
        let file_access_user = path.class_at(3) == Some(IdmefClass::FileAccess)
            && path.class_at(4) == Some(IdmefClass::UserId);
        return file_access_user.then_some('F');
    }

    Some('T')
}

/// Index constraints for the listed elements along a path.
///
/// Intermediate levels (excluding the message and the last two elements)
/// become `_parent<N>_index` constraints; the last listed element among the
/// final two becomes `_index`. An undefined index matches any list element
/// but not the singleton row stored with index -1.
fn resolve_index_constraints(path: &Path, alias: &str) -> Result<Vec<String>, Error> {
    let max_depth = path.depth();
    if max_depth < 2 {
        return Err(Error::Query(format!("path '{}' is too short to join", path)));
    }

    let mut constraints = Vec::new();
    let mut parent_level = 0;

    for depth in 1..max_depth - 2 {
        let index = path.index_at(depth);
        if !index.is_listed() {
            continue;
        }
        constraints.push(index_constraint(
            &format!("{}._parent{}_index", alias, parent_level),
            index,
        ));
        parent_level += 1;
    }

    let last = [path.index_at(max_depth - 1), path.index_at(max_depth - 2)]
        .into_iter()
        .find(PathIndex::is_listed);
    if let Some(index) = last {
        constraints.push(index_constraint(&format!("{}._index", alias), index));
    }

    Ok(constraints)
}

fn index_constraint(column: &str, index: PathIndex) -> String {
    match index {
        PathIndex::Index(index) => format!("{} = {}", column, index),
        _ => format!("{} != -1", column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_parent_types() {
        let cases = [
            ("alert.classification.text", None),
            ("alert.assessment.impact.severity", None),
            ("alert.source(0).ident", None),
            ("alert.source(0).node.name", Some('S')),
            ("alert.target(0).ident", None),
            ("alert.target(0).node.name", Some('T')),
            ("alert.target(0).file(0).name", None),
            ("alert.target(0).file(0).file_access(0).user_id.name", Some('F')),
            ("alert.tool_alert.name", None),
            ("alert.tool_alert.alertident(0).alertident", Some('T')),
            ("alert.correlation_alert.alertident(0).alertident", Some('C')),
            ("alert.analyzer(0).name", Some('A')),
            ("alert.create_time", Some('A')),
            ("alert.detect_time", None),
            ("heartbeat.analyzer(0).name", Some('H')),
        ];

        for (text, expected) in cases {
            assert_eq!(resolve_parent_type(&path(text)), expected, "{}", text);
        }
    }

    #[test]
    fn test_index_constraints() {
        let constraints =
            resolve_index_constraints(&path("alert.source(1).node.address(2).address"), "t0")
                .unwrap();
        assert_eq!(constraints, vec!["t0._parent0_index = 1", "t0._index = 2"]);

        let constraints =
            resolve_index_constraints(&path("alert.source.node.address.address"), "t3").unwrap();
        assert_eq!(constraints, vec!["t3._parent0_index != -1", "t3._index != -1"]);

        let constraints =
            resolve_index_constraints(&path("alert.classification.text"), "t0").unwrap();
        assert!(constraints.is_empty());

        let constraints =
            resolve_index_constraints(&path("alert.source(0).process.arg(3)"), "t1").unwrap();
        assert_eq!(constraints, vec!["t1._parent0_index = 0", "t1._index = 3"]);
    }

    #[test]
    fn test_table_emission() {
        let mut join = Join::new();
        join.new_table(&path("alert.source(0).node.name"), "Prelude_Node".into())
            .unwrap();

        assert_eq!(
            join.to_sql().unwrap(),
            "Prelude_Alert AS top_table LEFT JOIN Prelude_Node AS t0 ON \
             (t0._parent_type='S' AND t0._message_ident=top_table._ident AND t0._parent0_index = 0)"
        );
    }

    #[test]
    fn test_lookup_ignores_leaf_name() {
        let mut join = Join::new();
        join.new_table(&path("alert.classification.text"), "Prelude_Classification".into())
            .unwrap();

        let table = join.lookup_table(&path("alert.classification.ident")).unwrap();
        assert_eq!(table.alias(), "t0");
        assert!(join.lookup_table(&path("alert.assessment.impact.severity")).is_none());
    }

    #[test]
    fn test_lookup_distinguishes_indexes() {
        let mut join = Join::new();
        join.new_table(&path("alert.source(0).node.name"), "Prelude_Node".into())
            .unwrap();

        assert!(join.lookup_table(&path("alert.source(0).node.location")).is_some());
        assert!(join.lookup_table(&path("alert.source(1).node.name")).is_none());
    }

    #[test]
    fn test_conflicting_top_class() {
        let mut join = Join::new();
        join.new_table(&path("alert.classification.text"), "Prelude_Classification".into())
            .unwrap();

        let err = join
            .new_table(&path("heartbeat.analyzer(0).name"), "Prelude_Analyzer".into())
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingTopTable { .. }));
    }

    #[test]
    fn test_empty_join_has_no_top_table() {
        assert!(Join::new().to_sql().is_err());
        assert_eq!(
            Join::with_top_class(IdmefClass::Heartbeat).to_sql().unwrap(),
            "Prelude_Heartbeat AS top_table"
        );
    }
}
