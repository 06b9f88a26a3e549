//! Lazily materialized query results.
//!
//! A [`Table`] caches rows as they are fetched from the backend cursor and a
//! [`Row`] caches its fields the same way, so every backend row and field is
//! fetched at most once.
//!
//! Ownership: a [`Field`] keeps its row alive and a [`Row`] handed to a
//! caller keeps its table alive. The table itself only holds its rows, so a
//! row pins the table lazily: the first handle given out takes one strong
//! reference to the table and the last one releases it. Dropping the
//! [`Table`] handle while a row is still held therefore keeps the backend
//! cursor open until that row goes away.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use super::dialect::{ResultSet, RowData};
use super::session::Sql;
use crate::error::Error;

struct TableInner {
    sql: Sql,
    result: RefCell<Box<dyn ResultSet>>,
    rows: RefCell<Vec<Rc<RowInner>>>,
    done: Cell<bool>,
    cursor: Cell<usize>,
    column_count: usize,
}

/// Result table of a query.
#[derive(Clone)]
pub struct Table {
    inner: Rc<TableInner>,
}

impl Table {
    pub(crate) fn new(sql: Sql, result: Box<dyn ResultSet>) -> Self {
        let column_count = result.column_count();
        Self {
            inner: Rc::new(TableInner {
                sql,
                result: RefCell::new(result),
                rows: RefCell::new(Vec::new()),
                done: Cell::new(false),
                cursor: Cell::new(0),
                column_count,
            }),
        }
    }

    /// The session that produced this table.
    pub fn sql(&self) -> &Sql {
        &self.inner.sql
    }

    pub fn column_count(&self) -> usize {
        self.inner.column_count
    }

    pub fn column_name(&self, column: usize) -> Result<String, Error> {
        self.inner
            .result
            .borrow()
            .column_name(column)
            .map(str::to_string)
            .ok_or(Error::InvalidColumnNum(column))
    }

    pub fn column_num(&self, name: &str) -> Result<usize, Error> {
        self.inner.column_num(name)
    }

    /// Total number of rows.
    ///
    /// Backends that cannot count without fetching are drained once; the
    /// drained rows stay cached.
    pub fn row_count(&self) -> Result<usize, Error> {
        let counted = self
            .inner
            .sql
            .guarded(|| self.inner.result.borrow().row_count());

        match counted {
            Err(e) if e.is_unsupported() => {
                while self.inner.fetch_next()? {}
                Ok(self.inner.rows.borrow().len())
            }
            other => other,
        }
    }

    /// Get row `index`, fetching forward from the backend as needed.
    ///
    /// Returns `Ok(None)` when `index` is the first position past the last
    /// row and [`Error::OutOfRange`] for any later position.
    pub fn get_row(&self, index: usize) -> Result<Option<Row>, Error> {
        while self.inner.rows.borrow().len() <= index {
            if !self.inner.fetch_next()? {
                break;
            }
        }

        let rows = self.inner.rows.borrow();
        match rows.get(index) {
            Some(row) => Ok(Some(Row::handout(row, &self.inner))),
            None if index == rows.len() => Ok(None),
            None => Err(Error::OutOfRange(index)),
        }
    }

    /// Fetch the row after the one returned by the previous call.
    pub fn fetch_row(&self) -> Result<Option<Row>, Error> {
        let index = self.inner.cursor.get();
        let row = self.get_row(index)?;
        if row.is_some() {
            self.inner.cursor.set(index + 1);
        }
        Ok(row)
    }

    /// Number of rows fetched so far.
    pub fn fetched_rows(&self) -> usize {
        self.inner.rows.borrow().len()
    }

    /// Strong references to the table, handles and pinning rows included.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl TableInner {
    /// Fetch one more row into the cache. Returns false once exhausted.
    fn fetch_next(self: &Rc<Self>) -> Result<bool, Error> {
        if self.done.get() {
            return Ok(false);
        }

        let fetched = self.sql.guarded(|| self.result.borrow_mut().fetch_row())?;

        let Some(data) = fetched else {
            self.done.set(true);
            return Ok(false);
        };

        let mut rows = self.rows.borrow_mut();
        let index = rows.len();
        rows.push(Rc::new(RowInner {
            index,
            table: Rc::downgrade(self),
            pinned: RefCell::new(None),
            data: RefCell::new(data),
            fields: RefCell::new(vec![FieldSlot::Unfetched; self.column_count]),
        }));
        Ok(true)
    }

    fn column_num(&self, name: &str) -> Result<usize, Error> {
        self.result
            .borrow()
            .column_num(name)
            .ok_or_else(|| Error::InvalidColumnName(name.to_string()))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("columns", &self.inner.column_count)
            .field("fetched_rows", &self.fetched_rows())
            .field("done", &self.inner.done.get())
            .finish()
    }
}

#[derive(Clone)]
enum FieldSlot {
    Unfetched,
    Null,
    Value(Rc<[u8]>),
}

struct RowInner {
    index: usize,
    table: Weak<TableInner>,
    /// Strong table reference held while any caller holds this row.
    pinned: RefCell<Option<Rc<TableInner>>>,
    data: RefCell<Box<dyn RowData>>,
    fields: RefCell<Vec<FieldSlot>>,
}

/// A row of a result table.
pub struct Row {
    inner: Rc<RowInner>,
}

impl Row {
    fn handout(inner: &Rc<RowInner>, table: &Rc<TableInner>) -> Row {
        let mut pinned = inner.pinned.borrow_mut();
        if pinned.is_none() {
            *pinned = Some(Rc::clone(table));
        }
        Row {
            inner: Rc::clone(inner),
        }
    }

    fn table(&self) -> Result<Rc<TableInner>, Error> {
        self.inner
            .table
            .upgrade()
            .ok_or_else(|| Error::Query("result table released".into()))
    }

    /// Position of this row in its table.
    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn column_count(&self) -> usize {
        self.inner.fields.borrow().len()
    }

    /// Fetch a field, `None` for NULL. The value is cached after the first
    /// fetch, NULL included.
    pub fn fetch_field(&self, column: usize) -> Result<Option<Field>, Error> {
        let cached = self
            .inner
            .fields
            .borrow()
            .get(column)
            .cloned()
            .ok_or(Error::InvalidColumnNum(column))?;

        let slot = match cached {
            FieldSlot::Unfetched => {
                let table = self.table()?;
                let fetched = table
                    .sql
                    .guarded(|| self.inner.data.borrow_mut().fetch_field(column))?;
                let slot = match fetched {
                    Some(value) => FieldSlot::Value(Rc::from(value)),
                    None => FieldSlot::Null,
                };
                self.inner.fields.borrow_mut()[column] = slot.clone();
                slot
            }
            slot => slot,
        };

        Ok(match slot {
            FieldSlot::Value(value) => Some(Field {
                row: self.clone(),
                column,
                value,
            }),
            _ => None,
        })
    }

    /// Fetch a field by column name.
    pub fn fetch_field_by_name(&self, name: &str) -> Result<Option<Field>, Error> {
        let column = self.table()?.column_num(name)?;
        self.fetch_field(column)
    }
}

impl Clone for Row {
    fn clone(&self) -> Self {
        match self.inner.table.upgrade() {
            Some(table) => Row::handout(&self.inner, &table),
            None => Row {
                inner: Rc::clone(&self.inner),
            },
        }
    }
}

impl Drop for Row {
    fn drop(&mut self) {
        // this handle plus the table's cache entry
        if Rc::strong_count(&self.inner) <= 2 {
            let pinned = self.inner.pinned.borrow_mut().take();
            drop(pinned);
        }
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.inner.index)
            .field("columns", &self.column_count())
            .finish()
    }
}

/// A non-NULL field value.
#[derive(Clone)]
pub struct Field {
    row: Row,
    column: usize,
    value: Rc<[u8]>,
}

impl Field {
    /// The row this field belongs to.
    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Raw value as returned by the backend.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Value as text.
    pub fn as_str(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.value)
            .map_err(|_| Error::value(String::from_utf8_lossy(&self.value), "string"))
    }

    /// Parse the textual value, failing on malformed or out of range input.
    pub fn parse<T: FromStr>(&self) -> Result<T, Error> {
        let text = self.as_str()?;
        text.trim()
            .parse()
            .map_err(|_| Error::value(text, short_type_name::<T>()))
    }

    pub fn to_i8(&self) -> Result<i8, Error> {
        self.parse()
    }

    pub fn to_u8(&self) -> Result<u8, Error> {
        self.parse()
    }

    pub fn to_i16(&self) -> Result<i16, Error> {
        self.parse()
    }

    pub fn to_u16(&self) -> Result<u16, Error> {
        self.parse()
    }

    pub fn to_i32(&self) -> Result<i32, Error> {
        self.parse()
    }

    pub fn to_u32(&self) -> Result<u32, Error> {
        self.parse()
    }

    pub fn to_i64(&self) -> Result<i64, Error> {
        self.parse()
    }

    pub fn to_u64(&self) -> Result<u64, Error> {
        self.parse()
    }

    pub fn to_f32(&self) -> Result<f32, Error> {
        self.parse()
    }

    pub fn to_f64(&self) -> Result<f64, Error> {
        self.parse()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("row", &self.row.index())
            .field("column", &self.column)
            .field("value", &String::from_utf8_lossy(&self.value))
            .finish()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.value))
    }
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}
