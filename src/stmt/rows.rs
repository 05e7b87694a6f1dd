//! Rows (result set) of a query

use super::{exec::OutValue, fromsql::FromSql};
use crate::{Error, Result};

/// Result set of a query
pub struct Rows {
    rows: std::vec::IntoIter<Vec<OutValue>>,
}

impl Rows {
    pub(crate) fn new(rows: Vec<Vec<OutValue>>) -> Self {
        Self { rows: rows.into_iter() }
    }

    /**
        Returns the next row in the query's result set.

        # Example

        ```
        use lobbind::{Direction, memdb::{MemoryServer, DataType, Param}};
        use std::sync::Arc;

        let server = MemoryServer::new();
        server.create_table("greetings", &[("id", DataType::Number), ("txt", DataType::Clob)])?;
        server.define(
            "INSERT INTO greetings VALUES (:id, :txt)",
            vec![Param::new("id", DataType::Number, Direction::In), Param::new("txt", DataType::Clob, Direction::In)],
            |call| {
                let row = call.args().to_vec();
                call.insert("greetings", row)?;
                Ok(1)
            }
        );
        server.define("SELECT txt FROM greetings", vec![], |call| {
            for row in call.select("greetings", |_| true)? {
                call.emit(vec![row[1].clone()]);
            }
            Ok(0)
        });

        let session = lobbind::env()?.connect(Arc::new(server));
        session.execute("INSERT INTO greetings VALUES (:id, :txt)", (1, "Hello, World!"), &Default::default())?;

        let mut rows = session.query("SELECT txt FROM greetings", ())?;
        let row = rows.next()?.expect("one row");
        let txt : String = row.get(0)?;
        assert_eq!(txt, "Hello, World!");
        assert!(rows.next()?.is_none());
        # Ok::<(),lobbind::Error>(())
        ```
    */
    pub fn next(&mut self) -> Result<Option<Row>> {
        Ok( self.rows.next().map(|cols| Row { cols }) )
    }
}

/// A row in the returned result set
pub struct Row {
    cols: Vec<OutValue>,
}

impl Row {
    /// Returns the number of columns in the row.
    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    /// Returns `true` if the value of the column at the specified (zero-based) position is NULL.
    pub fn is_null(&self, pos: usize) -> bool {
        self.cols.get(pos).map_or(true, OutValue::is_null)
    }

    /**
        Returns the value of the column at the specified (zero-based) position converted
        into the requested type.

        LOB columns may be retrieved as [`Lob`](crate::Lob) handles, which open for reading
        by default, or as fully buffered `String` or `Vec<u8>` values.
    */
    pub fn get<T: FromSql>(&self, pos: usize) -> Result<T> {
        let col = self.cols.get(pos).ok_or_else(|| Error::msg(format!("column {} is out of range", pos)))?;
        T::value(col)
    }
}
