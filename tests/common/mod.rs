#![allow(dead_code)]

use lobbind::{Direction, ExecOptions, LobKind, Result, Session, memdb::{Call, DataType, MemoryServer, Param, Schema}, ServerValue};
use std::{io::Write, sync::Arc};

pub const CLOB_IN:       &str = "BEGIN nodb_clobs_in_741 (:i, :c); END;";
pub const CLOB_OUT:      &str = "BEGIN nodb_clobs_out_742 (:i, :c); END;";
pub const CLOB_IN_OUT:   &str = "begin nodb_clob_in_out_743(lob_in_out => :lob_in_out); end;";
pub const BLOB_IN:       &str = "BEGIN nodb_blobs_in_744 (:i, :b); END;";
pub const BLOB_OUT:      &str = "BEGIN nodb_blobs_out_745 (:i, :b); END;";
pub const BLOB_IN_OUT:   &str = "begin nodb_blob_in_out_746(lob_in_out => :lob_in_out); end;";
pub const CLOBS_IN:      &str = "BEGIN nodb_lobs_in_747 (:i, :c1, :c2); END;";
pub const CLOBS_OUT:     &str = "BEGIN nodb_lobs_out_748 (:i, :c1, :c2); END;";
pub const CLOBS_IN_OUT:  &str = "begin nodb_lobs_in_out_749(:lob_1, :lob_2); end;";
pub const BLOBS_IN:      &str = "BEGIN nodb_blobs_in_7410 (:i, :b1, :b2); END;";
pub const LOBS_IN:       &str = "BEGIN nodb_lobs_in_7413 (:i, :c, :b); END;";

pub const INSERT_EMPTY_CLOB: &str = "INSERT INTO nodb_tab_lobs_in (id, clob) VALUES (:i, EMPTY_CLOB()) RETURNING clob INTO :lobbv";
pub const INSERT_EMPTY_BLOB: &str = "INSERT INTO nodb_tab_lobs_in (id, blob) VALUES (:i, EMPTY_BLOB()) RETURNING blob INTO :lobbv";

pub const SELECT_CLOB_1: &str = "select clob_1 from nodb_tab_clob_in where id = :i";
pub const SELECT_CLOB_2: &str = "select clob_2 from nodb_tab_clob_in where id = :i";
pub const SELECT_BLOB_1: &str = "select blob_1 from nodb_tab_blob_in where id = :i";
pub const SELECT_BLOB_2: &str = "select blob_2 from nodb_tab_blob_in where id = :i";
pub const SELECT_CLOB:   &str = "select clob from nodb_tab_lobs_in where id = :id";
pub const SELECT_BLOB:   &str = "select blob from nodb_tab_lobs_in where id = :id";

fn id_is(row: &[ServerValue], id: Option<f64>) -> bool {
    matches!((row.first(), id), (Some(ServerValue::Number(num)), Some(id)) if *num == id)
}

/// Returns the column of the first row with the matching id.
fn lookup(call: &Call, table: &str, col: usize, id: Option<f64>) -> Result<ServerValue> {
    let rows = call.select(table, |row| id_is(row, id))?;
    Ok( rows.into_iter().next().and_then(|row| row.into_iter().nth(col)).unwrap_or(ServerValue::Null) )
}

fn define_select(server: &MemoryServer, sql: &str, param: &str, table: &'static str, col: usize) {
    server.define(sql, vec![Param::new(param, DataType::Number, Direction::In)], move |call| {
        let id = call.number(0)?;
        let rows = call.select(table, |row| id_is(row, id))?;
        for row in rows {
            call.emit(vec![row[col].clone()]);
        }
        Ok(0)
    });
}

/// Tables and routines of the LOB bind workload
pub struct LobSchema;

impl Schema for LobSchema {
    fn create_schema(&self, server: &MemoryServer) -> Result<()> {
        server.create_table("nodb_tab_clob_in", &[("id", DataType::Number), ("clob_1", DataType::Clob), ("clob_2", DataType::Clob)])?;
        server.create_table("nodb_tab_blob_in", &[("id", DataType::Number), ("blob_1", DataType::Blob), ("blob_2", DataType::Blob)])?;
        server.create_table("nodb_tab_lobs_in", &[("id", DataType::Number), ("clob", DataType::Clob), ("blob", DataType::Blob)])?;

        server.define(CLOB_IN,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("c", DataType::Clob, Direction::In)],
            |call| {
                let row = vec![call.arg(0).clone(), call.arg(1).clone(), ServerValue::Null];
                call.insert("nodb_tab_clob_in", row)?;
                Ok(1)
            }
        );
        server.define(CLOB_OUT,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("c", DataType::Clob, Direction::Out)],
            |call| {
                let val = lookup(call, "nodb_tab_clob_in", 1, call.number(0)?)?;
                call.set(1, val);
                Ok(0)
            }
        );
        server.define(CLOB_IN_OUT, vec![Param::new("lob_in_out", DataType::Clob, Direction::InOut)], |_| Ok(0));

        server.define(BLOB_IN,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("b", DataType::Blob, Direction::In)],
            |call| {
                let row = vec![call.arg(0).clone(), call.arg(1).clone(), ServerValue::Null];
                call.insert("nodb_tab_blob_in", row)?;
                Ok(1)
            }
        );
        server.define(BLOB_OUT,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("b", DataType::Blob, Direction::Out)],
            |call| {
                let val = lookup(call, "nodb_tab_blob_in", 1, call.number(0)?)?;
                call.set(1, val);
                Ok(0)
            }
        );
        server.define(BLOB_IN_OUT, vec![Param::new("lob_in_out", DataType::Blob, Direction::InOut)], |_| Ok(0));

        server.define(CLOBS_IN,
            vec![
                Param::new("i", DataType::Number, Direction::In),
                Param::new("c1", DataType::Clob, Direction::In),
                Param::new("c2", DataType::Clob, Direction::In),
            ],
            |call| {
                let row = call.args().to_vec();
                call.insert("nodb_tab_clob_in", row)?;
                Ok(1)
            }
        );
        server.define(CLOBS_OUT,
            vec![
                Param::new("i", DataType::Number, Direction::In),
                Param::new("c1", DataType::Clob, Direction::Out),
                Param::new("c2", DataType::Clob, Direction::Out),
            ],
            |call| {
                let id = call.number(0)?;
                let clob_1 = lookup(call, "nodb_tab_clob_in", 1, id)?;
                let clob_2 = lookup(call, "nodb_tab_clob_in", 2, id)?;
                call.set(1, clob_1);
                call.set(2, clob_2);
                Ok(0)
            }
        );
        server.define(CLOBS_IN_OUT,
            vec![Param::new("lob_1", DataType::Clob, Direction::InOut), Param::new("lob_2", DataType::Clob, Direction::InOut)],
            |_| Ok(0)
        );
        server.define(BLOBS_IN,
            vec![
                Param::new("i", DataType::Number, Direction::In),
                Param::new("b1", DataType::Blob, Direction::In),
                Param::new("b2", DataType::Blob, Direction::In),
            ],
            |call| {
                let row = call.args().to_vec();
                call.insert("nodb_tab_blob_in", row)?;
                Ok(1)
            }
        );
        server.define(LOBS_IN,
            vec![
                Param::new("i", DataType::Number, Direction::In),
                Param::new("c", DataType::Clob, Direction::In),
                Param::new("b", DataType::Blob, Direction::In),
            ],
            |call| {
                let row = call.args().to_vec();
                call.insert("nodb_tab_lobs_in", row)?;
                Ok(1)
            }
        );

        server.define(INSERT_EMPTY_CLOB,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("lobbv", DataType::Clob, Direction::Out)],
            |call| {
                let lob = call.empty_lob(LobKind::Clob);
                let row = vec![call.arg(0).clone(), ServerValue::Locator(lob), ServerValue::Null];
                call.insert("nodb_tab_lobs_in", row)?;
                call.set(1, lob);
                Ok(1)
            }
        );
        server.define(INSERT_EMPTY_BLOB,
            vec![Param::new("i", DataType::Number, Direction::In), Param::new("lobbv", DataType::Blob, Direction::Out)],
            |call| {
                let lob = call.empty_lob(LobKind::Blob);
                let row = vec![call.arg(0).clone(), ServerValue::Null, ServerValue::Locator(lob)];
                call.insert("nodb_tab_lobs_in", row)?;
                call.set(1, lob);
                Ok(1)
            }
        );

        define_select(server, SELECT_CLOB_1, "i", "nodb_tab_clob_in", 1);
        define_select(server, SELECT_CLOB_2, "i", "nodb_tab_clob_in", 2);
        define_select(server, SELECT_BLOB_1, "i", "nodb_tab_blob_in", 1);
        define_select(server, SELECT_BLOB_2, "i", "nodb_tab_blob_in", 2);
        define_select(server, SELECT_CLOB, "id", "nodb_tab_lobs_in", 1);
        define_select(server, SELECT_BLOB, "id", "nodb_tab_lobs_in", 2);
        Ok(())
    }

    fn drop_schema(&self, server: &MemoryServer) -> Result<()> {
        for sql in [
            CLOB_IN, CLOB_OUT, CLOB_IN_OUT, BLOB_IN, BLOB_OUT, BLOB_IN_OUT, CLOBS_IN, CLOBS_OUT, CLOBS_IN_OUT,
            BLOBS_IN, LOBS_IN, INSERT_EMPTY_CLOB, INSERT_EMPTY_BLOB,
            SELECT_CLOB_1, SELECT_CLOB_2, SELECT_BLOB_1, SELECT_BLOB_2, SELECT_CLOB, SELECT_BLOB,
        ] {
            server.undefine(sql);
        }
        server.drop_table("nodb_tab_clob_in")?;
        server.drop_table("nodb_tab_blob_in")?;
        server.drop_table("nodb_tab_lobs_in")
    }
}

/// Installs a test writer subscriber when `LOBBIND_TEST_LOG` names a level, i.e. `debug`.
fn init_tracing() {
    if let Ok(level) = std::env::var("LOBBIND_TEST_LOG") {
        let level = level.parse().unwrap_or(tracing::Level::DEBUG);
        let _ = tracing_subscriber::fmt().with_max_level(level).with_test_writer().try_init();
    }
}

/// Returns a server with the workload schema and a session connected to it.
pub fn connect() -> Result<(Arc<MemoryServer>, Session)> {
    connect_to(MemoryServer::new())
}

pub fn connect_to(server: MemoryServer) -> Result<(Arc<MemoryServer>, Session)> {
    init_tracing();
    let server = Arc::new(server);
    LobSchema.create_schema(&server)?;
    let session = lobbind::env()?.connect(server.clone());
    Ok((server, session))
}

pub fn auto_commit() -> ExecOptions {
    ExecOptions::new().with_auto_commit(true)
}

/// Text with 1, 2, 3 and 4 byte characters
pub fn multibyte_text(repeat: usize) -> String {
    "Aé€😀 ".repeat(repeat)
}

/// Binary data that is not valid UTF-8
pub fn binary_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 0x80) as u8).collect()
}

/// Writes the data into a temporary file and rewinds it.
pub fn temp_file(data: &[u8]) -> std::io::Result<std::fs::File> {
    use std::io::{Seek, SeekFrom};
    let mut file = tempfile::tempfile()?;
    file.write_all(data)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}
