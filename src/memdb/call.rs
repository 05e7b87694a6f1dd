//! Routine invocation of the in-memory server

use super::{DataType, State, Table, lobs::LobData, PLSQL_SCALAR_LIMIT};
use crate::{
    Error, Result,
    err::{ORA_INCONSISTENT_TYPES, ORA_NO_SUCH_TABLE, ORA_PLSQL_COMPILATION},
    server::{Locator, ServerBind, ServerValue},
    types::{Direction, LobKind, SqlType},
};

/// ORA-00913: too many values
const ORA_TOO_MANY_VALUES    : i32 = 913;
/// ORA-00947: not enough values
const ORA_NOT_ENOUGH_VALUES  : i32 = 947;
/// ORA-01722: invalid number
const ORA_INVALID_NUMBER     : i32 = 1722;
/// ORA-12899: value too large for column
const ORA_VALUE_TOO_LARGE    : i32 = 12899;

/// Declared parameter of a routine
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    data_type: DataType,
    mode: Direction,
}

impl Param {
    pub fn new(name: &str, data_type: DataType, mode: Direction) -> Self {
        Self { name: name.trim_start_matches(':').to_owned(), data_type, mode }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

type Body = dyn Fn(&mut Call) -> Result<u64> + Send + Sync;

/// A statement the server knows how to execute
pub(crate) struct Routine {
    params: Vec<Param>,
    body: Box<Body>,
}

fn wrong_arguments(detail: impl std::fmt::Display) -> Error {
    Error::oracle(ORA_PLSQL_COMPILATION, format_args!("PLS-00306: wrong number or types of arguments in call: {}", detail))
}

fn inconsistent(expected: impl std::fmt::Display, got: &ServerValue) -> Error {
    let got = match got {
        ServerValue::Null         => "NULL",
        ServerValue::Number(_)    => "NUMBER",
        ServerValue::Text(_)      => "CHAR",
        ServerValue::Binary(_)    => "BINARY",
        ServerValue::Locator(loc) => match loc.kind {
            LobKind::Clob => "CLOB",
            LobKind::Blob => "BLOB",
        },
    };
    Error::oracle(ORA_INCONSISTENT_TYPES, format_args!("inconsistent datatypes: expected {} got {}", expected, got))
}

/// STRING and BUFFER values of IN OUT binds are PL/SQL scalars on their way back
fn is_scalar_in_out(bind: &ServerBind) -> bool {
    bind.dir == Direction::InOut && bind.sql_type.is_scalar()
}

fn buffer_too_small() -> Error {
    Error::numeric_or_value("character string buffer too small")
}

fn lob_text(state: &State, loc: &Locator) -> Result<String> {
    match state.lob(loc)? {
        LobData::Char(txt) => Ok( txt.clone() ),
        LobData::Binary(_) => Err( inconsistent("CLOB", &ServerValue::Locator(*loc)) ),
    }
}

fn lob_bytes(state: &State, loc: &Locator) -> Result<Vec<u8>> {
    match state.lob(loc)? {
        LobData::Binary(bin) => Ok( bin.clone() ),
        LobData::Char(txt)   => Ok( txt.as_bytes().to_vec() ),
    }
}

fn is_empty_scalar(val: &ServerValue) -> bool {
    match val {
        ServerValue::Null        => true,
        ServerValue::Text(txt)   => txt.is_empty(),
        ServerValue::Binary(bin) => bin.is_empty(),
        _ => false,
    }
}

/**
    Execution context of a routine body.

    Arguments are indexed by the position of the declared parameter. IN arguments
    are already converted into the parameter types. Values assigned to OUT
    parameters are converted into the bind types when the body returns.
*/
pub struct Call<'a> {
    state: &'a mut State,
    args: Vec<ServerValue>,
    rows: Vec<Vec<ServerValue>>,
    /// Temporary LOBs that live only as long as the call
    temps: Vec<u64>,
}

impl<'a> Call<'a> {
    pub(crate) fn new(state: &'a mut State) -> Self {
        Self { state, args: Vec::new(), rows: Vec::new(), temps: Vec::new() }
    }

    fn call_temp(&mut self, data: LobData) -> Locator {
        let loc = self.state.new_temp(data);
        self.temps.push(loc.id);
        loc
    }

    pub fn args(&self) -> &[ServerValue] {
        &self.args
    }

    /// Returns the argument of the parameter at `pos`. Missing arguments are NULL.
    pub fn arg(&self, pos: usize) -> &ServerValue {
        static NULL: ServerValue = ServerValue::Null;
        self.args.get(pos).unwrap_or(&NULL)
    }

    /// Assigns a value to the OUT parameter at `pos`.
    pub fn set(&mut self, pos: usize, value: impl Into<ServerValue>) {
        if pos >= self.args.len() {
            self.args.resize(pos + 1, ServerValue::Null);
        }
        self.args[pos] = value.into();
    }

    /// Returns the argument as text. CLOB arguments are read in full.
    pub fn text(&self, pos: usize) -> Result<Option<String>> {
        match self.arg(pos) {
            ServerValue::Null         => Ok( None ),
            ServerValue::Text(txt)    => Ok( Some(txt.clone()) ),
            ServerValue::Number(num)  => Ok( Some(num.to_string()) ),
            ServerValue::Locator(loc) => lob_text(&*self.state, loc).map(Some),
            val => Err( inconsistent("CHAR", val) ),
        }
    }

    /// Returns the argument as bytes. BLOB arguments are read in full.
    pub fn bytes(&self, pos: usize) -> Result<Option<Vec<u8>>> {
        match self.arg(pos) {
            ServerValue::Null         => Ok( None ),
            ServerValue::Binary(bin)  => Ok( Some(bin.clone()) ),
            ServerValue::Locator(loc) => lob_bytes(&*self.state, loc).map(Some),
            val => Err( inconsistent("BINARY", val) ),
        }
    }

    pub fn number(&self, pos: usize) -> Result<Option<f64>> {
        match self.arg(pos) {
            ServerValue::Null        => Ok( None ),
            ServerValue::Number(num) => Ok( Some(*num) ),
            val => Err( inconsistent("NUMBER", val) ),
        }
    }

    /// Creates an empty LOB, like `EMPTY_CLOB()` or `EMPTY_BLOB()`, which can be inserted into a table.
    pub fn empty_lob(&mut self, kind: LobKind) -> Locator {
        self.state.new_persistent(LobData::empty(kind))
    }

    /// Creates a temporary LOB with the provided content.
    pub fn temp_clob(&mut self, txt: &str) -> Locator {
        self.call_temp(LobData::Char(txt.to_owned()))
    }

    pub fn temp_blob(&mut self, bin: &[u8]) -> Locator {
        self.call_temp(LobData::Binary(bin.to_vec()))
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.state.working.tables.get(&name.to_uppercase())
            .ok_or_else(|| Error::oracle(ORA_NO_SUCH_TABLE, "table or view does not exist"))
    }

    /// Returns `true` if some table already stores the LOB.
    fn is_stored(&self, loc: &Locator) -> bool {
        self.state.working.tables.values()
            .any(|table| table.rows.iter().any(|row| row.contains(&ServerValue::Locator(*loc))))
    }

    fn column_value(&mut self, data_type: DataType, val: ServerValue) -> Result<ServerValue> {
        if is_empty_scalar(&val) {
            return Ok( ServerValue::Null );
        }
        match (data_type, val) {
            (DataType::Number, ServerValue::Number(num)) => Ok( ServerValue::Number(num) ),
            (DataType::Number, ServerValue::Text(txt)) => txt.trim().parse().map(ServerValue::Number)
                .map_err(|_| Error::oracle(ORA_INVALID_NUMBER, "invalid number")),
            (DataType::Varchar2(limit), val) => {
                let txt = match val {
                    ServerValue::Text(txt)    => txt,
                    ServerValue::Number(num)  => num.to_string(),
                    ServerValue::Locator(loc) if loc.kind == LobKind::Clob => lob_text(&*self.state, &loc)?,
                    val => return Err( inconsistent("CHAR", &val) ),
                };
                if txt.len() > limit {
                    return Err( Error::oracle(ORA_VALUE_TOO_LARGE, format_args!("value too large for column (actual: {}, maximum: {})", txt.len(), limit)) );
                }
                Ok( ServerValue::Text(txt) )
            }
            (DataType::Raw(limit), val) => {
                let bin = match val {
                    ServerValue::Binary(bin) => bin,
                    ServerValue::Locator(loc) if loc.kind == LobKind::Blob => lob_bytes(&*self.state, &loc)?,
                    val => return Err( inconsistent("BINARY", &val) ),
                };
                if bin.len() > limit {
                    return Err( Error::oracle(ORA_VALUE_TOO_LARGE, format_args!("value too large for column (actual: {}, maximum: {})", bin.len(), limit)) );
                }
                Ok( ServerValue::Binary(bin) )
            }
            (DataType::Clob, ServerValue::Text(txt)) => Ok( ServerValue::Locator(self.state.new_persistent(LobData::Char(txt))) ),
            (DataType::Blob, ServerValue::Binary(bin)) => Ok( ServerValue::Locator(self.state.new_persistent(LobData::Binary(bin))) ),
            (DataType::Clob, ServerValue::Locator(loc)) | (DataType::Blob, ServerValue::Locator(loc)) if Some(loc.kind) == data_type.lob_kind() => {
                if self.state.is_temp(&loc) || self.is_stored(&loc) {
                    // LOB values are copied into the row
                    let data = self.state.lob(&loc)?.clone();
                    Ok( ServerValue::Locator(self.state.new_persistent(data)) )
                } else {
                    self.state.lob(&loc)?;
                    Ok( ServerValue::Locator(loc) )
                }
            }
            (data_type, val) => Err( inconsistent(data_type, &val) ),
        }
    }

    /// Inserts a row. Values are converted into the column types, LOB values are copied.
    pub fn insert(&mut self, table: &str, row: Vec<ServerValue>) -> Result<()> {
        let columns: Vec<DataType> = self.table(table)?.columns.iter().map(|(_, data_type)| *data_type).collect();
        if row.len() > columns.len() {
            return Err( Error::oracle(ORA_TOO_MANY_VALUES, "too many values") );
        }
        if row.len() < columns.len() {
            return Err( Error::oracle(ORA_NOT_ENOUGH_VALUES, "not enough values") );
        }
        let mut values = Vec::with_capacity(row.len());
        for (data_type, val) in columns.into_iter().zip(row) {
            values.push(self.column_value(data_type, val)?);
        }
        if let Some(table) = self.state.working.tables.get_mut(&table.to_uppercase()) {
            table.rows.push(values);
        }
        Ok(())
    }

    /// Returns the rows that satisfy the filter.
    pub fn select(&self, table: &str, filter: impl Fn(&[ServerValue]) -> bool) -> Result<Vec<Vec<ServerValue>>> {
        Ok( self.table(table)?.rows.iter().filter(|row| filter(row)).cloned().collect() )
    }

    /// Deletes the rows that satisfy the filter and returns their number.
    pub fn delete(&mut self, table: &str, filter: impl Fn(&[ServerValue]) -> bool) -> Result<u64> {
        self.table(table)?;
        let mut deleted = 0;
        if let Some(table) = self.state.working.tables.get_mut(&table.to_uppercase()) {
            let before = table.rows.len();
            table.rows.retain(|row| !filter(row));
            deleted = (before - table.rows.len()) as u64;
        }
        Ok(deleted)
    }

    /// Adds a row to the result set of a query.
    pub fn emit(&mut self, row: Vec<ServerValue>) {
        self.rows.push(row);
    }

    /// Converts an IN bind into the parameter type.
    fn convert_in(&mut self, bind: &ServerBind, param: &Param) -> Result<ServerValue> {
        let val = &bind.value;
        if is_empty_scalar(val) {
            return Ok( ServerValue::Null );
        }
        match (param.data_type, val) {
            (DataType::Number, ServerValue::Number(num)) => Ok( ServerValue::Number(*num) ),
            (DataType::Number, ServerValue::Text(txt)) => txt.trim().parse().map(ServerValue::Number)
                .map_err(|_| Error::numeric_or_value("character to number conversion error")),
            (DataType::Varchar2(limit), _) => {
                let txt = match val {
                    ServerValue::Text(txt)    => txt.clone(),
                    ServerValue::Number(num)  => num.to_string(),
                    ServerValue::Locator(loc) if loc.kind == LobKind::Clob => lob_text(&*self.state, loc)?,
                    _ => return Err( inconsistent("CHAR", val) ),
                };
                if txt.len() > limit {
                    return Err( buffer_too_small() );
                }
                Ok( ServerValue::Text(txt) )
            }
            (DataType::Raw(limit), _) => {
                let bin = match val {
                    ServerValue::Binary(bin)  => bin.clone(),
                    ServerValue::Locator(loc) if loc.kind == LobKind::Blob => lob_bytes(&*self.state, loc)?,
                    _ => return Err( inconsistent("BINARY", val) ),
                };
                if bin.len() > limit {
                    return Err( buffer_too_small() );
                }
                Ok( ServerValue::Binary(bin) )
            }
            (DataType::Clob, ServerValue::Text(txt)) => {
                if is_scalar_in_out(bind) && txt.len() > PLSQL_SCALAR_LIMIT {
                    return Err( Error::bad_conversion() );
                }
                Ok( ServerValue::Locator(self.call_temp(LobData::Char(txt.clone()))) )
            }
            (DataType::Blob, ServerValue::Binary(bin)) => {
                if is_scalar_in_out(bind) && bin.len() > PLSQL_SCALAR_LIMIT {
                    return Err( Error::bad_conversion() );
                }
                Ok( ServerValue::Locator(self.call_temp(LobData::Binary(bin.clone()))) )
            }
            (DataType::Clob, ServerValue::Locator(loc)) | (DataType::Blob, ServerValue::Locator(loc)) if Some(loc.kind) == param.data_type.lob_kind() => {
                self.state.lob(loc)?;
                Ok( ServerValue::Locator(*loc) )
            }
            (data_type, val) => Err( inconsistent(data_type, val) ),
        }
    }

    /// Converts the value of an OUT parameter into the bind type.
    fn convert_out(&mut self, val: ServerValue, bind: &ServerBind) -> Result<ServerValue> {
        if let ServerValue::Null = val {
            return Ok( ServerValue::Null );
        }
        match (bind.sql_type, val) {
            (SqlType::Clob, ServerValue::Locator(loc)) | (SqlType::Blob, ServerValue::Locator(loc)) if Some(loc.kind) == bind.sql_type.lob_kind() => {
                self.state.lob(&loc)?;
                Ok( ServerValue::Locator(loc) )
            }
            (SqlType::Clob, ServerValue::Text(txt)) => Ok( ServerValue::Locator(self.call_temp(LobData::Char(txt))) ),
            (SqlType::Blob, ServerValue::Binary(bin)) => Ok( ServerValue::Locator(self.call_temp(LobData::Binary(bin))) ),
            (SqlType::String, val) | (SqlType::Buffer, val) => {
                let scalar = match (bind.sql_type, val) {
                    (SqlType::String, ServerValue::Text(txt))   => ServerValue::Text(txt),
                    (SqlType::String, ServerValue::Number(num)) => ServerValue::Text(num.to_string()),
                    (SqlType::String, ServerValue::Locator(loc)) if loc.kind == LobKind::Clob => ServerValue::Text(lob_text(&*self.state, &loc)?),
                    (SqlType::Buffer, ServerValue::Binary(bin)) => ServerValue::Binary(bin),
                    (SqlType::Buffer, ServerValue::Locator(loc)) if loc.kind == LobKind::Blob => ServerValue::Binary(lob_bytes(&*self.state, &loc)?),
                    (sql_type, val) => return Err( inconsistent(sql_type, &val) ),
                };
                if is_empty_scalar(&scalar) {
                    Ok( ServerValue::Null )
                } else if bind.buffer_size.is_none() {
                    // the client did not size the OUT buffer
                    Err( buffer_too_small() )
                } else {
                    Ok(scalar)
                }
            }
            (SqlType::Number, ServerValue::Number(num)) => Ok( ServerValue::Number(num) ),
            (SqlType::Number, ServerValue::Text(txt)) => txt.trim().parse().map(ServerValue::Number)
                .map_err(|_| Error::numeric_or_value("character to number conversion error")),
            (sql_type, val) => Err( inconsistent(sql_type, &val) ),
        }
    }

    /// Hands a locator over to the client.
    fn grant(&mut self, val: &ServerValue) {
        if let ServerValue::Locator(loc) = val {
            self.state.grant(loc);
            self.temps.retain(|id| *id != loc.id);
        }
    }

    /// Frees temporary LOBs nobody holds on to.
    pub(crate) fn finish(self) {
        for id in self.temps {
            self.state.free_unreferenced_temp(id);
        }
    }
}

impl Routine {
    pub(crate) fn new(params: Vec<Param>, body: Box<Body>) -> Self {
        Self { params, body }
    }

    /// Returns the index of the bind for each declared parameter.
    fn match_binds(&self, binds: &[ServerBind]) -> Result<Vec<usize>> {
        if binds.len() != self.params.len() {
            return Err( wrong_arguments(format_args!("{} binds for {} parameters", binds.len(), self.params.len())) );
        }
        let mut order = Vec::with_capacity(self.params.len());
        for (pos, param) in self.params.iter().enumerate() {
            let idx = match binds.first().and_then(|bind| bind.name.as_ref()) {
                None => pos,
                Some(_) => binds.iter()
                    .position(|bind| bind.name.as_deref().map_or(false, |name| name.trim_start_matches(':').eq_ignore_ascii_case(&param.name)))
                    .ok_or_else(|| wrong_arguments(format_args!("parameter :{} is not bound", param.name)))?,
            };
            let bind = &binds[idx];
            if bind.dir.is_out() != param.mode.is_out() || (param.mode.is_in() && !bind.dir.is_in()) {
                return Err( wrong_arguments(format_args!("{:?} bind for {:?} parameter :{}", bind.dir, param.mode, param.name)) );
            }
            order.push(idx);
        }
        Ok(order)
    }

    /**
        Runs the routine. On success OUT binds receive their values and result set rows
        are returned; every locator among them carries a new client reference.
    */
    pub(crate) fn invoke(&self, call: &mut Call, binds: &mut [ServerBind]) -> Result<(u64, Vec<Vec<ServerValue>>)> {
        let order = self.match_binds(binds)?;
        call.args = vec![ServerValue::Null; self.params.len()];
        for (pos, param) in self.params.iter().enumerate() {
            if param.mode.is_in() {
                call.args[pos] = call.convert_in(&binds[order[pos]], param)?;
            }
        }

        let rows_affected = (self.body)(call)?;

        let mut outs = Vec::new();
        for (pos, param) in self.params.iter().enumerate() {
            if param.mode.is_out() {
                let val = std::mem::replace(&mut call.args[pos], ServerValue::Null);
                let val = call.convert_out(val, &binds[order[pos]])?;
                outs.push((order[pos], val));
            }
        }
        let rows = std::mem::take(&mut call.rows);

        for (idx, val) in outs {
            call.grant(&val);
            binds[idx].value = val;
        }
        for val in rows.iter().flatten() {
            call.grant(val);
        }
        Ok((rows_affected, rows))
    }
}
