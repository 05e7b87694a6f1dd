mod common;

use common::*;
use lobbind::*;

fn blob_bytes(session: &Session, sql: &str, id: i32) -> Result<Option<Vec<u8>>> {
    let mut rows = session.query(sql, (id,))?;
    match rows.next()? {
        Some(row) => row.get::<Option<Vec<u8>>>(0),
        None => panic!("no row with id {}", id),
    }
}

#[test]
fn buffer_in() -> Result<()> {
    let (_server, session) = connect()?;
    for (id, len) in [(1, 32768), (2, 65535)] {
        let data = binary_data(len);
        session.execute(BLOB_IN, [
            ("i", BindDescriptor::from(id)),
            ("b", BindDescriptor::new(data.as_slice(), SqlType::Buffer).with_max_size(len)),
        ], &auto_commit())?;

        let lob: Lob = session.query(SELECT_BLOB_1, (id,))?.next()?.expect("row").get(0)?;
        assert_eq!(lob.kind(), LobKind::Blob);
        assert_eq!(lob.len()?, len as u64);
        assert_eq!(lob.read_to_vec()?, data);
    }
    Ok(())
}

#[test]
fn nullish_buffer_in_inserts_null() -> Result<()> {
    let (_server, session) = connect()?;
    let values = [Value::Null, Value::Bytes(Vec::new()), Value::Undefined];
    for (id, val) in (3..).zip(values) {
        session.execute(BLOB_IN, [
            ("i", BindDescriptor::from(id)),
            ("b", BindDescriptor::new(val, SqlType::Buffer).with_max_size(50000)),
        ], &auto_commit())?;
        assert_eq!(blob_bytes(&session, SELECT_BLOB_1, id)?, None);
    }
    Ok(())
}

#[test]
fn value_and_type_mismatch() -> Result<()> {
    let (_server, session) = connect()?;
    for val in [Value::Number(f64::NAN), Value::Number(0.0), Value::Str("8".repeat(10))] {
        let err = session.execute(BLOB_IN, [
            ("i", BindDescriptor::from(6)),
            ("b", BindDescriptor::new(val, SqlType::Buffer).with_max_size(50000)),
        ], &auto_commit()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindTypeMismatch);
        assert!(err.to_string().starts_with("NJS-011:"));
    }
    let err = session.execute(BLOB_IN, [
        ("i", BindDescriptor::from(7)),
        ("b", BindDescriptor::new(Value::Object(vec![("a".to_string(), Value::Number(1.0))]), SqlType::Buffer).with_max_size(5000)),
    ], &auto_commit()).unwrap_err();
    assert_eq!(err.code(), "NJS-012");
    Ok(())
}

#[test]
fn positional_buffer_in_without_max_size() -> Result<()> {
    let (_server, session) = connect()?;
    let data = binary_data(50000);
    session.execute(BLOB_IN, (6, data.clone()), &auto_commit())?;
    assert_eq!(blob_bytes(&session, SELECT_BLOB_1, 6)?, Some(data));
    Ok(())
}

#[test]
fn buffer_in_above_configured_inline_maximum() -> Result<()> {
    let config = Config::default().with_max_inline_size(1024);
    let server = std::sync::Arc::new(lobbind::memdb::MemoryServer::new());
    lobbind::memdb::Schema::create_schema(&common::LobSchema, &server)?;
    let session = Environment::with_config(config).connect(server.clone());

    let err = session.execute(BLOB_IN, (1, binary_data(1025)), &auto_commit()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBuffer);
    assert_eq!(server.temporary_lobs(), 0);

    // BLOB binds are streamed, the inline maximum does not apply
    session.execute(BLOB_IN, (1, BindDescriptor::new(binary_data(1025), SqlType::Blob)), &auto_commit())?;
    assert_eq!(blob_bytes(&session, SELECT_BLOB_1, 1)?.map(|data| data.len()), Some(1025));
    Ok(())
}

#[test]
fn buffer_out() -> Result<()> {
    let (_server, session) = connect()?;
    for (id, len) in [(1, 32768), (2, 65535)] {
        let data = binary_data(len);
        session.execute(BLOB_IN, (id, data.clone()), &auto_commit())?;

        let res = session.execute(BLOB_OUT, [
            ("i", BindDescriptor::from(id)),
            ("b", BindDescriptor::output(SqlType::Buffer).with_max_size(len)),
        ], &ExecOptions::new())?;
        assert_eq!(res.out_binds().get("b").and_then(OutValue::as_bytes), Some(data.as_slice()));
    }
    Ok(())
}

#[test]
fn positional_buffer_out() -> Result<()> {
    let (_server, session) = connect()?;
    let data = "8".repeat(50000).into_bytes();
    session.execute(BLOB_IN, (6, data.clone()), &auto_commit())?;

    let res = session.execute(BLOB_OUT, (6, BindDescriptor::output(SqlType::Buffer).with_max_size(50000)), &ExecOptions::new())?;
    assert_eq!(res.out_binds().len(), 1);
    let out: Vec<u8> = res.out_binds().get(1).expect("second bind").get()?;
    assert_eq!(out, data);
    Ok(())
}

#[test]
fn null_buffer_out() -> Result<()> {
    let (_server, session) = connect()?;
    session.execute(BLOB_IN, (3, Value::Null), &auto_commit())?;
    let res = session.execute(BLOB_OUT, (3, BindDescriptor::output(SqlType::Buffer).with_max_size(50000)), &ExecOptions::new())?;
    let out: Option<Vec<u8>> = res.out_binds().get(1).expect("second bind").get()?;
    assert_eq!(out, None);
    Ok(())
}

#[test]
fn buffer_out_limits() -> Result<()> {
    let (server, session) = connect()?;
    session.execute(BLOB_IN, (2, binary_data(65535)), &auto_commit())?;

    let err = session.execute(BLOB_OUT, [
        ("i", BindDescriptor::from(2)),
        ("b", BindDescriptor::output(SqlType::Buffer).with_max_size(50000)),
    ], &ExecOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBuffer);
    assert!(err.to_string().starts_with("NJS-016:"));

    let err = session.execute(BLOB_OUT, [
        ("i", BindDescriptor::from(2)),
        ("b", BindDescriptor::output(SqlType::Buffer)),
    ], &ExecOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NumericOrValue);
    assert!(err.to_string().starts_with("ORA-06502:"));
    assert_eq!(server.lob_references(), 0);
    Ok(())
}

#[test]
fn blob_out_is_a_stream() -> Result<()> {
    let (server, session) = connect_to(lobbind::memdb::MemoryServer::with_chunk_size(1000))?;
    let data = binary_data(4500);
    session.execute(BLOB_IN, (1, data.clone()), &auto_commit())?;

    let mut res = session.execute(BLOB_OUT, (1, BindDescriptor::output(SqlType::Blob)), &ExecOptions::new())?;
    let lob = res.out_binds_mut().take(1).and_then(OutValue::into_lob).expect("BLOB locator");
    assert_eq!(lob.chunk_size()?, 1000);

    let chunks = lob.reader().collect::<Result<Vec<Chunk>>>()?;
    assert_eq!(chunks.iter().map(Chunk::len).collect::<Vec<_>>(), [1000, 1000, 1000, 1000, 500]);
    let fetched: Vec<u8> = chunks.into_iter().flat_map(Chunk::into_bytes).collect();
    assert_eq!(fetched, data);
    assert_eq!(server.lob_references(), 0);
    Ok(())
}

#[test]
fn buffer_in_out() -> Result<()> {
    let (server, session) = connect()?;
    let data = binary_data(32767);
    let res = session.execute(BLOB_IN_OUT,
        [("lob_in_out", BindDescriptor::in_out(data.clone(), SqlType::Buffer))],
        &ExecOptions::new()
    )?;
    assert_eq!(res.out_binds().get("lob_in_out").and_then(OutValue::as_bytes), Some(data.as_slice()));

    let err = session.execute(BLOB_IN_OUT,
        [("lob_in_out", BindDescriptor::in_out(binary_data(32768), SqlType::Buffer))],
        &auto_commit()
    ).unwrap_err();
    assert_eq!(err.code(), "ORA-01460");
    assert_eq!(server.temporary_lobs(), 0);
    Ok(())
}

#[test]
fn streamed_blob_in_from_file() -> Result<()> {
    let (server, session) = connect()?;
    let data = binary_data(100_000);
    let file = temp_file(&data)?;
    // a bare source is bound as a BLOB
    session.execute(BLOB_IN, (1, Value::source(file)), &auto_commit())?;
    assert_eq!(server.temporary_lobs(), 0);
    assert_eq!(blob_bytes(&session, SELECT_BLOB_1, 1)?, Some(data));
    Ok(())
}

#[test]
fn failed_source_fails_the_call() -> Result<()> {
    struct Broken;

    impl std::io::Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "source is gone"))
        }
    }

    let (server, session) = connect()?;
    let err = session.execute(BLOB_IN, (1, Value::source(Broken)), &auto_commit()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(server.temporary_lobs(), 0);
    assert_eq!(server.lob_references(), 0);
    assert!(session.query(SELECT_BLOB_1, (1,))?.next()?.is_none());
    Ok(())
}
