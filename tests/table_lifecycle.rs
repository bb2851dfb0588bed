// Handle discipline checks for table operations over a counting fake pool.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hbtable::api::{
    ColumnRef, Connection, ConnectionPool, CreationProperties, Error, ErrorKind, HandleRequest,
    KeyType, Mapping, MemoryPool, Mutation, Row, ScanKeys, ScanPlan, ScanPlanBuilder, Table,
    TableOps, Variables, WRITE_BUFFER_SIZE_KEY,
};

#[derive(Default)]
struct CountingPool {
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_ops: bool,
    requests: Mutex<Vec<HandleRequest>>,
}

impl CountingPool {
    fn failing() -> Self {
        Self {
            fail_ops: true,
            ..Self::default()
        }
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.acquired.load(Ordering::SeqCst),
            self.released.load(Ordering::SeqCst),
        )
    }
}

impl ConnectionPool for CountingPool {
    fn acquire(&self, request: &HandleRequest) -> Result<Box<dyn Connection>, Error> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("lock").push(request.clone());
        Ok(Box::new(FakeConnection {
            table: request.table.clone(),
            fail: self.fail_ops,
            auto_flush: true,
        }))
    }

    fn release(&self, _connection: Box<dyn Connection>) -> Result<(), Error> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnection {
    table: Option<String>,
    fail: bool,
    auto_flush: bool,
}

impl FakeConnection {
    fn outcome<T>(&self, value: T) -> Result<T, Error> {
        if self.fail {
            return Err(Error::new(ErrorKind::Internal).with_message("store unreachable"));
        }
        Ok(value)
    }
}

impl Connection for FakeConnection {
    fn bound_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    fn table_exists(&self, _table: &str) -> Result<bool, Error> {
        self.outcome(true)
    }

    fn is_table_disabled(&self, _table: &str) -> Result<bool, Error> {
        self.outcome(false)
    }

    fn is_table_available(&self, _table: &str) -> Result<bool, Error> {
        self.outcome(true)
    }

    fn disable_table(&mut self, _table: &str) -> Result<(), Error> {
        self.outcome(())
    }

    fn enable_table(&mut self, _table: &str) -> Result<(), Error> {
        self.outcome(())
    }

    fn delete_table(&mut self, _table: &str) -> Result<(), Error> {
        self.outcome(())
    }

    fn create_table(
        &mut self,
        _table: &str,
        _families: &[String],
        _properties: &CreationProperties,
    ) -> Result<(), Error> {
        self.outcome(())
    }

    fn table_families(&self, _table: &str) -> Result<Vec<String>, Error> {
        self.outcome(vec!["d".to_string()])
    }

    fn row_exists(&self, _key: &[u8]) -> Result<bool, Error> {
        self.outcome(false)
    }

    fn scan_batch(
        &self,
        _plan: &ScanPlan,
        _columns: &[ColumnRef],
        _resume_after: Option<&[u8]>,
    ) -> Result<Vec<Row>, Error> {
        self.outcome(Vec::new())
    }

    fn apply(&mut self, _mutation: Mutation) -> Result<(), Error> {
        self.outcome(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.outcome(())
    }

    fn is_auto_flush(&self) -> bool {
        self.auto_flush
    }

    fn set_auto_flush(&mut self, auto_flush: bool) -> Result<(), Error> {
        self.auto_flush = auto_flush;
        Ok(())
    }
}

fn table_over(pool: &Arc<CountingPool>) -> Table {
    let shared: Arc<dyn ConnectionPool> = pool.clone();
    Table::new("events", shared)
}

fn run_every_lifecycle_op(table: &Table) -> Vec<Result<(), Error>> {
    vec![
        table.exists().map(drop),
        table.disabled().map(drop),
        table.available().map(drop),
        table.disable(),
        table.enable(),
        table.delete(),
        table.create(&["d".to_string()], &CreationProperties::new()),
        table.column_families().map(drop),
        table.key_exists(b"row").map(drop),
    ]
}

#[test]
fn every_lifecycle_op_releases_exactly_once() {
    let pool = Arc::new(CountingPool::default());
    let results = run_every_lifecycle_op(&table_over(&pool));
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(pool.counts(), (9, 9));
}

#[test]
fn failing_lifecycle_ops_release_and_report_io() {
    let pool = Arc::new(CountingPool::failing());
    let results = run_every_lifecycle_op(&table_over(&pool));
    for result in results {
        let err = result.expect_err("op should fail");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.table(), Some("events"));
        assert!(std::error::Error::source(&err).is_some());
    }
    assert_eq!(pool.counts(), (9, 9));
}

#[test]
fn only_key_exists_binds_its_handle_to_the_table() {
    let pool = Arc::new(CountingPool::default());
    run_every_lifecycle_op(&table_over(&pool));
    let requests = pool.requests.lock().expect("lock");
    let bound: Vec<_> = requests
        .iter()
        .filter_map(|request| request.table.as_deref())
        .collect();
    assert_eq!(bound, vec!["events"]);
}

#[test]
fn write_manager_takes_ownership_of_an_open_handle() {
    let pool = Arc::new(CountingPool::default());
    let table = table_over(&pool);

    let manager = table.create_write_operation_manager(None).expect("manager");
    assert!(!manager.write_buffer_configured());
    assert_eq!(pool.counts(), (1, 0));
    manager.close().expect("close");
    assert_eq!(pool.counts(), (1, 1));

    let manager = table
        .create_write_operation_manager(Some(4096))
        .expect("manager");
    assert!(manager.write_buffer_configured());
    assert!(!manager.is_auto_flush());
    assert_eq!(pool.counts(), (2, 1));
    drop(manager);
    assert_eq!(pool.counts(), (2, 2));

    let requests = pool.requests.lock().expect("lock");
    assert!(requests[0].properties.to_map().is_empty());
    assert_eq!(
        requests[1]
            .properties
            .to_map()
            .get(WRITE_BUFFER_SIZE_KEY)
            .map(String::as_str),
        Some("4096")
    );
    assert_eq!(requests[1].table.as_deref(), Some("events"));
}

#[test]
fn failed_writes_still_release_on_close() {
    let pool = Arc::new(CountingPool::failing());
    let table = table_over(&pool);
    let mut manager = table.create_write_operation_manager(None).expect("manager");
    let mut put = manager.create_put(b"row".to_vec());
    put.add_column("d", "q", false, b"v".to_vec()).expect("column");
    let err = put.execute().expect_err("write fails");
    assert_eq!(err.kind(), ErrorKind::Io);
    let err = manager.close().expect_err("flush fails");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(pool.counts(), (1, 1));
}

#[test]
fn planning_never_touches_the_pool() {
    let pool = Arc::new(CountingPool::default());
    let table = table_over(&pool);
    let mapping = Mapping::new("events", KeyType::UnsignedDate).with_key_mask("yyyy-MM-dd");
    let keys = ScanKeys::new()
        .start("2024-03-01")
        .stop("2024-03-02")
        .cache_size("10");
    let builder = table
        .create_scanner_builder_for(&mapping, &keys, None, &Variables::new())
        .expect("builder");
    assert_eq!(builder.plan().cache_size, 10);
    let lower = builder.plan().lower().expect("lower").to_vec();
    let upper = builder.plan().upper().expect("upper").to_vec();
    assert!(lower < upper);
    assert_eq!(pool.counts(), (0, 0));
}

#[test]
fn scanner_pages_through_memory_store_and_releases() {
    let pool = Arc::new(MemoryPool::new());
    let shared: Arc<dyn ConnectionPool> = pool.clone();
    let table = Table::new("people", shared);
    table
        .create(&["d".to_string()], &CreationProperties::new())
        .expect("create");

    let mut manager = table.create_write_operation_manager(Some(64)).expect("manager");
    for name in ["ada", "bob", "cy", "dee", "eve"] {
        let mut put = manager.create_put(name.as_bytes().to_vec());
        put.add_column("d", "name", false, name.as_bytes().to_vec())
            .expect("column");
        put.add_column("d", "00ff", true, b"bin".to_vec()).expect("column");
        put.execute().expect("put");
    }
    manager.close().expect("close");

    let mut builder = table.create_scanner_builder(Some(b"b".to_vec()), Some(b"e".to_vec()));
    builder.set_caching(1).add_column("d", "name", false).expect("column");
    assert_eq!(builder.columns(), &[ColumnRef::new("d", b"name".to_vec())][..]);
    assert_eq!(builder.table_name(), "people");
    let scanner = builder.build().expect("scanner");
    let rows: Vec<Row> = scanner.collect::<Result<_, _>>().expect("rows");
    let keys: Vec<&[u8]> = rows.iter().map(|row| row.key.as_slice()).collect();
    assert_eq!(keys, vec![&b"bob"[..], &b"cy"[..], &b"dee"[..]]);
    assert!(rows.iter().all(|row| row.cells.len() == 1));
    assert_eq!(rows[0].value("d", b"name"), Some(&b"bob"[..]));
    assert_eq!(pool.stats().outstanding(), 0);
}
