//! Scripted in-memory driver.
//!
//! Records every statement with the connection it ran on and answers from a
//! list of one-shot replies keyed by SQL prefix. Unscripted statements
//! succeed with no rows.

#![allow(dead_code)]

use pgcrud::{
    CrudError, CrudResult, Database, DatabaseConfig, Driver, DriverConnection, QueryOutput, Record,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded statement. `conn` is `None` for pooled one-off statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub conn: Option<usize>,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Value>),
    Affected(u64),
    Fail(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    rules: Vec<(String, Reply)>,
    next_conn: usize,
    fail_connect: bool,
    released: Vec<usize>,
    discarded: Vec<usize>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Answer the next statement starting with `prefix`.
    pub fn reply(&self, prefix: &str, reply: Reply) -> &Self {
        self.state().rules.push((prefix.to_string(), reply));
        self
    }

    pub fn rows(&self, prefix: &str, rows: Vec<Value>) -> &Self {
        self.reply(prefix, Reply::Rows(rows))
    }

    pub fn fail(&self, prefix: &str, message: &str) -> &Self {
        self.reply(prefix, Reply::Fail(message.to_string()))
    }

    pub fn fail_connect(&self) {
        self.state().fail_connect = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    pub fn released(&self) -> Vec<usize> {
        self.state().released.clone()
    }

    pub fn discarded(&self) -> Vec<usize> {
        self.state().discarded.clone()
    }

    fn answer(&self, conn: Option<usize>, sql: &str, params: &[Value]) -> CrudResult<QueryOutput> {
        let mut state = self.state();
        state.calls.push(Call {
            conn,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let reply = state
            .rules
            .iter()
            .position(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|idx| state.rules.remove(idx).1);
        match reply {
            None => Ok(QueryOutput::default()),
            Some(Reply::Rows(rows)) => Ok(QueryOutput::rows(
                rows.into_iter().map(to_record).collect(),
            )),
            Some(Reply::Affected(n)) => Ok(QueryOutput::affected(n)),
            Some(Reply::Fail(message)) => Err(CrudError::Pool(message)),
        }
    }
}

pub fn to_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    async fn query(&self, sql: &str, params: &[Value]) -> CrudResult<QueryOutput> {
        self.answer(None, sql, params)
    }

    async fn connect(&self) -> CrudResult<MockConnection> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(CrudError::Pool("pool exhausted".to_string()));
        }
        state.next_conn += 1;
        Ok(MockConnection {
            id: state.next_conn,
            driver: self.clone(),
            finished: false,
        })
    }
}

pub struct MockConnection {
    id: usize,
    driver: MockDriver,
    finished: bool,
}

impl DriverConnection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> CrudResult<QueryOutput> {
        self.driver.answer(Some(self.id), sql, params)
    }

    fn release(mut self) {
        self.finished = true;
        self.driver.state().released.push(self.id);
    }

    fn discard(mut self) {
        self.finished = true;
        self.driver.state().discarded.push(self.id);
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if !self.finished {
            self.driver.state().discarded.push(self.id);
        }
    }
}

pub fn database(config: DatabaseConfig) -> (Database<MockDriver>, MockDriver) {
    let driver = MockDriver::new();
    (Database::with_driver(driver.clone(), config), driver)
}

pub fn mock_db() -> (Database<MockDriver>, MockDriver) {
    database(DatabaseConfig::new())
}
