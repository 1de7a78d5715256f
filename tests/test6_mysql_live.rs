#![cfg(feature = "mysql")]
//! MySQL round trip against a live server.
//!
//! Ignored by default; run with `cargo test -- --ignored` after exporting
//! `SQL_OFFLOAD_MYSQL_HOST` / `_USER` / `_PASSWORD` / `_DATABASE` (and
//! optionally `_PORT`) for a throwaway database.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use sql_offload::prelude::*;

fn config_from_env() -> Option<PoolConfig> {
    let host = std::env::var("SQL_OFFLOAD_MYSQL_HOST").ok()?;
    let user = std::env::var("SQL_OFFLOAD_MYSQL_USER").ok()?;
    let password = std::env::var("SQL_OFFLOAD_MYSQL_PASSWORD").ok()?;
    let database = std::env::var("SQL_OFFLOAD_MYSQL_DATABASE").ok()?;
    let port = std::env::var("SQL_OFFLOAD_MYSQL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3306);
    Some(PoolConfig::mysql(
        MySqlConfig {
            host,
            port,
            user,
            password,
            database,
        },
        2,
    ))
}

fn wait_for(pool: &mut WorkerPool, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !done() {
        pool.process_completions();
        assert!(Instant::now() < deadline, "timed out waiting for completions");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
#[ignore = "requires a live MySQL server; see module docs"]
fn mysql_create_insert_select_round_trip() {
    let config = config_from_env().expect("MySQL env vars not set");
    let mut pool = WorkerPool::new(&config).expect("pool");

    let stage = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let stage = Rc::clone(&stage);
        pool.submit_with(
            SqlTask::batch(
                "DROP TABLE IF EXISTS sql_offload_test;
                 CREATE TABLE sql_offload_test (player VARCHAR(64), points BIGINT);",
            ),
            Callbacks::new().on_success(move |_| stage.borrow_mut().push("ddl".into())),
        );
    }
    wait_for(&mut pool, || stage.borrow().contains(&"ddl".to_string()));

    let inserted = Rc::new(RefCell::new(0u64));
    {
        let inserted = Rc::clone(&inserted);
        pool.submit_with(
            SqlTask::dml(
                "INSERT INTO {table} (player, points) VALUES (?, ?)",
                vec![RowValues::Text("alice".into()), RowValues::Int(120)],
            )
            .with_table("sql_offload_test"),
            Callbacks::new().on_success(move |output| {
                *inserted.borrow_mut() += output.rows_affected().expect("dml count");
            }),
        );
    }
    wait_for(&mut pool, || *inserted.borrow() == 1);

    let rows = Rc::new(RefCell::new(None::<ResultSet>));
    {
        let rows = Rc::clone(&rows);
        pool.submit_with(
            SqlTask::select(
                "SELECT player, points FROM {table} WHERE points > ?",
                vec![RowValues::Int(100)],
            )
            .with_table("sql_offload_test"),
            Callbacks::new().on_success(move |output| {
                *rows.borrow_mut() = output.rows().cloned();
            }),
        );
    }
    wait_for(&mut pool, || rows.borrow().is_some());

    let guard = rows.borrow();
    let result = guard.as_ref().expect("rows delivered");
    assert_eq!(result.len(), 1);
    assert_eq!(
        result.rows[0].get("player").and_then(RowValues::as_text),
        Some("alice")
    );
    assert_eq!(result.rows[0].get("points"), Some(&RowValues::Int(120)));

    pool.shutdown();
}

#[test]
#[ignore = "requires a live MySQL server; see module docs"]
fn reconnects_after_connection_killed() {
    use mysql::prelude::Queryable;

    let config = config_from_env().expect("MySQL env vars not set");
    let mut pool = WorkerPool::new(&PoolConfig::mysql(
        config.mysql.clone().expect("mysql section"),
        1,
    ))
    .expect("pool");

    // Kill the worker's own session so the server drops the connection out
    // from under it.
    let killed = Rc::new(RefCell::new(false));
    {
        let killed = Rc::clone(&killed);
        pool.submit_with(
            SqlTask::from_fn(|conn, _table| {
                match conn {
                    SqlConnection::MySql(conn) => {
                        let id = conn.connection_id();
                        // The statement errors once the session dies; that is
                        // the point, not a failure of the test.
                        let _ = conn.query_drop(format!("KILL {id}"));
                    }
                    #[allow(unreachable_patterns)]
                    _ => {}
                }
                Ok(TaskOutput::None)
            }),
            Callbacks::new().on_success(move |_| *killed.borrow_mut() = true),
        );
    }
    wait_for(&mut pool, || *killed.borrow());

    // The next task must find the dead connection, reconnect, and run.
    let answer = Rc::new(RefCell::new(None::<i64>));
    {
        let answer = Rc::clone(&answer);
        pool.submit_with(
            SqlTask::select("SELECT 40 + 2 AS answer", vec![]),
            Callbacks::new().on_success(move |output| {
                *answer.borrow_mut() = output
                    .rows()
                    .and_then(|rows| rows.rows.first())
                    .and_then(|row| row.get("answer"))
                    .and_then(RowValues::as_int);
            }),
        );
    }
    wait_for(&mut pool, || answer.borrow().is_some());
    assert_eq!(*answer.borrow(), Some(42));

    pool.shutdown();
}
