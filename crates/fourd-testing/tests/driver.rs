//! End-to-end driver tests against the mock server.

#![allow(clippy::unwrap_used)]

use fourd_client::{Connection, Error, Params, ResultKind, Value};
use fourd_pool::{Pool, PoolConfig};
use fourd_testing::{Mock4dServer, MockColumn, MockResponse, MockValue, config_for};

#[tokio::test]
async fn query_returns_rows_and_leaves_no_pending_commands() {
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT * FROM Artikel",
            MockResponse::result_set(
                vec![MockColumn::long("id"), MockColumn::string("naam")],
                vec![
                    vec![MockValue::Long(1), MockValue::Text("bout".into())],
                    vec![MockValue::Long(2), MockValue::Text("moer".into())],
                ],
            ),
        )
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let result = conn
        .query("SELECT * FROM Artikel", &Params::None)
        .await
        .unwrap();

    assert_eq!(result.kind, ResultKind::ResultSet);
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].get_i64("id"), Some(1));
    assert_eq!(result.rows[0].get_str("naam"), Some("bout"));
    assert_eq!(result.rows[1].get_i64("id"), Some(2));
    assert_eq!(result.rows[1].get_str("naam"), Some("moer"));
    assert_eq!(conn.pending_commands(), 0);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn pagination_is_driven_to_completion_in_order() {
    let rows: Vec<Vec<MockValue>> = (1..=5).map(|n| vec![MockValue::Long(n)]).collect();
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT n FROM T",
            MockResponse::paginated(vec![MockColumn::long("n")], rows, 2),
        )
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let result = conn.query("SELECT n FROM T", &Params::None).await.unwrap();

    // Three pages (2 + 2 + 1) folded into one result, order preserved.
    assert_eq!(result.len(), 5);
    let values: Vec<i64> = result
        .rows
        .iter()
        .map(|row| row.get_i64("n").unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
    assert_eq!(conn.pending_commands(), 0);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn server_error_fails_the_query_but_not_the_connection() {
    let server = Mock4dServer::builder()
        .with_response("SELECT broken", MockResponse::error(1301, "syntax error"))
        .with_response("DELETE FROM T", MockResponse::affected(4))
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let err = conn.query("SELECT broken", &Params::None).await.unwrap_err();
    assert_eq!(err.server_code(), Some(1301));
    assert!(conn.is_connected());
    assert_eq!(conn.pending_commands(), 0);

    // The session survives a statement-level error.
    let result = conn.query("DELETE FROM T", &Params::None).await.unwrap();
    assert_eq!(result.kind, ResultKind::UpdateCount);
    assert_eq!(result.affected_rows, Some(4));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn login_rejection_surfaces_as_server_error() {
    let server = Mock4dServer::builder()
        .with_login_error(1004, "invalid user name or password")
        .build()
        .await
        .unwrap();

    let err = Connection::connect(config_for(&server)).await.unwrap_err();
    assert_eq!(err.server_code(), Some(1004));
}

#[tokio::test]
async fn updatable_columns_carry_a_record_number() {
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT naam FROM T",
            MockResponse::result_set(
                vec![MockColumn::string("naam").with_updatable(true)],
                vec![
                    vec![MockValue::Text("een".into())],
                    vec![MockValue::Text("twee".into())],
                ],
            ),
        )
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let result = conn.query("SELECT naam FROM T", &Params::None).await.unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.rows[0].columns()[0], "__RECORDNR__");
    assert_eq!(result.rows[0].get_i64("__RECORDNR__"), Some(1));
    assert_eq!(result.rows[1].get_i64("__RECORDNR__"), Some(2));
    assert_eq!(result.rows[1].get_str("naam"), Some("twee"));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn null_and_numeric_values_decode() {
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT a, b, c FROM T",
            MockResponse::result_set(
                vec![
                    MockColumn::long8("a"),
                    MockColumn::real("b"),
                    MockColumn::string("c"),
                ],
                vec![vec![
                    MockValue::Long8(1 << 40),
                    MockValue::Real(2.5),
                    MockValue::Null,
                ]],
            ),
        )
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let result = conn
        .query("SELECT a, b, c FROM T", &Params::None)
        .await
        .unwrap();

    assert_eq!(result.rows[0].get_i64("a"), Some(1 << 40));
    assert_eq!(result.rows[0].get_f64("b"), Some(2.5));
    assert_eq!(result.rows[0].get("c"), Some(&Value::Null));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn fatal_row_error_fails_the_query_and_kills_the_connection() {
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT x FROM T",
            MockResponse::result_set(
                vec![MockColumn::long("x")],
                vec![vec![MockValue::ErrorCode(2201)]],
            ),
        )
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let err = conn.query("SELECT x FROM T", &Params::None).await.unwrap_err();
    assert_eq!(err.server_code(), Some(2201));

    // The binary row stream cannot be resynchronized past the error.
    assert!(!conn.is_connected());
    let err = conn.query("SELECT 1", &Params::None).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}

#[tokio::test]
async fn statement_parameters_are_substituted_before_send() {
    // The mock matches on the final statement text, so a hit proves the
    // placeholder was substituted client-side.
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT * FROM T WHERE naam = 'bout'",
            MockResponse::result_set(
                vec![MockColumn::long("id")],
                vec![vec![MockValue::Long(7)]],
            ),
        )
        .with_default_response(MockResponse::error(9999, "unexpected statement"))
        .build()
        .await
        .unwrap();

    let mut conn = Connection::connect(config_for(&server)).await.unwrap();
    let result = conn
        .query(
            "SELECT * FROM T WHERE naam = $0",
            &Params::positional(["bout"]),
        )
        .await
        .unwrap();
    assert_eq!(result.rows[0].get_i64("id"), Some(7));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn pool_hands_out_and_reuses_connections() {
    let server = Mock4dServer::builder()
        .with_response(
            "SELECT 1",
            MockResponse::result_set(
                vec![MockColumn::long("n")],
                vec![vec![MockValue::Long(1)]],
            ),
        )
        .build()
        .await
        .unwrap();

    let pool = Pool::new(config_for(&server), PoolConfig::new().max_connections(2));

    {
        let mut conn = pool.get().await.unwrap();
        let result = conn.query("SELECT 1", &Params::None).await.unwrap();
        assert_eq!(result.rows[0].get_i64("n"), Some(1));
        assert_eq!(pool.status().in_use, 1);
    }
    assert_eq!(pool.status().available, 1);

    // The returned connection is reissued instead of a new login.
    {
        let conn = pool.get().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(pool.status().available, 0);
        assert_eq!(pool.status().in_use, 1);
    }

    // One-shot convenience: lease, query, return.
    let result = pool.query("SELECT 1", &Params::None).await.unwrap();
    assert_eq!(result.rows[0].get_i64("n"), Some(1));

    pool.close().await;
    assert!(pool.is_closed());
    assert!(matches!(
        pool.get().await,
        Err(fourd_pool::PoolError::PoolClosed)
    ));
}
