//! Shared helpers for talking to the redis-backed change-feed streams and scylla

use bb8_redis::{bb8, RedisConnectionManager};
use scylla::frame::response::result::CqlValue;
use scylla::QueryResult;

use crate::unavailable;
use crate::utils::{CoreError, Shared};

/// Gets a connection from the Redis connection pool
///
/// # Arguments
///
/// * `shared` - Shared objects (scylla session + redis pool)
pub async fn get_conn(
    shared: &Shared,
) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, CoreError> {
    match shared.redis.get().await {
        Ok(conn) => Ok(conn),
        Err(error) => unavailable!(format!("Failed to get connection from pool: {error:#?}")),
    }
}

/// Read the `[applied]` flag off a lightweight-transaction result
///
/// Scylla always returns `[applied]` as the first column, but only that one
/// column when the transaction applies; when it doesn't, the row also
/// carries the tested/existing columns (e.g. every column on a failed
/// `INSERT ... IF NOT EXISTS`, or the guard columns on a failed conditional
/// `UPDATE`). Deserializing straight into a fixed-arity `(bool,)` tuple only
/// works on the applied branch, so this reads column 0 out of the raw row
/// instead of assuming the row's shape.
///
/// # Arguments
///
/// * `result` - The result of an `INSERT ... IF NOT EXISTS` or conditional `UPDATE`
pub fn lwt_applied(result: QueryResult) -> Result<bool, CoreError> {
    let rows_result = result.into_rows_result()?;
    let Some(mut row) = rows_result.maybe_first_row::<scylla::frame::response::result::Row>()?
    else {
        return Ok(false);
    };
    match row.columns.first_mut().and_then(Option::take) {
        Some(CqlValue::Boolean(applied)) => Ok(applied),
        other => crate::internal_err!(format!(
            "Expected `[applied]` as the first lwt column, got {other:?}"
        )),
    }
}
