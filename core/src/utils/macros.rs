//! Helper macros shared across the registries and the chunk coordinator

/// Casts a scylla row error to a `CoreError` and logs it, for use in iterator filters
/// where one bad row shouldn't abort the whole scan
#[doc(hidden)]
#[macro_export]
macro_rules! log_scylla_err {
    ($result:expr) => {
        match $result {
            Ok(res) => Some(res),
            Err(error) => {
                let error = $crate::utils::CoreError::from(error);
                tracing::event!(tracing::Level::ERROR, msg = &error.msg);
                None
            }
        }
    };
}
