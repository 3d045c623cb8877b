//! Sets up tracing to stdout/stderr for the core

use tracing_subscriber::prelude::*;

use crate::conf::Tracing;

/// Log a message at the info level
#[macro_export]
macro_rules! info {
    ($level:expr, $($msg:tt)+) => {
        if $level ==  crate::conf::LogLevel::Info
        || $level ==  crate::conf::LogLevel::Debug
        || $level ==  crate::conf::LogLevel::Trace  {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "INFO", "msg": $($msg)+}));
        }
    }
}

/// Log a message at the setup level
#[macro_export]
macro_rules! setup {
    ($level:expr, $($msg:tt)+) => {
        if $level ==  crate::conf::LogLevel::Setup
        || $level ==  crate::conf::LogLevel::Info
        || $level ==  crate::conf::LogLevel::Debug
        || $level ==  crate::conf::LogLevel::Trace  {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "SETP", "msg": $($msg)+}));
        }
    }
}

/// Log a message at the error level
#[macro_export]
macro_rules! error {
    ($level:expr, $($msg:tt)+) => {
        if $level !=  crate::conf::LogLevel::Off {
            println!("{}", serde_json::json!({"timestamp": chrono::Utc::now(), "level": "ERRO", "msg": $($msg)+}));
        }
    }
}

/// Get the current trace id for the active span, if any
pub fn get_trace() -> Option<String> {
    use tracing::Span;
    let context = Span::current();
    context.id().map(|id| id.into_u64().to_string())
}

/// Setup our stdout/stderr tracer
///
/// This core talks to no RPC transport, so there's no request span to export
/// externally; tracing is local only, driven by `#[tracing::instrument]` on
/// the registry/coordinator methods.
///
/// # Arguments
///
/// * `name` - The name of the service to trace
/// * `trace_conf` - The tracing settings to use
pub fn setup(name: &str, trace_conf: &Tracing) {
    info!(
        trace_conf.local.level,
        format!("Sending {} for {name} to stdout", trace_conf.local.level)
    );
    let layer = tracing_subscriber::fmt::layer().with_filter(trace_conf.local.level.to_filter());
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .expect("Failed to register stdout registry");
}
