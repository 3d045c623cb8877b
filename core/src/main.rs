mod args;

use clap::Parser;

/// Connect to the backing stores and make sure the schema is ready
///
/// This binary does not serve anything. There is no RPC transport in this
/// crate's scope. It exists purely as the boot-sequence smoke test an
/// embedding service would run before starting its own listener.
#[tokio::main]
async fn main() {
    // load command line args
    let args = args::Args::parse();
    // load config
    let conf = weft_core::conf::Conf::new(&args.config).expect("Failed to load config");
    let log_level = conf.weft.tracing.local.level;
    weft_core::utils::trace::setup("weft-core", &conf.weft.tracing);
    // connect to scylla + redis
    let shared = weft_core::connect(conf).await;
    // make sure the schema is ready
    weft_core::models::backends::schema::initialize(&shared)
        .await
        .expect("Failed to initialize schema");
    weft_core::models::backends::schema::check(&shared)
        .await
        .expect("Schema is not ready");
    weft_core::info!(log_level, "core schema ready".to_string());
}
