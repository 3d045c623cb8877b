//! The shared config for the persistence/coordination core
use std::path::Path;

/// Helps serde default the amount of time for scylla to get setup
fn default_scylla_setup_time() -> u32 {
    120
}

/// Helps serde default the namespace used in the backend
fn default_namespace() -> String {
    "weft".to_owned()
}

/// Helps serde default the chunk retry budget (`MaxPods`)
fn default_max_pods() -> i32 {
    3
}

/// The settings for sending traces to stdout/stderr
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TracingLocal {
    /// The log level to use for stdout/stderr
    pub level: LogLevel,
}

/// The tracing settings to use
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Tracing {
    /// The settings for sending traces to stdout/stderr
    #[serde(default)]
    pub local: TracingLocal,
}

/// The log level to set
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Do not log any info
    Off,
    /// Log at the error level
    Error,
    /// Only setup and up info
    Setup,
    /// Log at the info level
    #[default]
    Info,
    /// Log at the debug level
    Debug,
    /// Log at the tracing level
    Trace,
}

impl LogLevel {
    /// Cast this log level to a tracing filter
    #[must_use]
    pub fn to_filter(self) -> tracing::metadata::LevelFilter {
        match self {
            LogLevel::Off => tracing::metadata::LevelFilter::OFF,
            LogLevel::Error => tracing::metadata::LevelFilter::ERROR,
            LogLevel::Setup | LogLevel::Info => tracing::metadata::LevelFilter::INFO,
            LogLevel::Debug => tracing::metadata::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::metadata::LevelFilter::TRACE,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Setup => "setup",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{name}")
    }
}

/// Redis settings, used only for the change-feed streams in this core, not as a primary store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Redis {
    /// The host redis is reachable at
    pub host: String,
    /// The port redis is bound to
    pub port: u16,
    /// The number of connections to have in the connection pool
    pub pool_size: Option<u32>,
    /// A username to use if redis has authentication enabled
    pub username: Option<String>,
    /// A password to use if redis has authentication enabled
    pub password: Option<String>,
}

/// The authentication settings to use with scylla
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScyllaAuth {
    /// The username to use when authenticating
    pub username: String,
    /// The password to use when authenticating
    pub password: String,
}

/// Scylla settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Scylla {
    /// The list of nodes to connect to
    pub nodes: Vec<String>,
    /// The replication factor to use for the keyspace
    pub replication: u64,
    /// The amount of time to wait for scylla to get setup
    #[serde(default = "default_scylla_setup_time")]
    pub setup_time: u32,
    /// The auth creds to use when authenticating to scylla
    pub auth: Option<ScyllaAuth>,
}

/// Chunk coordination settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Chunks {
    /// The default retry budget (`MaxPods`) used by `RevokeChunk` when callers don't override it
    #[serde(default = "default_max_pods")]
    pub default_max_pods: i32,
}

impl Default for Chunks {
    fn default() -> Self {
        Chunks {
            default_max_pods: default_max_pods(),
        }
    }
}

/// Core-wide settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Weft {
    /// The namespace (keyspace) to use in the backend
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// The tracing settings to use
    #[serde(default)]
    pub tracing: Tracing,
    /// Chunk coordination settings
    #[serde(default)]
    pub chunks: Chunks,
}

/// The config for the persistence/coordination core
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Conf {
    /// Allow scylla nodes to easily be overwritten with a single node for testing
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scylla_override: Option<String>,
    /// Core wide settings
    pub weft: Weft,
    /// Redis settings (change-feed streams)
    pub redis: Redis,
    /// Scylla settings (durable storage)
    pub scylla: Scylla,
}

impl Conf {
    /// Creates a new [`Conf`] object
    ///
    /// # Arguments
    ///
    /// * `path` - The path to use when reading the config file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let mut conf: Conf = config::Config::builder()
            // load from a file first
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            // then overlay any environment args ontop
            .add_source(
                config::Environment::with_prefix("weft")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        // allow the override of the scylla node list to make testing easier
        if let Some(node) = conf.scylla_override.take() {
            conf.scylla.nodes = node
                .split(',')
                .map(std::borrow::ToOwned::to_owned)
                .collect();
        }
        Ok(conf)
    }

    /// Change the namespace for this config
    ///
    /// # Arguments
    ///
    /// * `namespace` - The namespace for this config
    #[must_use]
    pub fn namespace<T: Into<String>>(mut self, namespace: T) -> Self {
        self.weft.namespace = namespace.into();
        self
    }
}
