use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub target: TargetConfig,
    pub attack: AttackConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where to point the attack and for how long.
///
/// Zero values are resolved to the engine defaults (30000ms, 100 connections).
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub connections: usize,
}

/// The attack variant and its knobs. Unset fields fall back to the engine defaults.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttackConfig {
    Slowloris(SlowlorisConfig),
    SlowBodyRead(SlowBodyReadConfig),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SlowlorisConfig {
    /// HTTP method of the request line - defaults to GET
    #[serde(default)]
    pub method: Option<String>,
    /// Pool of User-Agent values; one is picked at random per connection
    #[serde(default)]
    pub user_agents: Vec<String>,
    /// Trickle random headers to keep the header read window open
    #[serde(default)]
    pub send_gibberish: bool,
    /// Upper bound of the jittered delay between gibberish headers - defaults to 3000
    #[serde(default)]
    pub gibberish_interval_ms: u64,
    /// Deadline for each header write - defaults to 10000
    #[serde(default)]
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SlowBodyReadConfig {
    /// HTTP method of the request, usually POST or PUT - defaults to POST
    #[serde(default)]
    pub method: Option<String>,
    /// Stop feeding the body after this long - 0 feeds it until the attack ends
    #[serde(default)]
    pub body_read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Capacity of the event queue between workers and the sink
    pub queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}
