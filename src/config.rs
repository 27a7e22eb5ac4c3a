use std::time::Duration;

use clap::Args;

pub const DEFAULT_SHEET: &str = "trabajadores";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_GOAL_COUNT: usize = 4;

/// Highest score a single rubric factor accepts.
pub const FACTOR_MAX: u8 = 4;

pub const RUBRIC_FACTORS: [&str; 12] = [
    "CONOCIMIENTO DEL PUESTO",
    "CRITERIO",
    "CALIDAD DEL TRABAJO",
    "TÉCNICA Y ORGANIZACIÓN DEL TRABAJO",
    "NECESIDAD DE SUPERVISIÓN",
    "CAPACITACIÓN RECIBIDA",
    "INICIATIVA",
    "COLABORACIÓN Y DISCRECIÓN",
    "RESPONSABILIDAD Y DISCIPLINA",
    "TRABAJO EN EQUIPO",
    "RELACIONES INTERPERSONALES",
    "MEJORA CONTINUA",
];

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Name of the sheet holding profiles and evaluations
    #[arg(long, env = "EVAL_SHEET", default_value = DEFAULT_SHEET, global = true)]
    pub sheet: String,

    /// Flush once this many rows are buffered
    #[arg(long, env = "EVAL_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE, global = true)]
    pub batch_size: usize,

    /// Flush on the next enqueue once this many seconds passed since the last flush
    #[arg(long, env = "EVAL_FLUSH_INTERVAL_SECS", default_value_t = DEFAULT_FLUSH_INTERVAL_SECS, global = true)]
    pub flush_interval_secs: u64,

    /// Lifetime of cached sheet reads
    #[arg(long, env = "EVAL_CACHE_TTL_SECS", default_value_t = DEFAULT_CACHE_TTL_SECS, global = true)]
    pub cache_ttl_secs: u64,

    /// Rows the writer queue accepts before enqueue waits
    #[arg(long, env = "EVAL_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY, global = true)]
    pub queue_capacity: usize,

    /// Number of goals per profile
    #[arg(long, env = "EVAL_GOAL_COUNT", default_value_t = DEFAULT_GOAL_COUNT, global = true)]
    pub goal_count: usize,

    /// Fail on a mismatched header instead of rewriting it
    #[arg(long, env = "EVAL_NO_REPAIR", global = true)]
    pub no_repair: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "EVAL_LOG_JSON", global = true)]
    pub log_json: bool,
}

impl Settings {
    pub fn rubric(&self) -> RubricConfig {
        RubricConfig {
            goal_count: self.goal_count,
            factors: RUBRIC_FACTORS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            batch_size: self.batch_size.max(1),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// Shape of the rubric: how many goals a profile carries and which factors are scored.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricConfig {
    pub goal_count: usize,
    pub factors: Vec<String>,
}

impl RubricConfig {
    pub fn min_score(&self) -> u32 {
        self.factors.len() as u32
    }

    pub fn max_score(&self) -> u32 {
        self.factors.len() as u32 * FACTOR_MAX as u32
    }
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            goal_count: DEFAULT_GOAL_COUNT,
            factors: RUBRIC_FACTORS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushPolicy {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
        }
    }
}
