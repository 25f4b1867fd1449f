//! Pipeline configuration.

use std::{path::Path, time::Duration};

use fanflow_common::{Result, error::Error, verify_arg};
use serde::{Deserialize, Serialize};

/// Settings for a [`Pipeline`](crate::pipeline::Pipeline).
///
/// Every run of a pipeline uses the same configuration. The JSON form uses the
/// field names below, with the deadline given as `deadline_ms`:
///
/// ```json
/// { "workers": 10, "input_capacity": 64, "output_capacity": 64, "deadline_ms": 5000 }
/// ```
///
/// Missing fields take their [`Default`] values. Channel capacities that are
/// not given follow the worker count, as they do for [`with_workers`](Self::with_workers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct PipelineConfig {
    /// Number of worker threads (K). Must be at least 1.
    pub workers: usize,
    /// Capacity of the input channel between the source and the workers.
    pub input_capacity: usize,
    /// Capacity of the output channel between the workers and the sink.
    pub output_capacity: usize,
    /// Optional time limit for a run, after which it is stopped with
    /// [`ShutdownReason::Deadline`](crate::shutdown::ShutdownReason::Deadline).
    #[serde(rename = "deadline_ms", with = "deadline_millis")]
    pub deadline: Option<Duration>,
    /// Prefix for the names of the threads a run spawns.
    pub thread_name_prefix: String,
}

impl PipelineConfig {
    /// Sets the worker count. Capacities still at their default of twice the
    /// previous worker count are rescaled to twice the new one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        let derived = default_capacity(self.workers);
        if self.input_capacity == derived {
            self.input_capacity = default_capacity(workers);
        }
        if self.output_capacity == derived {
            self.output_capacity = default_capacity(workers);
        }
        self.workers = workers;
        self
    }

    pub fn with_input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity;
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Checks that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(workers, self.workers >= 1);
        verify_arg!(input_capacity, self.input_capacity >= 1);
        verify_arg!(output_capacity, self.output_capacity >= 1);
        verify_arg!(thread_name_prefix, !self.thread_name_prefix.is_empty());
        verify_arg!(thread_name_prefix, !self.thread_name_prefix.contains('\0'));
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| Error::invalid_arg("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_json(&json)
    }

    pub(crate) fn thread_name(&self, role: &str) -> String {
        format!("{}-{role}", self.thread_name_prefix)
    }

    /// The default worker count: the number of logical CPUs, or 8 if it cannot
    /// be determined.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = Self::default_workers();
        PipelineConfig {
            workers,
            input_capacity: default_capacity(workers),
            output_capacity: default_capacity(workers),
            deadline: None,
            thread_name_prefix: "fanflow".to_string(),
        }
    }
}

fn default_capacity(workers: usize) -> usize {
    workers.saturating_mul(2).max(1)
}

/// The JSON form of [`PipelineConfig`], where every field is optional.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    workers: Option<usize>,
    input_capacity: Option<usize>,
    output_capacity: Option<usize>,
    #[serde(default, rename = "deadline_ms", with = "deadline_millis")]
    deadline: Option<Duration>,
    thread_name_prefix: Option<String>,
}

impl From<ConfigFile> for PipelineConfig {
    fn from(file: ConfigFile) -> Self {
        let mut config = PipelineConfig::default();
        if let Some(workers) = file.workers {
            config = config.with_workers(workers);
        }
        if let Some(capacity) = file.input_capacity {
            config.input_capacity = capacity;
        }
        if let Some(capacity) = file.output_capacity {
            config.output_capacity = capacity;
        }
        config.deadline = file.deadline;
        if let Some(prefix) = file.thread_name_prefix {
            config.thread_name_prefix = prefix;
        }
        config
    }
}

mod deadline_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
