use std::path::PathBuf;

/// Configuration for worker invocation and admission control.
///
/// Use [`WorkerConfig::builder()`] for ergonomic construction, or
/// [`WorkerConfig::default()`] for the stock setup (`process_image.py`,
/// population 50, 20 generations, 4 concurrent workers).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable. Invoked once per job with the positional arguments
    /// `[input_ref, output_ref, population_size, generations]`.
    pub program: PathBuf,

    /// Directory output references point into. The core only derives paths
    /// here; the worker writes the bytes.
    pub output_dir: PathBuf,

    /// Population size passed to every worker. A fixed operational constant,
    /// not derived from the request's enhancement level.
    pub population_size: u32,

    /// Generation count passed to every worker.
    pub generations: u32,

    /// Maximum workers running at once (0 = unlimited). Submissions beyond
    /// the limit stay `Processing` at 0% until a slot frees up.
    pub max_concurrent: usize,

    /// Per-stream capture cap in bytes. Output past the cap is drained but
    /// no longer retained, so a runaway worker cannot exhaust memory.
    pub max_captured_bytes: usize,

    /// Buffered capacity of the job event broadcast channel.
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("process_image.py"),
            output_dir: PathBuf::from("processed"),
            population_size: 50,
            generations: 20,
            max_concurrent: 4,
            max_captured_bytes: 1024 * 1024,
            event_capacity: 64,
        }
    }
}

impl WorkerConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set the worker executable path.
    pub fn with_program(mut self, program: PathBuf) -> Self {
        self.config.program = program;
        self
    }

    /// Set the directory derived output references point into.
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output_dir = dir;
        self
    }

    /// Set the population size forwarded to workers.
    pub fn with_population_size(mut self, size: u32) -> Self {
        self.config.population_size = size;
        self
    }

    /// Set the generation count forwarded to workers.
    pub fn with_generations(mut self, generations: u32) -> Self {
        self.config.generations = generations;
        self
    }

    /// Set the concurrent worker limit (0 = unlimited).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Set the per-stream output capture cap in bytes.
    pub fn with_max_captured_bytes(mut self, bytes: usize) -> Self {
        self.config.max_captured_bytes = bytes;
        self
    }

    /// Set the event broadcast channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Build the final [`WorkerConfig`].
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.program, PathBuf::from("process_image.py"));
        assert_eq!(config.output_dir, PathBuf::from("processed"));
        assert_eq!(config.population_size, 50);
        assert_eq!(config.generations, 20);
        assert_eq!(config.max_concurrent, 4);
    }

    #[test]
    fn test_builder() {
        let config = WorkerConfig::builder()
            .with_program(PathBuf::from("/usr/local/bin/enhance"))
            .with_output_dir(PathBuf::from("/tmp/out"))
            .with_population_size(10)
            .with_generations(5)
            .with_max_concurrent(2)
            .with_max_captured_bytes(4096)
            .with_event_capacity(8)
            .build();

        assert_eq!(config.program, PathBuf::from("/usr/local/bin/enhance"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.population_size, 10);
        assert_eq!(config.generations, 5);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_captured_bytes, 4096);
        assert_eq!(config.event_capacity, 8);
    }
}
