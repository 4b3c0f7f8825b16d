//! Evaluation settings.
//!
//! Settings are read once per thread from `lazet/config.json` in xdg config directories,
//! then `LAZET_*` environment variables override them. Missing or unparsable config
//! falls back to defaults.

use std::cell::RefCell;

use nanoserde::DeJson;

/// Instruction set tier used for vectorized evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum VectorMode {
    /// Scalar evaluation
    #[default]
    None,
    /// 128 bit vectors
    Sse3,
    /// 256 bit vectors
    Avx,
    /// 512 bit vectors
    Avx512,
}

impl VectorMode {
    /// Best mode supported by this cpu
    #[must_use]
    pub fn detect() -> VectorMode {
        #[cfg(target_arch = "x86_64")]
        let mode = if std::arch::is_x86_feature_detected!("avx512f") {
            VectorMode::Avx512
        } else if std::arch::is_x86_feature_detected!("avx") {
            VectorMode::Avx
        } else if std::arch::is_x86_feature_detected!("sse3") {
            VectorMode::Sse3
        } else {
            VectorMode::None
        };
        // neon, same width as sse
        #[cfg(target_arch = "aarch64")]
        let mode = VectorMode::Sse3;
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        let mode = VectorMode::None;
        mode
    }

    /// Width of vector register in bytes
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            VectorMode::None => 0,
            VectorMode::Sse3 => 16,
            VectorMode::Avx => 32,
            VectorMode::Avx512 => 64,
        }
    }

    /// Number of elements of `byte_size` bytes in one vector
    #[must_use]
    pub const fn lanes(self, byte_size: usize) -> usize {
        if byte_size == 0 {
            0
        } else {
            self.bytes() / byte_size
        }
    }

    fn parse(value: &str) -> Option<VectorMode> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(VectorMode::None),
            "sse3" => Some(VectorMode::Sse3),
            "avx" => Some(VectorMode::Avx),
            "avx512" => Some(VectorMode::Avx512),
            _ => None,
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Use vector loads for linear expressions
    pub vectorize: bool,
    /// Vector width
    pub vector_mode: VectorMode,
    /// Use rayon in cpu kernels
    pub parallel: bool,
    /// Minimum number of output elements before kernels go parallel
    pub parallel_threshold: usize,
    /// Offload supported operators when an accelerator is set
    pub gpu: bool,
    /// Record event counters
    pub counters: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vectorize: true,
            vector_mode: VectorMode::detect(),
            parallel: true,
            parallel_threshold: 4096,
            gpu: true,
            counters: false,
        }
    }
}

/// Layout of config.json, every field is optional
#[derive(Debug, Default, DeJson)]
struct ConfigFile {
    vectorize: Option<bool>,
    vector_mode: Option<String>,
    parallel: Option<bool>,
    parallel_threshold: Option<usize>,
    gpu: Option<bool>,
    counters: Option<bool>,
}

impl Config {
    /// Read config from disk and environment
    #[must_use]
    pub fn load() -> Config {
        let mut config = Config::default();
        if let Some(file) = find_config_file("lazet/config.json").and_then(|file| {
            ConfigFile::deserialize_json(&file)
                .map_err(|e| log::info!("Failed to parse lazet/config.json, {e}"))
                .ok()
        }) {
            log::debug!("Config successfully read and parsed.");
            config.merge(file);
        } else {
            log::debug!("No config file, using defaults.");
        }
        config.apply_env();
        config
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(x) = file.vectorize {
            self.vectorize = x;
        }
        if let Some(x) = file.vector_mode.as_deref().and_then(VectorMode::parse) {
            self.vector_mode = x;
        }
        if let Some(x) = file.parallel {
            self.parallel = x;
        }
        if let Some(x) = file.parallel_threshold {
            self.parallel_threshold = x;
        }
        if let Some(x) = file.gpu {
            self.gpu = x;
        }
        if let Some(x) = file.counters {
            self.counters = x;
        }
    }

    fn apply_env(&mut self) {
        if let Some(x) = env_flag("LAZET_VECTORIZE") {
            self.vectorize = x;
        }
        if let Some(x) = std::env::var("LAZET_VECTOR_MODE")
            .ok()
            .and_then(|x| VectorMode::parse(&x))
        {
            self.vector_mode = x;
        }
        if let Some(x) = env_flag("LAZET_PARALLEL") {
            self.parallel = x;
        }
        if let Some(x) = env_flag("LAZET_GPU") {
            self.gpu = x;
        }
        if let Some(x) = env_flag("LAZET_COUNTERS") {
            self.counters = x;
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let x = std::env::var(name).ok()?;
    x.parse::<u32>().ok().map(|x| x != 0)
}

/// Search through xdg config directories and return content of the first file
/// found at `name`, relative to config directory.
#[must_use]
pub fn find_config_file(name: &str) -> Option<String> {
    xdg::BaseDirectories::new()
        .map_err(|e| log::info!("Failed to find config directories for {name}, {e}"))
        .ok()
        .map(|bd| {
            let mut dirs = bd.get_config_dirs();
            dirs.push(bd.get_config_home());
            dirs
        })
        .and_then(|paths| {
            paths.into_iter().find_map(|mut path| {
                path.push(name);
                std::fs::read_to_string(&path).ok()
            })
        })
}

thread_local! {
    static CONFIG: RefCell<Option<Config>> = const { RefCell::new(None) };
}

/// Config of this thread, loaded on first use
#[must_use]
pub fn current() -> Config {
    CONFIG.with(|c| *c.borrow_mut().get_or_insert_with(Config::load))
}

/// Replace config of this thread
pub fn set(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = Some(config));
}

/// Modify config of this thread
pub fn update(f: impl FnOnce(&mut Config)) {
    let mut config = current();
    f(&mut config);
    set(config);
}
