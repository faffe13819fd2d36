//! Synthesiser configuration.
//!
//! One flat flag struct, filled in by the driver from its option handling.
//! Every field maps to a facet of the emitted program rather than of the
//! synthesiser itself.

/// Which provenance instrumentation the emitted program carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvenanceMode {
    Explain,
    Explore,
    SubtreeHeights,
}

/// Configuration for a single synthesis run.
#[derive(Clone, Debug)]
pub struct SynthesiserConfig {
    /// Bracket emitted nodes with BEGIN/END comments.
    pub debug_report: bool,
    /// Verbose mode: implies the comments and enables signal-handler logging
    /// in the emitted program.
    pub verbose: bool,
    /// Profile log filename; enables all profiling scaffolding when set.
    pub profile: Option<String>,
    /// Spawn the live profile UI thread in the emitted `runAll`.
    pub live_profile: bool,
    pub provenance: Option<ProvenanceMode>,
    /// Default worker count compiled into the emitted option parser.
    pub jobs: usize,
    /// Version string recorded as a profile configuration entry.
    pub version: String,
    /// Path of the Datalog source, echoed into the emitted option parser.
    pub source: String,
}

impl Default for SynthesiserConfig {
    fn default() -> Self {
        SynthesiserConfig {
            debug_report: false,
            verbose: false,
            profile: None,
            live_profile: false,
            provenance: None,
            jobs: 1,
            version: String::new(),
            source: String::new(),
        }
    }
}

impl SynthesiserConfig {
    /// Config with profiling directed at the given log file.
    pub fn profiled(path: impl Into<String>) -> Self {
        SynthesiserConfig {
            profile: Some(path.into()),
            ..SynthesiserConfig::default()
        }
    }

    pub fn profiling(&self) -> bool {
        self.profile.is_some()
    }

    /// Whether BEGIN/END comments are emitted.
    pub fn comments(&self) -> bool {
        self.debug_report || self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_quiet() {
        let config = SynthesiserConfig::default();
        assert!(!config.comments());
        assert!(!config.profiling());
        assert!(config.provenance.is_none());
    }

    #[test]
    fn test_profiled_constructor() {
        let config = SynthesiserConfig::profiled("prof.log");
        assert!(config.profiling());
        assert_eq!(config.profile.as_deref(), Some("prof.log"));
    }
}
