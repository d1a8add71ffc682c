#![forbid(unsafe_code)]

//! Render guard policy.
//!
//! The two knobs that bound runaway recursion: a hard depth ceiling and
//! the waterline below which the ancestor cycle scan is skipped. Both are
//! plain data so deployments can tune them; with the `policy-config`
//! feature they load from a TOML file, absent keys falling back to the
//! defaults.
//!
//! # Invariants
//!
//! 1. The depth ceiling is checked before any cycle scan runs; the scan
//!    never rescues a chain that is already past the ceiling.
//! 2. The waterline only ever skips work. Raising it trades detection
//!    latency on deep static trees for cheaper shallow renders; it cannot
//!    change which chains are ultimately caught, because the depth ceiling
//!    still terminates them.

/// Depth ceiling applied when no policy is supplied.
pub const DEFAULT_MAXIMUM_RENDER_DEPTH: u32 = 200;

/// Cycle-scan waterline applied when no policy is supplied.
pub const DEFAULT_RECURSION_SCAN_WATERLINE: u32 = 16;

/// Tunable limits for the render recursion guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct RenderPolicy {
    /// Components nested deeper than this render the depth-exceeded role
    /// instead of their content.
    pub maximum_render_depth: u32,
    /// Components at or below this depth skip the ancestor cycle scan.
    pub recursion_scan_waterline: u32,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            maximum_render_depth: DEFAULT_MAXIMUM_RENDER_DEPTH,
            recursion_scan_waterline: DEFAULT_RECURSION_SCAN_WATERLINE,
        }
    }
}

impl RenderPolicy {
    /// Policy with an explicit depth ceiling, waterline left at default.
    #[must_use]
    pub fn with_maximum_render_depth(mut self, depth: u32) -> Self {
        self.maximum_render_depth = depth;
        self
    }

    /// Policy with an explicit cycle-scan waterline.
    #[must_use]
    pub fn with_recursion_scan_waterline(mut self, waterline: u32) -> Self {
        self.recursion_scan_waterline = waterline;
        self
    }

    /// Whether a component at `depth` is past the render ceiling.
    #[must_use]
    pub fn depth_exceeded(&self, depth: u32) -> bool {
        depth > self.maximum_render_depth
    }

    /// Whether a component at `depth` should run the ancestor cycle scan.
    #[must_use]
    pub fn scan_for_cycles(&self, depth: u32) -> bool {
        depth > self.recursion_scan_waterline
    }
}

#[cfg(feature = "policy-config")]
mod config {
    use super::RenderPolicy;
    use std::path::Path;

    /// Failure loading a policy file.
    #[derive(Debug, thiserror::Error)]
    pub enum PolicyError {
        /// The file could not be read.
        #[error("failed to read policy file {path}: {source}")]
        ReadFile {
            /// Path that failed.
            path: String,
            #[source]
            source: std::io::Error,
        },
        /// The file was not valid policy TOML.
        #[error("invalid policy toml at {path}: {source}")]
        ParseToml {
            /// Path that failed.
            path: String,
            #[source]
            source: toml::de::Error,
        },
    }

    impl RenderPolicy {
        /// Parse a policy from TOML text. Missing keys keep their defaults.
        pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
            toml::from_str(text)
        }

        /// Load a policy from a TOML file.
        pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_toml_str(&text).map_err(|source| PolicyError::ParseToml {
                path: path.display().to_string(),
                source,
            })
        }
    }
}

#[cfg(feature = "policy-config")]
pub use config::PolicyError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_limits() {
        let policy = RenderPolicy::default();
        assert_eq!(policy.maximum_render_depth, 200);
        assert_eq!(policy.recursion_scan_waterline, 16);
    }

    #[test]
    fn depth_exceeded_is_strict() {
        let policy = RenderPolicy::default().with_maximum_render_depth(10);
        assert!(!policy.depth_exceeded(10));
        assert!(policy.depth_exceeded(11));
    }

    #[test]
    fn waterline_gates_cycle_scan() {
        let policy = RenderPolicy::default().with_recursion_scan_waterline(4);
        assert!(!policy.scan_for_cycles(4));
        assert!(policy.scan_for_cycles(5));
    }

    #[cfg(feature = "policy-config")]
    mod config_tests {
        use super::*;
        use std::io::Write;

        #[test]
        fn partial_toml_keeps_defaults() {
            let policy = RenderPolicy::from_toml_str("maximum_render_depth = 32\n").unwrap();
            assert_eq!(policy.maximum_render_depth, 32);
            assert_eq!(policy.recursion_scan_waterline, 16);
        }

        #[test]
        fn empty_toml_is_default() {
            let policy = RenderPolicy::from_toml_str("").unwrap();
            assert_eq!(policy, RenderPolicy::default());
        }

        #[test]
        fn load_round_trips_through_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "maximum_render_depth = 64").unwrap();
            writeln!(file, "recursion_scan_waterline = 8").unwrap();
            let policy = RenderPolicy::load(file.path()).unwrap();
            assert_eq!(policy.maximum_render_depth, 64);
            assert_eq!(policy.recursion_scan_waterline, 8);
        }

        #[test]
        fn malformed_toml_reports_path() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "maximum_render_depth = \"not a number\"").unwrap();
            let err = RenderPolicy::load(file.path()).unwrap_err();
            assert!(err.to_string().contains("invalid policy toml"));
        }
    }
}
