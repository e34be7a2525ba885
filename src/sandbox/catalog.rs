//! The closed catalog of runtimes a sandbox can be started with.
//!
//! Every runtime maps to a vetted container image and a language family.
//! The set is an enum on purpose: callers cannot smuggle an arbitrary image
//! reference in through a runtime identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SandboxError};

/// Placeholder replaced by the staged source file path in command templates.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// A language family, which decides the source file extension and the
/// command used to run a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    Python,
    JavaScript,
    Ruby,
    Shell,
}

impl LanguageFamily {
    /// Resolve a caller-supplied language name (case-insensitive).
    pub fn from_language(language: &str) -> Option<Self> {
        match language.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(LanguageFamily::Python),
            "javascript" | "js" | "node" | "nodejs" => Some(LanguageFamily::JavaScript),
            "ruby" | "rb" => Some(LanguageFamily::Ruby),
            "bash" | "sh" | "shell" => Some(LanguageFamily::Shell),
            _ => None,
        }
    }

    /// File extension used for staged source files, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            LanguageFamily::Python => "py",
            LanguageFamily::JavaScript => "js",
            LanguageFamily::Ruby => "rb",
            LanguageFamily::Shell => "sh",
        }
    }

    /// Command template for running a single source file.
    pub fn command_template(self) -> &'static [&'static str] {
        match self {
            // -u keeps stdout unbuffered so partial output survives a kill.
            LanguageFamily::Python => &["python3", "-u", FILE_PLACEHOLDER],
            LanguageFamily::JavaScript => &["node", FILE_PLACEHOLDER],
            LanguageFamily::Ruby => &["ruby", FILE_PLACEHOLDER],
            LanguageFamily::Shell => &["bash", FILE_PLACEHOLDER],
        }
    }

    /// Render the run command for a file already staged in the container.
    pub fn command_for(self, container_path: &str) -> Vec<String> {
        self.command_template()
            .iter()
            .map(|part| part.replace(FILE_PLACEHOLDER, container_path))
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            LanguageFamily::Python => "python",
            LanguageFamily::JavaScript => "javascript",
            LanguageFamily::Ruby => "ruby",
            LanguageFamily::Shell => "shell",
        }
    }
}

impl fmt::Display for LanguageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An allow-listed runtime: a language at a pinned version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    Python311,
    Python312,
    Node20,
    Node22,
    Ruby33,
    Bash5,
}

impl Runtime {
    /// Every runtime in the catalog.
    pub const ALL: [Runtime; 6] = [
        Runtime::Python311,
        Runtime::Python312,
        Runtime::Node20,
        Runtime::Node22,
        Runtime::Ruby33,
        Runtime::Bash5,
    ];

    /// The runtime identifier, e.g. `"python:3.11"`.
    pub fn id(self) -> &'static str {
        match self {
            Runtime::Python311 => "python:3.11",
            Runtime::Python312 => "python:3.12",
            Runtime::Node20 => "node:20",
            Runtime::Node22 => "node:22",
            Runtime::Ruby33 => "ruby:3.3",
            Runtime::Bash5 => "bash:5",
        }
    }

    /// The pullable container image reference.
    pub fn image(self) -> &'static str {
        match self {
            Runtime::Python311 => "python:3.11-slim",
            Runtime::Python312 => "python:3.12-slim",
            Runtime::Node20 => "node:20-slim",
            Runtime::Node22 => "node:22-slim",
            Runtime::Ruby33 => "ruby:3.3-slim",
            Runtime::Bash5 => "bash:5.2",
        }
    }

    pub fn family(self) -> LanguageFamily {
        match self {
            Runtime::Python311 | Runtime::Python312 => LanguageFamily::Python,
            Runtime::Node20 | Runtime::Node22 => LanguageFamily::JavaScript,
            Runtime::Ruby33 => LanguageFamily::Ruby,
            Runtime::Bash5 => LanguageFamily::Shell,
        }
    }

    /// Check whether `language` names this runtime's language family.
    pub fn supports_language(self, language: &str) -> bool {
        LanguageFamily::from_language(language) == Some(self.family())
    }

    /// Resolve everything a session needs to know about this runtime.
    pub fn resolve(self) -> ResolvedRuntime {
        ResolvedRuntime {
            runtime: self,
            image: self.image(),
            family: self.family(),
            command_template: self.family().command_template(),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Runtime {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim();
        Runtime::ALL
            .into_iter()
            .find(|runtime| runtime.id().eq_ignore_ascii_case(id))
            .ok_or_else(|| SandboxError::UnsupportedRuntime(s.to_string()))
    }
}

/// A catalog lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRuntime {
    pub runtime: Runtime,
    pub image: &'static str,
    pub family: LanguageFamily,
    pub command_template: &'static [&'static str],
}

/// Look up a runtime identifier in the catalog. Pure, no side effects.
pub fn resolve(runtime_id: &str) -> Result<ResolvedRuntime> {
    runtime_id.parse::<Runtime>().map(Runtime::resolve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_runtime() {
        let resolved = resolve("python:3.11").unwrap();
        assert_eq!(resolved.runtime, Runtime::Python311);
        assert_eq!(resolved.image, "python:3.11-slim");
        assert_eq!(resolved.family, LanguageFamily::Python);
        assert_eq!(resolved.command_template, &["python3", "-u", "{file}"]);
    }

    #[test]
    fn test_resolve_unknown_runtime() {
        for id in ["python:2.7", "ubuntu:latest", "", "evil/image:tag", "python"] {
            let err = resolve(id).unwrap_err();
            assert!(matches!(err, SandboxError::UnsupportedRuntime(_)), "{id}");
            assert!(err.is_config_error());
        }
    }

    #[test]
    fn test_ids_round_trip_through_from_str() {
        for runtime in Runtime::ALL {
            assert_eq!(runtime.id().parse::<Runtime>().unwrap(), runtime);
        }
        assert_eq!("  NODE:20 ".parse::<Runtime>().unwrap(), Runtime::Node20);
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!(LanguageFamily::from_language("Python"), Some(LanguageFamily::Python));
        assert_eq!(LanguageFamily::from_language("js"), Some(LanguageFamily::JavaScript));
        assert_eq!(LanguageFamily::from_language("sh"), Some(LanguageFamily::Shell));
        assert_eq!(LanguageFamily::from_language("cobol"), None);

        assert!(Runtime::Python312.supports_language("py"));
        assert!(!Runtime::Python312.supports_language("javascript"));
    }

    #[test]
    fn test_command_for_substitutes_file() {
        let cmd = LanguageFamily::JavaScript.command_for("/tmp/sandbox-1.js");
        assert_eq!(cmd, vec!["node".to_string(), "/tmp/sandbox-1.js".to_string()]);
    }
}
