//! Detection of CI tools invoked from `run:` steps.
//!
//! The log pipeline only extracts structured errors from a handful of tools;
//! anything else still runs but is reported so users know what to expect.

use regex::Regex;
use serde::Serialize;

/// A tool recognised in a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DetectedTool {
    pub id: &'static str,
    pub display_name: &'static str,
    pub supported: bool,
}

/// Recognises tools in the text of a `run:` step.
pub trait ToolDetector: Send + Sync {
    fn detect(&self, run: &str) -> Vec<DetectedTool>;
}

/// Matches a single tool by regular expression.
pub struct PatternDetector {
    tool: DetectedTool,
    pattern: Regex,
}

impl PatternDetector {
    pub fn new(tool: DetectedTool, pattern: Regex) -> Self {
        Self { tool, pattern }
    }
}

impl ToolDetector for PatternDetector {
    fn detect(&self, run: &str) -> Vec<DetectedTool> {
        if self.pattern.is_match(run) {
            vec![self.tool]
        } else {
            Vec::new()
        }
    }
}

/// (id, display name, pattern, supported by the log pipeline)
const DEFAULT_TOOLS: &[(&str, &str, &str, bool)] = &[
    ("go", "Go", r"\bgo\s+(test|build|vet)\b", true),
    ("golangci-lint", "golangci-lint", r"\bgolangci-lint\b", true),
    ("tsc", "TypeScript", r"\btsc\b", true),
    ("eslint", "ESLint", r"\beslint\b", true),
    ("vitest", "Vitest", r"\bvitest\b", true),
    ("cargo", "Cargo", r"\bcargo\s+(build|test|check|clippy|nextest)\b", true),
    ("jest", "Jest", r"\bjest\b", false),
    ("pytest", "pytest", r"\bpytest\b", false),
    ("mypy", "mypy", r"\bmypy\b", false),
    ("ruff", "Ruff", r"\bruff\b", false),
    ("biome", "Biome", r"\bbiome\b", false),
    ("mocha", "Mocha", r"\bmocha\b", false),
    ("rubocop", "RuboCop", r"\brubocop\b", false),
    ("phpunit", "PHPUnit", r"\bphpunit\b", false),
];

/// Ordered set of detectors, constructed explicitly and handed to the validator.
pub struct ToolRegistry {
    detectors: Vec<Box<dyn ToolDetector>>,
    supported: Vec<&'static str>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
            supported: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for &(id, display_name, pattern, supported) in DEFAULT_TOOLS {
            let tool = DetectedTool {
                id,
                display_name,
                supported,
            };
            let pattern = Regex::new(pattern).expect("valid regex");
            registry.register(tool, Box::new(PatternDetector::new(tool, pattern)));
        }
        registry
    }

    /// Add a detector. `tool` describes what it reports so the supported
    /// list stays in sync.
    pub fn register(&mut self, tool: DetectedTool, detector: Box<dyn ToolDetector>) -> &mut Self {
        if tool.supported && !self.supported.contains(&tool.display_name) {
            self.supported.push(tool.display_name);
        }
        self.detectors.push(detector);
        self
    }

    /// Every tool found in `run`, first detection wins, registration order kept.
    pub fn detect(&self, run: &str) -> Vec<DetectedTool> {
        let mut found: Vec<DetectedTool> = Vec::new();
        for detector in &self.detectors {
            for tool in detector.detect(run) {
                if !found.iter().any(|seen| seen.id == tool.id) {
                    found.push(tool);
                }
            }
        }
        found
    }

    pub fn supported_tools(&self) -> &[&'static str] {
        &self.supported
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
