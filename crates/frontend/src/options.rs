//! Frontend configuration.
//!
//! `FrontendOptions` is an immutable input record: one value is built by the
//! caller (CLI flags or embedding code) and shared across `compile_*` calls.

use std::path::PathBuf;

/// Language standard selection. `gnu11` accepts the GNU extensions
/// (`__asm__`, comma-swallowing paste, `#include_next`, unknown-directive
/// pass-through, statement expressions, label addresses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Std {
    #[default]
    C11,
    Gnu11,
}

impl Std {
    pub fn as_str(&self) -> &'static str {
        match self {
            Std::C11 => "c11",
            Std::Gnu11 => "gnu11",
        }
    }

    pub fn is_gnu(&self) -> bool {
        matches!(self, Std::Gnu11)
    }
}

impl std::fmt::Display for Std {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic rendering selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DiagFormat {
    #[default]
    Human,
    Json,
}

impl std::fmt::Display for DiagFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagFormat::Human => "human",
            DiagFormat::Json => "json",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct FrontendOptions {
    pub std: Std,
    /// Value of `__STDC_HOSTED__`.
    pub hosted: bool,
    /// `-I` directories, searched for both quoted and angled includes.
    pub include_dirs: Vec<PathBuf>,
    /// `-iquote` directories, searched for quoted includes only.
    pub quote_include_dirs: Vec<PathBuf>,
    /// `-isystem` directories, searched after `include_dirs`.
    pub system_include_dirs: Vec<PathBuf>,
    /// `-idirafter` directories, searched last.
    pub after_include_dirs: Vec<PathBuf>,
    /// Files preprocessed before the main source, output prepended.
    pub forced_includes: Vec<PathBuf>,
    /// Files preprocessed for macro side effects only, output discarded.
    pub macro_includes: Vec<PathBuf>,
    /// `-D` entries, `NAME` or `NAME=BODY`.
    pub defines: Vec<String>,
    /// `-U` entries; may remove predefined macros.
    pub undefs: Vec<String>,
    /// Recorded for the external driver; the core defines no host SDK paths.
    pub no_standard_includes: bool,
    pub diag_format: DiagFormat,
    /// Escalate warnings (the gnu11 unknown-directive pass-through) to errors.
    pub warn_as_error: bool,
}

impl Default for FrontendOptions {
    fn default() -> Self {
        FrontendOptions {
            std: Std::C11,
            hosted: true,
            include_dirs: Vec::new(),
            quote_include_dirs: Vec::new(),
            system_include_dirs: Vec::new(),
            after_include_dirs: Vec::new(),
            forced_includes: Vec::new(),
            macro_includes: Vec::new(),
            defines: Vec::new(),
            undefs: Vec::new(),
            no_standard_includes: false,
            diag_format: DiagFormat::Human,
            warn_as_error: false,
        }
    }
}

impl FrontendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_std(mut self, std: Std) -> Self {
        self.std = std;
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_system_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.system_include_dirs.push(dir.into());
        self
    }

    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    pub fn with_undef(mut self, name: impl Into<String>) -> Self {
        self.undefs.push(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = FrontendOptions::default();
        assert_eq!(options.std, Std::C11);
        assert!(options.hosted);
        assert!(!options.warn_as_error);
        assert!(options.include_dirs.is_empty());
    }

    #[test]
    fn test_std_display() {
        assert_eq!(Std::C11.to_string(), "c11");
        assert_eq!(Std::Gnu11.to_string(), "gnu11");
        assert!(Std::Gnu11.is_gnu());
        assert!(!Std::C11.is_gnu());
    }

    #[test]
    fn test_builder_style() {
        let options = FrontendOptions::new()
            .with_std(Std::Gnu11)
            .with_define("DEBUG=1")
            .with_undef("NDEBUG")
            .with_include_dir("/tmp/include");
        assert_eq!(options.std, Std::Gnu11);
        assert_eq!(options.defines, vec!["DEBUG=1".to_string()]);
        assert_eq!(options.undefs, vec!["NDEBUG".to_string()]);
        assert_eq!(options.include_dirs.len(), 1);
    }
}
