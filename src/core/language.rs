//! Build languages a dependency can be probed with.

use serde::{Deserialize, Serialize};

/// Language a probe program is written in and compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// C language (default)
    #[default]
    C,
    /// C++ language
    #[serde(alias = "cpp", alias = "cxx", alias = "c++")]
    Cxx,
    /// AMD HIP device language
    Hip,
    /// NVIDIA CUDA device language
    Cuda,
}

impl Language {
    /// Get the language name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "c++",
            Language::Hip => "hip",
            Language::Cuda => "cuda",
        }
    }

    /// Display name used in status and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cxx => "C++",
            Language::Hip => "HIP",
            Language::Cuda => "CUDA",
        }
    }

    /// Source file extension for probe programs.
    pub fn source_extension(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "cpp",
            Language::Hip => "hip",
            Language::Cuda => "cu",
        }
    }

    /// Whether this language is compiled by a separate device compiler.
    pub fn is_device(&self) -> bool {
        matches!(self, Language::Hip | Language::Cuda)
    }

    /// Whether symbols declared in probes need `extern "C"`.
    pub fn is_cxx_like(&self) -> bool {
        !matches!(self, Language::C)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(Language::C),
            "c++" | "cxx" | "cpp" => Ok(Language::Cxx),
            "hip" => Ok(Language::Hip),
            "cuda" => Ok(Language::Cuda),
            other => Err(format!(
                "invalid language '{}', valid values: c, c++, hip, cuda",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cxx);
        assert_eq!("hip".parse::<Language>().unwrap(), Language::Hip);
        assert!("fortran".parse::<Language>().is_err());
    }

    #[test]
    fn test_device_languages() {
        assert!(Language::Hip.is_device());
        assert!(Language::Cuda.is_device());
        assert!(!Language::Cxx.is_device());
    }
}
