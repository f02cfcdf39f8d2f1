//! Package descriptors.
//!
//! A descriptor is the static declaration of how to find one dependency:
//! where its version lives, which headers and symbols prove it is usable,
//! and the alternative library sets it may link against. Descriptors are
//! built once through [`PackageDescriptorBuilder`], which rejects
//! inconsistent declarations up front.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::language::Language;
use crate::core::surface::LinkItem;
use crate::core::version::Version;

/// Error in a package declaration.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("package `{package}` declares required symbols but no library sets")]
    SymbolsWithoutLibraries { package: String },

    #[error("package `{package}` declares an empty library set")]
    EmptyLibrarySet { package: String },

    #[error("`{name}` is not a library file name (expected libfoo.a, libfoo.so, libfoo.dylib or foo.lib)")]
    InvalidLibraryName { name: String },

    #[error("package `{package}` has an invalid version pattern")]
    InvalidPattern {
        package: String,
        #[source]
        source: regex::Error,
    },

    #[error("package `{package}` version pattern has no `version` capture group")]
    MissingVersionGroup { package: String },

    #[error("package `{package}` depends on itself")]
    SelfDependency { package: String },

    #[error("package name must not be empty")]
    EmptyName,
}

/// Where a package's version can be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// Integer macros in an installed header, joined with dots.
    ///
    /// The first of `includes` that exists is used. A single macro may
    /// instead expand to a string literal holding the whole version.
    Header {
        includes: Vec<String>,
        macros: Vec<String>,
    },
    /// Output of a program shipped with the package.
    ///
    /// `program` is relative to the installation root. `pattern` must have
    /// a named capture group `version`.
    Tool {
        program: PathBuf,
        args: Vec<String>,
        pattern: String,
    },
}

/// Kind of library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryKind {
    Static,
    Shared,
    /// Windows import library
    Import,
}

/// A library file name from a package declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryName {
    file: String,
    stem: String,
    kind: LibraryKind,
}

impl LibraryName {
    /// Parse `libfoo.a`, `libfoo.so`, `libfoo.dylib` or `foo.lib`.
    pub fn parse(name: &str) -> Result<Self, DescriptorError> {
        let invalid = || DescriptorError::InvalidLibraryName {
            name: name.to_string(),
        };

        let (base, kind) = if let Some(base) = name.strip_suffix(".a") {
            (base, LibraryKind::Static)
        } else if let Some(base) = name.strip_suffix(".so") {
            (base, LibraryKind::Shared)
        } else if let Some(base) = name.strip_suffix(".dylib") {
            (base, LibraryKind::Shared)
        } else if let Some(base) = name.strip_suffix(".lib") {
            (base, LibraryKind::Import)
        } else {
            return Err(invalid());
        };

        let stem = match kind {
            LibraryKind::Import => base.strip_prefix("lib").unwrap_or(base),
            _ => base.strip_prefix("lib").ok_or_else(invalid)?,
        };

        if stem.is_empty() || stem.contains(['/', '\\']) {
            return Err(invalid());
        }

        Ok(LibraryName {
            file: name.to_string(),
            stem: stem.to_string(),
            kind,
        })
    }

    /// The file name as installed (`libfoo.a`).
    pub fn file_name(&self) -> &str {
        &self.file
    }

    /// The link stem (`foo`).
    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn kind(&self) -> LibraryKind {
        self.kind
    }

    /// The link item used when the library is expected on the compiler's
    /// default search path.
    pub fn default_link_item(&self) -> LinkItem {
        match self.kind {
            LibraryKind::Import => LinkItem::Flag(self.file.clone()),
            _ => LinkItem::Name(self.stem.clone()),
        }
    }

    /// The generic `HAVE_LIB<STEM>` define name for this library.
    pub fn have_define(&self) -> String {
        format!("HAVE_LIB{}", define_ident(&self.stem))
    }
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file)
    }
}

/// An ordered group of libraries that must link together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySet(Vec<LibraryName>);

impl LibrarySet {
    pub fn libraries(&self) -> &[LibraryName] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LibraryName> {
        self.0.iter()
    }
}

impl fmt::Display for LibrarySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(LibraryName::file_name).collect();
        write!(f, "[{}]", names.join(" "))
    }
}

/// Static declaration of one dependency.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub name: String,
    pub display_name: String,
    pub min_version: Option<Version>,
    pub version_source: Option<VersionSource>,
    pub requires_version: bool,
    pub required_symbols: Vec<String>,
    pub header_candidates: Vec<String>,
    /// Headers that must all be present and compile together.
    pub required_headers: Vec<String>,
    pub include_subdirs: Vec<String>,
    pub library_sets: Vec<LibrarySet>,
    pub required_deps: Vec<String>,
    pub optional_deps: Vec<String>,
    pub link_language: Language,
}

impl PackageDescriptor {
    /// Start declaring a package.
    pub fn builder(name: impl Into<String>) -> PackageDescriptorBuilder {
        let name = name.into();
        PackageDescriptorBuilder {
            display_name: None,
            name,
            min_version: None,
            version_source: None,
            requires_version: false,
            required_symbols: Vec::new(),
            header_candidates: Vec::new(),
            required_headers: Vec::new(),
            include_subdirs: vec!["include".to_string()],
            library_sets: Vec::new(),
            required_deps: Vec::new(),
            optional_deps: Vec::new(),
            link_language: Language::C,
        }
    }

    /// A package with no libraries to link.
    pub fn is_header_only(&self) -> bool {
        self.library_sets.is_empty()
    }

    /// The package-scoped `HAVE_<NAME>` define.
    pub fn have_define(&self) -> String {
        format!("HAVE_{}", define_ident(&self.name))
    }

    /// Required and optional dependencies, required first.
    pub fn all_deps(&self) -> impl Iterator<Item = &str> {
        self.required_deps
            .iter()
            .chain(self.optional_deps.iter())
            .map(String::as_str)
    }

    /// Append a library set after validation.
    ///
    /// Used by recipes that specialize a descriptor for one directory.
    pub fn push_library(&mut self, set_index: usize, name: &str) -> Result<(), DescriptorError> {
        let lib = LibraryName::parse(name)?;
        if let Some(set) = self.library_sets.get_mut(set_index) {
            set.0.push(lib);
        }
        Ok(())
    }
}

/// Builder for [`PackageDescriptor`].
#[derive(Debug, Clone)]
pub struct PackageDescriptorBuilder {
    name: String,
    display_name: Option<String>,
    min_version: Option<Version>,
    version_source: Option<VersionSource>,
    requires_version: bool,
    required_symbols: Vec<String>,
    header_candidates: Vec<String>,
    required_headers: Vec<String>,
    include_subdirs: Vec<String>,
    library_sets: Vec<Vec<String>>,
    required_deps: Vec<String>,
    optional_deps: Vec<String>,
    link_language: Language,
}

impl PackageDescriptorBuilder {
    /// Name used in status output (defaults to the package name).
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn min_version(mut self, version: Version) -> Self {
        self.min_version = Some(version);
        self
    }

    /// Read the version from integer macros in the first existing header.
    pub fn version_from_header<I, M>(mut self, includes: I, macros: M) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        self.version_source = Some(VersionSource::Header {
            includes: includes.into_iter().map(Into::into).collect(),
            macros: macros.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Read the version by running a program from the installation.
    pub fn version_from_tool<A>(
        mut self,
        program: impl Into<PathBuf>,
        args: A,
        pattern: impl Into<String>,
    ) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        self.version_source = Some(VersionSource::Tool {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            pattern: pattern.into(),
        });
        self
    }

    /// Fail the resolution when the version cannot be determined.
    pub fn requires_version(mut self, required: bool) -> Self {
        self.requires_version = required;
        self
    }

    pub fn symbols<I>(mut self, symbols: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.required_symbols
            .extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.header_candidates
            .extend(headers.into_iter().map(Into::into));
        self
    }

    /// Headers that must all exist; they are checked in one compile.
    pub fn required_headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.required_headers
            .extend(headers.into_iter().map(Into::into));
        self
    }

    /// Replace the include subdirectories searched below a root.
    pub fn include_subdirs<I>(mut self, subdirs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include_subdirs = subdirs.into_iter().map(Into::into).collect();
        self
    }

    /// Add an alternative library set. Sets are tried in declaration order.
    pub fn library_set<I>(mut self, libraries: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.library_sets
            .push(libraries.into_iter().map(Into::into).collect());
        self
    }

    pub fn requires<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.required_deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn optional<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.optional_deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn link_language(mut self, language: Language) -> Self {
        self.link_language = language;
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<PackageDescriptor, DescriptorError> {
        if self.name.is_empty() {
            return Err(DescriptorError::EmptyName);
        }

        if !self.required_symbols.is_empty() && self.library_sets.is_empty() {
            return Err(DescriptorError::SymbolsWithoutLibraries { package: self.name });
        }

        if self.all_deps().any(|d| d == self.name) {
            return Err(DescriptorError::SelfDependency { package: self.name });
        }

        let mut library_sets = Vec::with_capacity(self.library_sets.len());
        for set in &self.library_sets {
            if set.is_empty() {
                return Err(DescriptorError::EmptyLibrarySet {
                    package: self.name.clone(),
                });
            }
            let libs = set
                .iter()
                .map(|n| LibraryName::parse(n))
                .collect::<Result<Vec<_>, _>>()?;
            library_sets.push(LibrarySet(libs));
        }

        if let Some(VersionSource::Tool { ref pattern, .. }) = self.version_source {
            let re = regex::Regex::new(pattern).map_err(|source| DescriptorError::InvalidPattern {
                package: self.name.clone(),
                source,
            })?;
            if !re.capture_names().any(|n| n == Some("version")) {
                return Err(DescriptorError::MissingVersionGroup { package: self.name });
            }
        }

        Ok(PackageDescriptor {
            display_name: self.display_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            min_version: self.min_version,
            version_source: self.version_source,
            requires_version: self.requires_version,
            required_symbols: self.required_symbols,
            header_candidates: self.header_candidates,
            required_headers: self.required_headers,
            include_subdirs: self.include_subdirs,
            library_sets,
            required_deps: self.required_deps,
            optional_deps: self.optional_deps,
            link_language: self.link_language,
        })
    }

    fn all_deps(&self) -> impl Iterator<Item = &str> {
        self.required_deps
            .iter()
            .chain(self.optional_deps.iter())
            .map(String::as_str)
    }
}

/// Upper-case a name into a C identifier (`hsa-runtime64` -> `HSA_RUNTIME64`).
pub fn define_ident(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
