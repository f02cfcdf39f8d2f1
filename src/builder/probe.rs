//! Probe programs.
//!
//! A probe is a tiny translation unit written to a private temporary
//! directory and handed to one of the [`Toolchain`]s. Whether the compiler
//! accepts it is the answer to a question about the host: does this header
//! exist, do these symbols link, is `sizeof(T) == N`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::builder::toolchain::{CompileInput, LinkInput, Toolchain};
use crate::core::language::Language;
use crate::core::surface::LinkItem;
use crate::util::process::{ProbeOutput, ProbeRunner};

/// Macro the size probe compares against; passed with `-D`.
pub const CHECK_SIZE_MACRO: &str = "BERTH_CHECK_SIZE";

/// Prefix of the marker lines printed by the macro-echo probe.
pub const MACRO_MARKER: &str = "berth_macro_";

/// Extra flags applied to one probe.
#[derive(Debug, Clone, Default)]
pub struct ProbeFlags {
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<(String, Option<String>)>,
    pub link_items: Vec<LinkItem>,
}

impl ProbeFlags {
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() && !self.include_dirs.contains(&dir) {
            self.include_dirs.push(dir);
        }
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), Some(value.into())));
        self
    }

    pub fn with_link_items(mut self, items: impl IntoIterator<Item = LinkItem>) -> Self {
        self.link_items.extend(items);
        self
    }
}

/// Runs probe programs through one compiler.
///
/// Each `Probe` owns a temporary directory that is removed on drop.
pub struct Probe<'a> {
    runner: &'a dyn ProbeRunner,
    toolchain: &'a dyn Toolchain,
    timeout: Duration,
    workspace: Option<TempDir>,
    counter: usize,
}

impl<'a> Probe<'a> {
    pub fn new(
        runner: &'a dyn ProbeRunner,
        toolchain: &'a dyn Toolchain,
        timeout: Duration,
    ) -> Self {
        Probe {
            runner,
            toolchain,
            timeout,
            workspace: None,
            counter: 0,
        }
    }

    pub fn language(&self) -> Language {
        self.toolchain.language()
    }

    /// Run the preprocessor over `source`, returning its stdout.
    pub fn preprocess(&mut self, stem: &str, source: &str, flags: &ProbeFlags) -> ProbeOutput {
        let path = match self.write_source(stem, source) {
            Ok(path) => path,
            Err(output) => return output,
        };
        let input = CompileInput {
            source: path,
            include_dirs: flags.include_dirs.clone(),
            defines: flags.defines.clone(),
            ..Default::default()
        };
        let cmd = self.toolchain.preprocess_command(&input);
        self.runner.run(&cmd, self.timeout)
    }

    /// Compile `source` without linking.
    pub fn compile(&mut self, stem: &str, source: &str, flags: &ProbeFlags) -> ProbeOutput {
        self.compile_to_object(stem, source, flags).1
    }

    /// Compile and link `source` into an executable.
    pub fn link(&mut self, stem: &str, source: &str, flags: &ProbeFlags) -> ProbeOutput {
        let (object, output) = self.compile_to_object(stem, source, flags);
        if !output.succeeded() {
            return output;
        }
        let Some(object) = object else {
            return output;
        };

        let exe = object.with_extension(self.toolchain.exe_extension());
        let input = LinkInput {
            objects: vec![object],
            output: exe,
            libs: flags.link_items.clone(),
            ..Default::default()
        };
        let cmd = self.toolchain.link_exe_command(&input);
        self.runner.run(&cmd, self.timeout)
    }

    fn compile_to_object(
        &mut self,
        stem: &str,
        source: &str,
        flags: &ProbeFlags,
    ) -> (Option<PathBuf>, ProbeOutput) {
        let path = match self.write_source(stem, source) {
            Ok(path) => path,
            Err(output) => return (None, output),
        };
        let object = path.with_extension(self.toolchain.object_extension());
        let input = CompileInput {
            source: path,
            output: object.clone(),
            include_dirs: flags.include_dirs.clone(),
            defines: flags.defines.clone(),
            cflags: Vec::new(),
        };
        let cmd = self.toolchain.compile_command(&input);
        (Some(object), self.runner.run(&cmd, self.timeout))
    }

    fn write_source(&mut self, stem: &str, source: &str) -> Result<PathBuf, ProbeOutput> {
        if self.workspace.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("berth-probe")
                .tempdir()
                .map_err(|e| {
                    ProbeOutput::spawn_failed(format!("cannot create probe directory: {}", e))
                })?;
            self.workspace = Some(dir);
        }
        let dir = self
            .workspace
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new("."));

        self.counter += 1;
        let path = dir.join(format!(
            "{}_{}.{}",
            stem,
            self.counter,
            self.toolchain.language().source_extension()
        ));
        std::fs::write(&path, source).map_err(|e| {
            ProbeOutput::spawn_failed(format!("cannot write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

/// A translation unit that includes `headers`.
pub fn header_source(headers: &[&str]) -> String {
    let mut src = String::new();
    for header in headers {
        src.push_str(&format!("#include <{}>\n", header));
    }
    src.push_str("int berth_probe_unused;\n");
    src
}

/// A program that references every symbol in `symbols`.
///
/// Symbols are declared as `char sym(void);` so the probe does not depend on
/// the real prototypes.
pub fn link_source(symbols: &[String], language: Language) -> String {
    let mut src = String::new();
    let linkage = if language.is_cxx_like() {
        "extern \"C\" "
    } else {
        ""
    };
    for sym in symbols {
        src.push_str(&format!("{}char {}(void);\n", linkage, sym));
    }
    src.push_str("int main(void) {\n");
    for sym in symbols {
        src.push_str(&format!("  (void){}();\n", sym));
    }
    src.push_str("  return 0;\n}\n");
    src
}

/// A translation unit that compiles only when `sizeof(type_name)` equals
/// the value of [`CHECK_SIZE_MACRO`].
pub fn sizeof_source(type_name: &str, prelude: &str) -> String {
    format!(
        "{prelude}char berth_check_size[(sizeof({ty}) == {m}) ? 1 : -1];\n",
        prelude = prelude,
        ty = type_name,
        m = CHECK_SIZE_MACRO
    )
}

/// A translation unit whose preprocessed output echoes each macro's expansion.
pub fn macro_echo_source(header: &str, macros: &[String]) -> String {
    let mut src = format!("#include <{}>\n", header);
    for (i, name) in macros.iter().enumerate() {
        src.push_str(&format!("{}{} = {};\n", MACRO_MARKER, i, name));
    }
    src
}
