use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::FormatError;

/// The formatters this build knows how to drive. Each variant owns its
/// argument conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatterKind {
  AutoPep8,
  ClangFormat,
  Gn,
  Prettier,
  RustFmt,
}

impl FormatterKind {
  pub const ALL: [FormatterKind; 5] = [
    FormatterKind::AutoPep8,
    FormatterKind::ClangFormat,
    FormatterKind::Gn,
    FormatterKind::Prettier,
    FormatterKind::RustFmt,
  ];

  pub fn name(self) -> &'static str {
    match self {
      FormatterKind::AutoPep8 => "autopep8",
      FormatterKind::ClangFormat => "clang-format",
      FormatterKind::Gn => "gn",
      FormatterKind::Prettier => "prettier",
      FormatterKind::RustFmt => "rustfmt",
    }
  }
}

/// How many selections a formatter can act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MaxSelections {
  Zero,
  One,
  Many,
}

/// What gets written to the formatter's stdin when formatting selections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionInput {
  /// Only the selected text is sent and the output replaces the selection.
  SelectedText,
  /// The whole buffer is sent along with range arguments, and the output
  /// replaces the whole buffer.
  WholeBufferWithRanges,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatterSpec {
  pub name: String,
  pub kind: FormatterKind,
  /// Executable file names to search for, in order of preference.
  pub binaries: Vec<String>,
  /// Editor syntax names handled by this formatter.
  pub languages: Vec<String>,
  /// File extensions handled by this formatter, without the leading dot.
  pub extensions: Vec<String>,
  pub supports_selection: bool,
  pub max_selections: MaxSelections,
  /// Whether several ranges can be passed to one invocation. When this is
  /// false, a formatter allowing many selections only receives the one the
  /// user added last.
  pub multi_range_invocation: bool,
}

/// What the argument builder needs to know about the buffer being formatted.
pub struct ArgsContext<'a> {
  pub file_path: &'a Path,
  pub syntax: Option<&'a str>,
  /// Byte ranges passed on the command line. Empty unless the formatter
  /// receives the whole buffer along with range arguments.
  pub ranges: &'a [Range<usize>],
}

impl FormatterSpec {
  pub fn builtin(kind: FormatterKind) -> FormatterSpec {
    fn strings(values: &[&str]) -> Vec<String> {
      values.iter().map(|value| value.to_string()).collect()
    }

    let windows = cfg!(windows);
    let (binaries, languages, extensions) = match kind {
      FormatterKind::AutoPep8 => (
        if windows { strings(&["autopep8.cmd", "autopep8.exe"]) } else { strings(&["autopep8"]) },
        strings(&["Python"]),
        strings(&["py", "pyi"]),
      ),
      FormatterKind::ClangFormat => (
        if windows {
          strings(&["clang-format.bat", "clang-format.exe"])
        } else {
          strings(&["clang-format"])
        },
        strings(&["C", "C++", "Objective-C", "Objective-C++", "Java"]),
        strings(&["c", "h", "cc", "cpp", "cxx", "hh", "hpp", "hxx", "m", "mm", "java"]),
      ),
      FormatterKind::Gn => (
        if windows { strings(&["gn.exe"]) } else { strings(&["gn"]) },
        strings(&["GN"]),
        strings(&["gn", "gni"]),
      ),
      FormatterKind::Prettier => (
        if windows { strings(&["prettier.cmd", "prettier.exe"]) } else { strings(&["prettier"]) },
        strings(&["CSS", "HTML", "JavaScript", "JavaScript (Babel)", "JSON", "TypeScript"]),
        strings(&["css", "htm", "html", "js", "jsx", "mjs", "cjs", "json", "ts", "tsx"]),
      ),
      FormatterKind::RustFmt => (
        if windows { strings(&["rustfmt.exe"]) } else { strings(&["rustfmt"]) },
        strings(&["Rust"]),
        strings(&["rs"]),
      ),
    };
    let (supports_selection, max_selections, multi_range_invocation) = match kind {
      FormatterKind::AutoPep8 | FormatterKind::Prettier => (true, MaxSelections::One, false),
      FormatterKind::ClangFormat => (true, MaxSelections::Many, true),
      FormatterKind::Gn | FormatterKind::RustFmt => (false, MaxSelections::Zero, false),
    };

    FormatterSpec {
      name: kind.name().to_string(),
      kind,
      binaries,
      languages,
      extensions,
      supports_selection,
      max_selections,
      multi_range_invocation,
    }
  }

  /// The executable file name used when nothing more specific is configured.
  pub fn default_binary(&self) -> &str {
    self.binaries.first().map(|binary| binary.as_str()).unwrap_or(self.name.as_str())
  }

  pub fn selection_input(&self) -> SelectionInput {
    match self.kind {
      FormatterKind::ClangFormat => SelectionInput::WholeBufferWithRanges,
      FormatterKind::AutoPep8 | FormatterKind::Gn | FormatterKind::Prettier | FormatterKind::RustFmt => SelectionInput::SelectedText,
    }
  }

  pub fn build_args(&self, context: &ArgsContext) -> Vec<String> {
    let mut args = Vec::new();
    match self.kind {
      FormatterKind::AutoPep8 => {
        args.push("-".to_string());
      }
      FormatterKind::ClangFormat => {
        args.push(format!("-assume-filename={}", context.file_path.display()));
        for range in context.ranges {
          args.push(format!("-offset={}", range.start));
          args.push(format!("-length={}", range.end - range.start));
        }
      }
      FormatterKind::Gn => {
        args.push("format".to_string());
        args.push("--stdin".to_string());
      }
      FormatterKind::Prettier => {
        args.push("--parser".to_string());
        args.push(prettier_parser(context.syntax, context.file_path).to_string());
      }
      FormatterKind::RustFmt => {
        args.push("--emit=stdout".to_string());
      }
    }
    args
  }

  /// Whether this formatter handles the given editor syntax. Syntax names may
  /// be given as syntax file paths (ex. `Packages/Python/Python.sublime-syntax`).
  pub fn handles_syntax(&self, syntax: &str) -> bool {
    let name = syntax_name(syntax);
    self.languages.iter().any(|language| language == name)
  }

  pub fn handles_file_path(&self, file_path: &Path) -> bool {
    match file_path.extension().and_then(|ext| ext.to_str()) {
      Some(ext) => self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)),
      None => false,
    }
  }

  fn handles_buffer(&self, syntax: Option<&str>, file_path: &Path) -> bool {
    syntax.map(|syntax| self.handles_syntax(syntax)).unwrap_or(false) || self.handles_file_path(file_path)
  }
}

fn syntax_name(syntax: &str) -> &str {
  let file_name = syntax.rsplit(['/', '\\']).next().unwrap_or(syntax);
  match file_name.rfind(".sublime-syntax").or_else(|| file_name.rfind(".tmLanguage")) {
    Some(index) => &file_name[..index],
    None => file_name,
  }
}

fn prettier_parser(syntax: Option<&str>, file_path: &Path) -> &'static str {
  if let Some(syntax) = syntax {
    match syntax_name(syntax) {
      "CSS" => return "css",
      "HTML" => return "html",
      "JSON" => return "json",
      "TypeScript" => return "typescript",
      "JavaScript" | "JavaScript (Babel)" => return "babel",
      _ => {}
    }
  }
  let ext = file_path.extension().and_then(|ext| ext.to_str()).unwrap_or("").to_ascii_lowercase();
  match ext.as_str() {
    "css" => "css",
    "htm" | "html" => "html",
    "json" => "json",
    "ts" | "tsx" => "typescript",
    _ => "babel",
  }
}

static BUILTIN_REGISTRY: Lazy<Arc<FormatterRegistry>> =
  Lazy::new(|| Arc::new(FormatterRegistry::new(FormatterKind::ALL.iter().map(|kind| FormatterSpec::builtin(*kind)).collect())));

/// Catalog of known formatters in declaration order. Immutable once built.
#[derive(Debug)]
pub struct FormatterRegistry {
  formatters: Vec<FormatterSpec>,
}

impl FormatterRegistry {
  pub fn new(formatters: Vec<FormatterSpec>) -> Self {
    Self { formatters }
  }

  /// The formatters supported by this build.
  pub fn builtin() -> Arc<FormatterRegistry> {
    BUILTIN_REGISTRY.clone()
  }

  pub fn by_name(&self, name: &str) -> Result<&FormatterSpec, FormatError> {
    self
      .formatters
      .iter()
      .find(|spec| spec.name == name)
      .ok_or_else(|| FormatError::UnknownFormatter(name.to_string()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &FormatterSpec> {
    self.formatters.iter()
  }

  /// Gets the formatter for a buffer, preferring a syntax match over a file
  /// extension match.
  pub fn for_buffer(&self, syntax: Option<&str>, file_path: &Path) -> Option<&FormatterSpec> {
    syntax
      .and_then(|syntax| self.formatters.iter().find(|spec| spec.handles_syntax(syntax)))
      .or_else(|| self.formatters.iter().find(|spec| spec.handles_file_path(file_path)))
  }

  /// Every formatter that handles the buffer, in declaration order.
  pub fn all_for_buffer<'a>(&'a self, syntax: Option<&'a str>, file_path: &'a Path) -> impl Iterator<Item = &'a FormatterSpec> + 'a {
    self.formatters.iter().filter(move |spec| spec.handles_buffer(syntax, file_path))
  }
}
