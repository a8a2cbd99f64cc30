//! Runs external code formatters (clang-format, prettier, autopep8, rustfmt,
//! gn) against editor buffers.
//!
//! The host supplies a settings object and a buffer. The pipeline resolves the
//! settings into a concrete executable, argument list and environment, decides
//! which part of the buffer to send, runs the process and hands back either a
//! replacement for the buffer or an error to display.

#[macro_use]
pub mod environment;

pub mod apply;
pub mod configuration;
pub mod error;
pub mod expand;
pub mod host;
pub mod invocation;
pub mod locks;
pub mod process;
pub mod range;
pub mod registry;
pub mod save;
pub mod service;

pub use apply::FormatOutcome;
pub use apply::FormatSuccess;
pub use apply::TextChange;
pub use apply::TextChangeError;
pub use configuration::FormatterConfig;
pub use configuration::OnSave;
pub use configuration::ProjectSettings;
pub use environment::Environment;
pub use environment::EnvVars;
pub use environment::LogLevel;
pub use error::FormatError;
pub use error::FormatErrorKind;
pub use host::HostBuffer;
pub use host::ViewportPosition;
pub use invocation::ResolvedInvocation;
pub use range::InputRange;
pub use registry::FormatterKind;
pub use registry::FormatterRegistry;
pub use registry::FormatterSpec;
pub use registry::MaxSelections;
pub use service::FormatOptions;
pub use service::FormatRequest;
pub use service::SaveResult;
pub use service::FormatService;
