//! Patch instance facade: a lazily refreshed description of a program's
//! source files and a factory that compiles them into players.
//!
//! Refreshes fold their errors into description stubs, and player
//! compilation reports through a message list rather than failing the call.

pub mod error;
pub use error::{PatchError, Result};

pub mod file;
pub use file::{NativeFile, VirtualFile};

pub mod manifest;
pub use manifest::{parse_manifest, Description, Manifest, SourceRefs, MANIFEST_SUFFIX};

pub mod file_list;
pub use file_list::FileList;

pub mod player;
pub use player::{
    source_set_key, CompileHooks, CompilerCache, ConsoleMessageHandler, ExternalDataProvider,
    PatchPlayer, PlayerConfig, ProgramCompiler, SourceFile, SourceFilePreprocessor,
};

pub mod instance;
pub use instance::PatchInstance;
