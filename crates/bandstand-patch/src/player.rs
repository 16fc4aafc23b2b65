//! A compiled (or failed-to-compile) player for one patch.

use crate::error::Result;
use crate::file::VirtualFile;
use crate::file_list::FileList;
use crate::manifest::Description;
use bandstand_core::{
    BuildSettings, CompileMessage, CompileMessageList, Performer, Program, Value,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Settings for players produced by
/// [`PatchInstance::compile_new_player`](crate::PatchInstance::compile_new_player).
#[derive(Clone, Copy, Debug)]
pub struct PlayerConfig {
    pub sample_rate: f64,
    pub max_frames_per_block: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            max_frames_per_block: 1024,
        }
    }
}

/// Caches compiled artifacts across runs, keyed by a hash of the sources.
pub trait CompilerCache: Send + Sync {
    fn store(&self, key: &str, data: &[u8]);
    fn load(&self, key: &str) -> Option<Vec<u8>>;
}

/// Rewrites a source file before compilation. Returning `Ok(None)` leaves
/// the file untouched.
pub trait SourceFilePreprocessor: Send + Sync {
    fn preprocess(&self, file: &dyn VirtualFile) -> Result<Option<String>>;
}

/// Supplies data for external variables referenced by a program.
pub trait ExternalDataProvider: Send + Sync {
    fn external_data(&self, name: &str) -> Option<Value>;
}

/// Receives console output emitted while building a player.
pub trait ConsoleMessageHandler: Send + Sync {
    fn handle_message(&self, text: &str);
}

/// One source file's preprocessed content, as handed to the compiler.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// The compiler back-end: turns sources into an executable [`Program`].
pub trait ProgramCompiler: Send + Sync {
    fn compile(
        &self,
        sources: &[SourceFile],
        settings: &BuildSettings,
        cache: Option<&dyn CompilerCache>,
        external_data: Option<&dyn ExternalDataProvider>,
        messages: &mut CompileMessageList,
    ) -> Option<Program>;
}

/// Optional collaborators threaded through a compile.
#[derive(Clone, Copy, Default)]
pub struct CompileHooks<'a> {
    pub cache: Option<&'a dyn CompilerCache>,
    pub preprocessor: Option<&'a dyn SourceFilePreprocessor>,
    pub external_data: Option<&'a dyn ExternalDataProvider>,
    pub console: Option<&'a dyn ConsoleMessageHandler>,
}

/// A player bound to a snapshot of the patch's file list and a fresh
/// performer. Its message list always reflects how the build went; callers
/// read [`PatchPlayer::is_playable`] rather than handling errors.
pub struct PatchPlayer {
    file_list: FileList,
    config: PlayerConfig,
    performer: Box<dyn Performer>,
    program: Program,
    compile_messages: Vec<CompileMessage>,
    any_errors: bool,
}

impl PatchPlayer {
    pub(crate) fn new(
        file_list: FileList,
        config: PlayerConfig,
        performer: Box<dyn Performer>,
    ) -> Self {
        Self {
            file_list,
            config,
            performer,
            program: Program::empty(),
            compile_messages: Vec::new(),
            any_errors: false,
        }
    }

    pub fn description(&self) -> Description {
        self.file_list.create_description()
    }

    pub fn config(&self) -> PlayerConfig {
        self.config
    }

    pub fn compile_messages(&self) -> &[CompileMessage] {
        &self.compile_messages
    }

    pub fn is_playable(&self) -> bool {
        !self.any_errors && !self.program.is_empty()
    }

    /// The compiled program, ready to be loaded into a session. Empty when
    /// the build failed.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The performer this player validated the build against.
    pub fn performer_mut(&mut self) -> &mut dyn Performer {
        self.performer.as_mut()
    }

    /// True when any file behind this player changed since it was built.
    pub fn needs_rebuilding(&self) -> bool {
        self.file_list.has_changed()
    }

    pub(crate) fn add_fatal_error(&mut self, message: impl Into<String>) {
        self.compile_messages.push(CompileMessage::error(message));
        self.update_status();
    }

    fn update_status(&mut self) {
        self.any_errors = self.compile_messages.iter().any(CompileMessage::is_error);
    }

    /// Reads and preprocesses the sources, compiles them, and loads + links
    /// the resulting program into this player's performer. All failures end
    /// up in the message list.
    pub(crate) fn compile(
        &mut self,
        settings: BuildSettings,
        compiler: &dyn ProgramCompiler,
        hooks: CompileHooks<'_>,
    ) {
        let mut sources = Vec::new();
        let source_files: Vec<_> = self.file_list.source_files().cloned().collect();
        for file in source_files {
            let preprocessed = match hooks.preprocessor {
                Some(preprocessor) => match preprocessor.preprocess(file.as_ref()) {
                    Ok(content) => content,
                    Err(err) => {
                        self.add_fatal_error(err.message());
                        return;
                    }
                },
                None => None,
            };
            let content = match preprocessed {
                Some(content) => content,
                None => match file.read_to_string() {
                    Ok(content) => content,
                    Err(err) => {
                        self.add_fatal_error(err.message());
                        return;
                    }
                },
            };
            sources.push(SourceFile {
                name: file.name(),
                content,
            });
        }

        let mut messages = CompileMessageList::new();
        let program = compiler.compile(
            &sources,
            &settings,
            hooks.cache,
            hooks.external_data,
            &mut messages,
        );

        if let Some(program) = program {
            let mut link_messages = CompileMessageList::new();
            if self.performer.load(&mut link_messages, &program)
                && self.performer.link(&mut link_messages, &settings)
            {
                self.program = program;
            }
            messages.extend(link_messages);
        }

        if let Some(console) = hooks.console {
            for message in messages.messages() {
                console.handle_message(&message.full_message);
            }
        }
        self.compile_messages.extend_from_slice(messages.messages());
        self.update_status();
    }
}

/// Stable key for a preprocessed source set, used by compiler caches.
pub fn source_set_key(sources: &[SourceFile]) -> String {
    let mut hasher = DefaultHasher::new();
    for source in sources {
        source.name.hash(&mut hasher);
        source.content.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}
