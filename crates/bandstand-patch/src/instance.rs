//! One patch on disk: a lazily refreshed description and a factory for
//! compiled players.

use crate::file::VirtualFile;
use crate::file_list::FileList;
use crate::manifest::Description;
use crate::player::{CompileHooks, PatchPlayer, PlayerConfig, ProgramCompiler};
use bandstand_core::{BuildSettings, PerformerFactory};
use std::sync::Arc;

/// Handle to one patch, rooted at its manifest file.
///
/// Refreshing is failure-tolerant: a broken manifest yields an error-stub
/// description rather than failing the call, and
/// [`compile_new_player`](Self::compile_new_player) always returns a player
/// whose message list says how the build went.
pub struct PatchInstance {
    performer_factory: Box<dyn PerformerFactory>,
    compiler: Box<dyn ProgramCompiler>,
    manifest_file: Arc<dyn VirtualFile>,
    file_list: FileList,
}

impl PatchInstance {
    pub fn new(
        performer_factory: Box<dyn PerformerFactory>,
        compiler: Box<dyn ProgramCompiler>,
        manifest_file: Arc<dyn VirtualFile>,
    ) -> Self {
        Self {
            file_list: FileList::new(manifest_file.clone()),
            performer_factory,
            compiler,
            manifest_file,
        }
    }

    /// The manifest file this instance was opened from.
    pub fn location(&self) -> &Arc<dyn VirtualFile> {
        &self.manifest_file
    }

    fn refresh_file_list(&mut self) -> crate::error::Result<Arc<Description>> {
        self.file_list.refresh()?;
        Ok(Arc::new(self.file_list.create_description()))
    }

    /// Refresh that folds failures into an error-stub description instead of
    /// propagating them.
    fn silent_refresh_file_list(&mut self) -> Arc<Description> {
        match self.refresh_file_list() {
            Ok(description) => description,
            Err(err) => {
                tracing::debug!("patch refresh failed: {err}");
                Arc::new(Description::from_error(
                    &self.file_list.manifest_path(),
                    err.message(),
                ))
            }
        }
    }

    /// The current description; on refresh failure it carries the error that
    /// produced it.
    pub fn description(&mut self) -> Arc<Description> {
        self.silent_refresh_file_list()
    }

    /// Max modification time across the patch's files, in milliseconds.
    pub fn last_modification_time(&mut self) -> Option<i64> {
        self.silent_refresh_file_list();
        self.file_list.most_recent_modification_time()
    }

    /// Refreshes the file list and compiles a player for it. Never fails:
    /// when the refresh or the build goes wrong, the returned player carries
    /// a single fatal message with the failure's text.
    pub fn compile_new_player(
        &mut self,
        config: &PlayerConfig,
        hooks: CompileHooks<'_>,
    ) -> PatchPlayer {
        let settings = BuildSettings {
            sample_rate: config.sample_rate,
            max_block_size: config.max_frames_per_block,
        };

        match self.refresh_file_list() {
            Ok(_) => {
                let mut player = PatchPlayer::new(
                    self.file_list.clone(),
                    *config,
                    self.performer_factory.create_performer(),
                );
                player.compile(settings, self.compiler.as_ref(), hooks);
                player
            }
            Err(err) => {
                tracing::warn!("cannot compile player: {err}");
                let mut player = PatchPlayer::new(
                    self.file_list.clone(),
                    *config,
                    self.performer_factory.create_performer(),
                );
                player.add_fatal_error(err.message());
                player
            }
        }
    }
}
