//! Patch facade tests against real files on disk.

mod helpers;

use bandstand::core::{
    BuildSettings, CompileMessageList, EndpointDetails, FrameType, Program, ProgramData,
};
use bandstand::patch::{
    CompileHooks, CompilerCache, ConsoleMessageHandler, ExternalDataProvider, NativeFile,
    PatchInstance, PlayerConfig,
    ProgramCompiler, SourceFile, SourceFilePreprocessor, VirtualFile,
};
use helpers::ScriptedFactory;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A unique scratch directory per test.
fn scratch_dir(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "bandstand-test-{}-{}-{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &PathBuf, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const GOOD_MANIFEST: &str = r#"{
    "patch": {
        "ID": "com.example.tone",
        "version": "1.0",
        "name": "Tone",
        "isInstrument": true,
        "source": "tone.dsp"
    }
}"#;

/// What the compiler double observed, shared with the test body.
#[derive(Clone, Default)]
struct StubState {
    seen_sources: Arc<Mutex<Vec<Vec<SourceFile>>>>,
    saw_cache: Arc<AtomicUsize>,
}

/// Compiler double: succeeds unless a source contains "syntax error".
struct StubCompiler {
    state: StubState,
}

impl ProgramCompiler for StubCompiler {
    fn compile(
        &self,
        sources: &[SourceFile],
        _settings: &BuildSettings,
        cache: Option<&dyn CompilerCache>,
        _external_data: Option<&dyn ExternalDataProvider>,
        messages: &mut CompileMessageList,
    ) -> Option<Program> {
        self.state.seen_sources.lock().unwrap().push(sources.to_vec());
        if cache.is_some() {
            self.state.saw_cache.fetch_add(1, Ordering::Relaxed);
        }
        if sources.iter().any(|s| s.content.contains("syntax error")) {
            messages.add_error("syntax error in program");
            return None;
        }
        Some(Program::new(ProgramData {
            name: "tone".into(),
            inputs: vec![],
            outputs: vec![EndpointDetails::stream("out", FrameType::FloatVector(2))],
        }))
    }
}

fn instance_for(manifest_path: PathBuf) -> (PatchInstance, StubState) {
    let state = StubState::default();
    let instance = PatchInstance::new(
        Box::new(ScriptedFactory::new()),
        Box::new(StubCompiler {
            state: state.clone(),
        }),
        NativeFile::new(manifest_path),
    );
    (instance, state)
}

#[test]
fn healthy_patch_compiles_into_a_playable_player() {
    let dir = scratch_dir("good");
    write(&dir, "tone.dsp", "graph tone {}");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    let (mut instance, compiler) = instance_for(manifest);

    let description = instance.description();
    assert!(!description.is_error());
    assert_eq!(description.uid, "com.example.tone");
    assert!(description.is_instrument);

    let player = instance.compile_new_player(&PlayerConfig::default(), CompileHooks::default());
    assert!(player.is_playable());
    assert!(player.compile_messages().is_empty());
    assert!(!player.program().is_empty());

    let seen = compiler.seen_sources.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0][0].name, "tone.dsp");
    assert_eq!(seen[0][0].content, "graph tone {}");
}

#[test]
fn refresh_failure_returns_a_player_with_one_fatal_message() {
    let dir = scratch_dir("missing-source");
    // Manifest names a source file that does not exist.
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    let (mut instance, _compiler) = instance_for(manifest);
    let player = instance.compile_new_player(&PlayerConfig::default(), CompileHooks::default());

    assert!(!player.is_playable());
    let messages = player.compile_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_error());
    assert_eq!(messages[0].full_message, "Cannot find file tone.dsp");
}

#[test]
fn compile_failure_is_reported_not_thrown() {
    let dir = scratch_dir("bad-source");
    write(&dir, "tone.dsp", "graph tone { syntax error }");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    let (mut instance, _compiler) = instance_for(manifest);
    let player = instance.compile_new_player(&PlayerConfig::default(), CompileHooks::default());

    assert!(!player.is_playable());
    assert!(player.program().is_empty());
    assert!(player
        .compile_messages()
        .iter()
        .any(|m| m.full_message.contains("syntax error")));
}

#[test]
fn broken_manifest_yields_an_error_stub_description() {
    let dir = scratch_dir("broken-manifest");
    let manifest = write(&dir, "tone.patch", "{ not json");

    let (mut instance, _compiler) = instance_for(manifest.clone());
    let description = instance.description();
    assert!(description.is_error());
    assert!(description
        .load_error
        .as_deref()
        .unwrap()
        .starts_with("Invalid manifest:"));

    // Fixing the file on disk heals the next refresh.
    write(&dir, "tone.dsp", "graph tone {}");
    write(&dir, "tone.patch", GOOD_MANIFEST);
    let description = instance.description();
    assert!(!description.is_error());
    assert_eq!(description.name, "Tone");
}

#[test]
fn modification_time_tracks_the_newest_file() {
    let dir = scratch_dir("mtime");
    write(&dir, "tone.dsp", "graph tone {}");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    let (mut instance, _compiler) = instance_for(manifest);
    let time = instance.last_modification_time();
    assert!(time.is_some());
    assert!(time.unwrap() > 0);
}

#[test]
fn preprocessor_and_console_hooks_are_honoured() {
    let dir = scratch_dir("hooks");
    write(&dir, "tone.dsp", "graph tone { syntax error }");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    struct FixItUp;
    impl SourceFilePreprocessor for FixItUp {
        fn preprocess(
            &self,
            file: &dyn VirtualFile,
        ) -> bandstand::patch::Result<Option<String>> {
            assert_eq!(file.name(), "tone.dsp");
            Ok(Some("graph tone {}".to_owned()))
        }
    }

    struct CollectingConsole(Mutex<Vec<String>>);
    impl ConsoleMessageHandler for CollectingConsole {
        fn handle_message(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_owned());
        }
    }

    let (mut instance, compiler) = instance_for(manifest);
    let console = CollectingConsole(Mutex::new(Vec::new()));
    let preprocessor = FixItUp;

    // The preprocessor replaces the broken source, so the build succeeds.
    let player = instance.compile_new_player(
        &PlayerConfig::default(),
        CompileHooks {
            preprocessor: Some(&preprocessor),
            console: Some(&console),
            ..CompileHooks::default()
        },
    );
    assert!(player.is_playable());
    let seen = compiler.seen_sources.lock().unwrap();
    assert_eq!(seen[0][0].content, "graph tone {}");
    assert!(console.0.lock().unwrap().is_empty());
}

#[test]
fn cache_is_threaded_through_to_the_compiler() {
    let dir = scratch_dir("cache");
    write(&dir, "tone.dsp", "graph tone {}");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    struct NullCache;
    impl CompilerCache for NullCache {
        fn store(&self, _key: &str, _data: &[u8]) {}
        fn load(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }
    }

    let (mut instance, compiler) = instance_for(manifest);
    let cache = NullCache;
    let player = instance.compile_new_player(
        &PlayerConfig::default(),
        CompileHooks {
            cache: Some(&cache),
            ..CompileHooks::default()
        },
    );
    assert!(player.is_playable());
    assert_eq!(compiler.saw_cache.load(Ordering::Relaxed), 1);
}

#[test]
fn location_points_at_the_manifest() {
    let dir = scratch_dir("location");
    write(&dir, "tone.dsp", "graph tone {}");
    let manifest = write(&dir, "tone.patch", GOOD_MANIFEST);

    let (instance, _compiler) = instance_for(manifest.clone());
    assert_eq!(
        instance.location().full_path(),
        manifest.to_string_lossy().as_ref()
    );
}
