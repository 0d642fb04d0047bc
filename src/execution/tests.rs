use super::*;
use crate::errors::RibError;
use crate::test_support::{serial_guard, write_script};
use crate::utils::ExecutableResolver;
use crate::workspace::Workspace;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn workspace() -> (tempfile::TempDir, Workspace) {
    let tmp = tempfile::tempdir().unwrap();
    let ws = Workspace::init(tmp.path().join("work")).unwrap();
    (tmp, ws)
}

fn runner(sink: &Arc<MemorySink>) -> ProcessRunner {
    ProcessRunner::new(ExecutableResolver::new(Vec::new())).with_sink(sink.clone())
}

fn request(ws: &Workspace, script: &Path, flags: &[Flag]) -> ExecutionRequest {
    ExecutionRequest::new(script, FlagSet::from_flags(flags)).in_workspace(ws)
}

fn leftover_volatile(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            name.starts_with(".volatile.") || name.starts_with(".exec.")
        })
        .collect()
}

/// Fake wrappers that skip their options and run the wrapped command on the
/// host, mapping chroot paths onto the root directory.
fn fake_wrappers(dir: &Path) -> ExecutableResolver {
    write_script(
        dir,
        "fakechroot",
        "while [ \"$1\" != \"--\" ]; do shift; done\nshift\nexec \"$@\"\n",
    );
    write_script(
        dir,
        "fakeroot",
        "while [ \"$1\" != \"--\" ]; do shift; done\nshift\nexec \"$@\"\n",
    );
    write_script(
        dir,
        "chroot",
        "root=\"$1\"\nshift\nprog=\"$1\"\nshift\nexec \"$root$prog\" \"$@\"\n",
    );
    ExecutableResolver::new(vec![dir.to_path_buf()])
}

#[test]
fn captured_output_reaches_sink_in_order() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(
        &ws.build_dir(),
        "10--echo",
        "echo first\necho oops >&2\necho second\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let result = runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout_lines, 2);
    assert_eq!(result.stderr_lines, 1);
    assert_eq!(sink.lines_from(StreamSource::Stdout), vec!["first", "second"]);
    assert_eq!(sink.lines_from(StreamSource::Stderr), vec!["oops"]);
}

#[test]
fn child_sees_composed_environment_only() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(
        &ws.build_dir(),
        "10--env",
        "echo \"marker=$RIB_EXEC_ENV\"\necho \"home=$HOME\"\necho \"rootfs=$RIB_DIR_ROOTFS\"\n\
         test -d \"$VTEMP\" && echo vtemp-ok\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap();

    let lines = sink.lines_from(StreamSource::Stdout);
    assert_eq!(
        lines,
        vec![
            "marker=1".to_string(),
            "home=".to_string(),
            format!("rootfs={}", ws.rootfs_dir().display()),
            "vtemp-ok".to_string(),
        ]
    );
    assert!(leftover_volatile(&ws.temp_dir()).is_empty());
}

#[test]
fn side_channel_carries_variables_to_later_scripts() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let setter = write_script(
        &ws.build_dir(),
        "10--set",
        "printf 'setenv\\037FOO\\037bar baz\\000' >&3\nprintf 'setenv\\037GONE\\037x\\000' >&3\n\
         printf 'unsetenv\\037GONE\\037\\000' >&3\n",
    );
    let reader = write_script(&ws.build_dir(), "20--get", "echo \"FOO=$FOO GONE=$GONE\"\n");
    let sink = Arc::new(MemorySink::new());
    let runner = runner(&sink);
    let mut env = PersistentEnv::new();

    let result = runner.run(request(&ws, &setter, &[]), &mut env).unwrap();
    assert_eq!(result.records, 3);
    assert_eq!(env.get("FOO"), Some("bar baz"));
    assert_eq!(env.get("GONE"), None);

    runner.run(request(&ws, &reader, &[]), &mut env).unwrap();
    assert_eq!(
        sink.lines_from(StreamSource::Stdout),
        vec!["FOO=bar baz GONE="]
    );
}

#[test]
fn persistent_value_overrides_builtin_default() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(&ws.build_dir(), "10--vtemp", "echo \"$VTEMP\"\n");
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();
    env.setenv("VTEMP", "/override");

    runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap();

    assert_eq!(sink.lines_from(StreamSource::Stdout), vec!["/override"]);
}

#[test]
fn failing_script_is_error_and_cleans_up() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(&ws.build_dir(), "10--fail", "touch \"$VTEMP/junk\"\nexit 3\n");
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let err = runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap_err();

    assert!(matches!(err, RibError::ProcessExit { code: 3, .. }));
    assert!(leftover_volatile(&ws.temp_dir()).is_empty());
}

#[test]
fn ignore_exit_downgrades_failure() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(&ws.build_dir(), "10-E-fail", "exit 7\n");
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let result = runner(&sink)
        .run(request(&ws, &script, &[Flag::IgnoreExit]), &mut env)
        .unwrap();

    assert_eq!(result.exit_code, Some(7));
}

#[test]
fn killed_script_reports_signal() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(&ws.build_dir(), "10--kill", "kill -9 $$\n");
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let err = runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap_err();

    assert!(matches!(err, RibError::ProcessSignal { signal: 9, .. }));
}

#[test]
fn malformed_record_fails_even_with_ignore_exit() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(
        &ws.build_dir(),
        "10-E-bad",
        "printf 'setenv\\037A\\0371\\000broken\\000' >&3\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let err = runner(&sink)
        .run(request(&ws, &script, &[Flag::IgnoreExit]), &mut env)
        .unwrap_err();

    assert!(matches!(err, RibError::Decode(_)));
    assert_eq!(env.get("A"), Some("1"));
    assert!(leftover_volatile(&ws.temp_dir()).is_empty());
}

#[test]
fn start_failure_is_reported_and_cleans_up() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = ws.build_dir().join("10--not-executable");
    fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let err = runner(&sink)
        .run(request(&ws, &script, &[Flag::IgnoreExit]), &mut env)
        .unwrap_err();

    assert!(matches!(err, RibError::ProcessStart { .. }));
    assert!(leftover_volatile(&ws.temp_dir()).is_empty());
}

#[test]
fn interactive_mode_still_decodes_side_channel() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(
        &ws.build_dir(),
        "10-I-tty",
        "printf 'setenv\\037MODE\\037tty\\000' >&3\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let result = runner(&sink)
        .run(request(&ws, &script, &[Flag::Interactive]), &mut env)
        .unwrap();

    assert_eq!(env.get("MODE"), Some("tty"));
    assert_eq!(result.stdout_lines, 0);
    assert!(sink.lines().is_empty());
}

#[test]
fn background_writer_does_not_outlive_drain() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    // The subshell keeps the pipes open after the script itself exits
    let script = write_script(
        &ws.build_dir(),
        "10--bg",
        "( sleep 0.2; echo late; printf 'setenv\\037LATE\\0371\\000' >&3 ) &\necho early\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap();

    assert_eq!(sink.lines_from(StreamSource::Stdout), vec!["early", "late"]);
    assert_eq!(env.get("LATE"), Some("1"));
}

#[test]
fn chroot_mode_stages_script_and_wraps_it() {
    let _guard = serial_guard();
    let (tmp, ws) = workspace();
    let tools = tmp.path().join("tools");
    fs::create_dir(&tools).unwrap();
    let resolver = fake_wrappers(&tools);
    let script = write_script(
        &ws.build_dir(),
        "10-C-inside",
        "echo \"argv0=$0\"\necho \"path=$PATH\"\nprintf 'setenv\\037VT\\037%s\\000' \"$VTEMP\" >&3\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    ProcessRunner::new(resolver)
        .with_sink(sink.clone())
        .run(request(&ws, &script, &[Flag::Chroot]), &mut env)
        .unwrap();

    let lines = sink.lines_from(StreamSource::Stdout);
    let argv0 = lines[0].strip_prefix("argv0=").unwrap();
    assert!(argv0.starts_with(&ws.rootfs_dir().join(".exec.").display().to_string()));
    assert!(argv0.ends_with("/10-C-inside"));
    assert_eq!(lines[1], "path=/usr/sbin:/usr/bin:/sbin:/bin");
    assert!(env.get("VT").unwrap().starts_with("/.volatile."));
    assert!(leftover_volatile(&ws.rootfs_dir()).is_empty());
}

#[test]
fn chroot_mode_without_wrappers_fails_before_spawn() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(&ws.build_dir(), "10-C-x", "exit 0\n");
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let err = runner(&sink)
        .run(request(&ws, &script, &[Flag::Chroot]), &mut env)
        .unwrap_err();

    assert!(matches!(err, RibError::ExecutableNotFound(_)));
    assert!(leftover_volatile(&ws.rootfs_dir()).is_empty());
}

#[test]
fn heavy_output_on_both_streams_is_fully_drained() {
    let _guard = serial_guard();
    let (_tmp, ws) = workspace();
    let script = write_script(
        &ws.build_dir(),
        "10--flood",
        "i=0\nwhile [ $i -lt 10000 ]; do echo \"out $i\"; echo \"err $i\" >&2; i=$((i+1)); done\n",
    );
    let sink = Arc::new(MemorySink::new());
    let mut env = PersistentEnv::new();

    let result = runner(&sink)
        .run(request(&ws, &script, &[]), &mut env)
        .unwrap();

    assert_eq!(result.stdout_lines, 10_000);
    assert_eq!(result.stderr_lines, 10_000);
    let out = sink.lines_from(StreamSource::Stdout);
    let err = sink.lines_from(StreamSource::Stderr);
    assert_eq!(out.len(), 10_000);
    assert_eq!(err.len(), 10_000);
    for i in 0..10_000 {
        assert_eq!(out[i], format!("out {}", i));
        assert_eq!(err[i], format!("err {}", i));
    }
}
