//! Integration tests for PyBundle
//!
//! Command construction is checked against real files on disk; the runner is
//! exercised with small `sh` scripts standing in for PyInstaller.

use std::{fs, path::PathBuf};
use tempfile::TempDir;
use pybundle::{
    command::{build, CommandLine},
    options::{CompressionLevel, ConversionOptions, OptimizationLevel, ToolInvocation},
    settings::load_profile,
    PackError,
};

/// Create a temporary directory holding `app.py`
fn create_source() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let source = temp_dir.path().join("app.py");
    fs::write(&source, "import numpy\nprint('hi')\n").expect("Failed to write test file");
    (temp_dir, source)
}

/// Options with every token-producing field populated
fn create_full_options(dir: &TempDir, source: PathBuf) -> ConversionOptions {
    let icon = dir.path().join("app.ico");
    let data = dir.path().join("data.json");
    fs::write(&icon, b"ico").expect("Failed to write icon");
    fs::write(&data, b"{}").expect("Failed to write data");

    let mut options = ConversionOptions {
        source,
        output_name: Some("app".to_string()),
        output_dir: Some(dir.path().join("out")),
        icon: Some(icon),
        single_file: true,
        windowed: false,
        no_console: true,
        clean: true,
        no_confirm: true,
        strip_debug: false,
        optimization: OptimizationLevel::try_from(1).expect("valid level"),
        extra_data: vec![data],
        compress: true,
        compression_level: CompressionLevel::try_from(3).expect("valid level"),
        extra_args: "--log-level DEBUG".to_string(),
        tool: ToolInvocation::new("python3"),
        ..ConversionOptions::default()
    };
    options.hidden_imports.insert("numpy");
    options.hidden_imports.insert("pandas");
    options
}

fn strings(tokens: &[String]) -> Vec<&str> {
    tokens.iter().map(String::as_str).collect()
}

#[test]
fn test_single_file_named_example() {
    let (_dir, source) = create_source();
    let options = ConversionOptions {
        source: source.clone(),
        single_file: true,
        windowed: false,
        output_name: Some("app".to_string()),
        tool: ToolInvocation::new("python3"),
        ..ConversionOptions::default()
    };

    let cmd = build(&options).expect("build should succeed");
    let source = source.to_string_lossy().into_owned();
    assert_eq!(
        strings(cmd.tokens()),
        vec![
            "python3",
            "-m",
            "PyInstaller",
            "--onefile",
            "--noconfirm",
            "--name",
            "app",
            "--noupx",
            source.as_str(),
        ]
    );
}

#[test]
fn test_full_token_order() {
    let (dir, source) = create_source();
    let options = create_full_options(&dir, source.clone());
    let out = dir.path().join("out");
    let data = dir.path().join("data.json");
    let sep = pybundle::command::DATA_SEPARATOR;

    let cmd = build(&options).expect("build should succeed");
    let expected: Vec<String> = vec![
        "python3".into(),
        "-m".into(),
        "PyInstaller".into(),
        "--onefile".into(),
        "--noconsole".into(),
        "--clean".into(),
        "--noconfirm".into(),
        "--name".into(),
        "app".into(),
        "--icon".into(),
        dir.path().join("app.ico").to_string_lossy().into_owned(),
        "--distpath".into(),
        out.join("dist").to_string_lossy().into_owned(),
        "--workpath".into(),
        out.join("build").to_string_lossy().into_owned(),
        "--specpath".into(),
        out.to_string_lossy().into_owned(),
        "--add-data".into(),
        format!("{}{}data.json", data.to_string_lossy(), sep),
        "--hidden-import".into(),
        "numpy".into(),
        "--hidden-import".into(),
        "pandas".into(),
        "-O1".into(),
        "--upx-dir=upx".into(),
        "--upx-level=3".into(),
        "--log-level".into(),
        "DEBUG".into(),
        source.to_string_lossy().into_owned(),
    ];

    assert_eq!(cmd.tokens(), expected.as_slice());
}

#[test]
fn test_build_is_deterministic() {
    let (dir, source) = create_source();
    let options = create_full_options(&dir, source);

    let first = build(&options).expect("build should succeed");
    let second = build(&options).expect("build should succeed");
    assert_eq!(first, second);
}

#[test]
fn test_missing_source_regardless_of_other_fields() {
    let (dir, _source) = create_source();

    for source in [PathBuf::new(), dir.path().join("nope.py"), dir.path().to_path_buf()] {
        let options = create_full_options(&dir, source);
        assert!(matches!(build(&options), Err(PackError::MissingSource)));
    }
}

#[test]
fn test_toggling_a_flag_keeps_other_tokens_in_order() {
    let (dir, source) = create_source();
    let base = create_full_options(&dir, source);

    fn flag_field<'a>(options: &'a mut ConversionOptions, flag: &str) -> &'a mut bool {
        match flag {
            "--onefile" => &mut options.single_file,
            "--windowed" => &mut options.windowed,
            "--noconsole" => &mut options.no_console,
            "--clean" => &mut options.clean,
            "--noconfirm" => &mut options.no_confirm,
            _ => &mut options.strip_debug,
        }
    }

    let flag_tokens = [
        "--onefile",
        "--windowed",
        "--noconsole",
        "--clean",
        "--noconfirm",
        "--strip",
    ];

    for flag in flag_tokens {
        let mut on = base.clone();
        *flag_field(&mut on, flag) = true;
        let mut off = base.clone();
        *flag_field(&mut off, flag) = false;

        let with_flag = build(&on).expect("build should succeed").into_tokens();
        let without_flag = build(&off).expect("build should succeed").into_tokens();

        let filtered: Vec<String> = with_flag.into_iter().filter(|t| t != flag).collect();
        assert_eq!(filtered, without_flag, "toggling {} reordered tokens", flag);
    }
}

#[test]
fn test_compression_level_follows_upx_dir() {
    let (_dir, source) = create_source();
    let options = ConversionOptions {
        source,
        compress: true,
        compression_level: CompressionLevel::try_from(5).expect("valid level"),
        ..ConversionOptions::default()
    };

    let tokens = build(&options).expect("build should succeed").into_tokens();
    let pos = tokens
        .iter()
        .position(|t| t == "--upx-dir=upx")
        .expect("upx dir present");
    assert_eq!(tokens[pos + 1], "--upx-level=5");
    assert!(!tokens.iter().any(|t| t == "--noupx"));
}

#[test]
fn test_profile_with_unknown_keys() {
    let (dir, source) = create_source();
    let profile = dir.path().join("profile.json");
    let json = format!(
        r#"{{
  "source": {:?},
  "windowed": true,
  "hidden_imports": ["PyQt5", "PyQt5.QtCore", "PyQt5"],
  "theme": "dark"
}}"#,
        source.to_string_lossy()
    );
    fs::write(&profile, json).expect("Failed to write profile");

    let options = load_profile(&profile).expect("profile should load");
    assert_eq!(options.source, source);
    assert!(options.windowed);
    assert!(options.single_file);
    assert!(options.no_confirm);
    assert_eq!(options.hidden_imports.to_vec(), vec!["PyQt5", "PyQt5.QtCore"]);
    assert!(build(&options).is_ok());
}

#[test]
fn test_command_line_display() {
    let cmd = CommandLine::from_tokens(["python3", "-m", "PyInstaller", "--onefile", "app.py"]);
    assert_eq!(cmd.to_string(), "python3 -m PyInstaller --onefile app.py");
}

#[cfg(unix)]
mod runner {
    use pybundle::{
        command::CommandLine,
        runner::{ConversionRunner, Outcome, RunEvent, SessionState, CANCELLED_MESSAGE},
    };
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn script(body: &str) -> CommandLine {
        CommandLine::from_tokens(["sh", "-c", body])
    }

    fn progress_values(events: &[RunEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn logs(events: &[RunEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Log(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_successful_run_streams_output() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cmd = script(
            "echo 'INFO: Analyzing app.py'; \
             echo 'INFO: Processing hook' >&2; \
             echo 'INFO: Building EXE'; \
             echo 'INFO: Copying icon'; \
             exit 0",
        );

        let events = ConversionRunner::start(cmd, dir.path()).wait();

        let lines = logs(&events);
        assert!(lines.contains(&"INFO: Analyzing app.py"));
        assert!(lines.contains(&"INFO: Processing hook"));
        assert!(lines.contains(&"INFO: Building EXE"));

        let progress = progress_values(&events);
        assert_eq!(progress.first(), Some(&10));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!(progress.iter().all(|p| *p <= 100));
        assert_eq!(progress.last(), Some(&100));

        let done: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Done { .. }))
            .collect();
        assert_eq!(done.len(), 1);
        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Succeeded,
                ..
            })
        ));
    }

    #[test]
    fn test_nonzero_exit_reports_single_failure() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cmd = script("echo 'ERROR: missing module'; exit 1");

        let mut handle = ConversionRunner::start(cmd, dir.path());
        let mut events = Vec::new();
        while let Some(event) = handle.recv() {
            events.push(event);
        }

        let done_at = events
            .iter()
            .position(|e| matches!(e, RunEvent::Done { .. }))
            .expect("Done event present");
        assert_eq!(done_at, events.len() - 1);
        match &events[done_at] {
            RunEvent::Done { outcome, message } => {
                assert_eq!(*outcome, Outcome::Failed);
                assert!(message.contains("exit code 1"));
            }
            _ => unreachable!(),
        }
        assert!(!progress_values(&events).contains(&100));
        assert_eq!(handle.state(), SessionState::Failed);
        assert!(handle.recv().is_none());
    }

    #[test]
    fn test_runs_in_working_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let events = ConversionRunner::start(script("touch marker"), dir.path()).wait();

        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Succeeded,
                ..
            })
        ));
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_cancel_terminates_child() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cmd = script("while true; do echo 'INFO: Processing'; sleep 0.05; done");
        let mut handle = ConversionRunner::start(cmd, dir.path());

        // Wait for the tool to produce output before cancelling.
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(Instant::now() < deadline, "no output before deadline");
            match handle.recv_timeout(Duration::from_millis(100)) {
                Some(RunEvent::Log(line)) if line == "INFO: Processing" => break,
                Some(RunEvent::Done { .. }) => panic!("session ended early"),
                _ => {}
            }
        }

        assert!(handle.cancel());
        handle.cancel();
        assert!(handle.is_cancelled());

        let mut last = None;
        while let Some(event) = handle.recv_timeout(Duration::from_secs(10)) {
            let done = matches!(event, RunEvent::Done { .. });
            last = Some(event);
            if done {
                break;
            }
        }

        assert_eq!(
            last,
            Some(RunEvent::Done {
                outcome: Outcome::Cancelled,
                message: CANCELLED_MESSAGE.to_string(),
            })
        );
        assert_eq!(handle.state(), SessionState::Cancelled);
        assert!(!handle.cancel());
        assert!(handle.recv_timeout(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn test_cancel_after_done_is_noop() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut handle = ConversionRunner::start(script("echo done"), dir.path());
        while handle.recv().is_some() {}

        assert_eq!(handle.state(), SessionState::Succeeded);
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
        assert_eq!(handle.state(), SessionState::Succeeded);
    }

    #[test]
    fn test_cancel_after_last_line_keeps_success() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cmd = script("echo last; sleep 0.5; touch artifact; exit 0");
        let mut handle = ConversionRunner::start(cmd, dir.path());

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(Instant::now() < deadline, "no output before deadline");
            match handle.recv_timeout(Duration::from_millis(100)) {
                Some(RunEvent::Log(line)) if line == "last" => break,
                Some(RunEvent::Done { .. }) => panic!("session ended early"),
                _ => {}
            }
        }

        handle.cancel();
        let events = handle.wait();

        assert!(dir.path().join("artifact").exists());
        assert!(events.contains(&RunEvent::Progress(100)));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Succeeded,
                ..
            })
        ));
    }

    #[test]
    fn test_shutdown_kills_silent_tool() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cmd = script("sleep 30; touch artifact");
        let mut handle = ConversionRunner::start(cmd, dir.path());

        // Banner and launch progress arrive before the tool goes quiet.
        while let Some(event) = handle.recv_timeout(Duration::from_millis(500)) {
            if event == RunEvent::Progress(20) {
                break;
            }
        }

        let started = Instant::now();
        let events = handle.shutdown();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            events.last(),
            Some(&RunEvent::Done {
                outcome: Outcome::Cancelled,
                message: CANCELLED_MESSAGE.to_string(),
            })
        );
        assert!(!dir.path().join("artifact").exists());
    }

    #[test]
    fn test_sessions_do_not_share_cancellation() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let first = ConversionRunner::start(script("sleep 0.2; echo one"), dir.path());
        let second = ConversionRunner::start(script("echo two"), dir.path());

        assert!(first.cancel());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        let events = second.wait();
        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Succeeded,
                ..
            })
        ));

        let events = first.wait();
        assert!(matches!(
            events.last(),
            Some(RunEvent::Done {
                outcome: Outcome::Cancelled,
                ..
            })
        ));
    }
}
