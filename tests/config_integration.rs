use std::path::{Path, PathBuf};
use std::time::Duration;

use markless_preview::config::{
    ConfigFlags, PreviewConfig, load_config_flags, parse_flag_tokens, save_config_flags,
};

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".marklesspreviewrc");
    let content = r#"
# comment
--watch

--debounce-ms 250
   
--debug-log=preview.log
"#;
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.watch);
    assert_eq!(flags.debounce_ms, Some(250));
    assert_eq!(flags.debug_log, Some(PathBuf::from("preview.log")));
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".marklesspreviewrc");
    std::fs::write(&path, "--watch\n--debounce-ms 900\n--debug-log file.log\n").unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "markless-preview".to_string(),
        "--debounce-ms".to_string(),
        "100".to_string(),
        "--no-images".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.watch, "file flags should remain enabled");
    assert!(effective.no_images, "cli flags should be applied");
    assert_eq!(effective.debounce_ms, Some(100), "cli should override debounce");
    assert_eq!(
        effective.debug_log,
        Some(PathBuf::from("file.log")),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_saved_flags_drive_preview_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    let saved = ConfigFlags {
        no_images: true,
        debounce_ms: Some(75),
        ..ConfigFlags::default()
    };
    save_config_flags(&path, &saved).unwrap();

    let loaded = load_config_flags(&path).unwrap();
    let config = PreviewConfig::from_flags(&loaded, Path::new("notes/today.md"));
    assert!(!config.preview_images);
    assert_eq!(config.debounce, Duration::from_millis(75));
    assert_eq!(config.base_dir, PathBuf::from("notes"));
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let flags = load_config_flags(&dir.path().join("absent")).unwrap();
    assert_eq!(flags, ConfigFlags::default());
}
