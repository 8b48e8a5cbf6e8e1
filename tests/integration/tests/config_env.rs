//! Configuration files and environment overrides

use serial_test::serial;
use surfsync::utils::DriftCorrection;
use surfsync::{Config, SyncError};
use surfsync_integration_tests::TestFixture;

const ENV_KEYS: [&str; 4] = [
    "SURFSYNC_AUDIO_DELAY_MS",
    "SURFSYNC_RING_CAPACITY",
    "SURFSYNC_PULLDOWN_60HZ",
    "SURFSYNC_LOG_LEVEL",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_saved_config_loads_back() {
    clear_env();
    let fixture = TestFixture::new().unwrap();

    let mut config = Config::default();
    config.sync.audio_delay_ms = -40;
    config.video.ring_capacity = 6;
    config.audio.drift_correction = DriftCorrection::Both;
    let path = fixture.write_config(&config).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.sync.audio_delay_ms, -40);
    assert_eq!(loaded.video.ring_capacity, 6);
    assert_eq!(loaded.audio.drift_correction, DriftCorrection::Both);
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write("partial.toml", "[sync]\npulldown_60hz = true\n")
        .unwrap();

    let loaded = Config::load_from(&path).unwrap();
    let defaults = Config::default();
    assert!(loaded.sync.pulldown_60hz);
    assert_eq!(loaded.video.ring_capacity, defaults.video.ring_capacity);
    assert_eq!(loaded.sync.closing_ticks, defaults.sync.closing_ticks);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config(&Config::default()).unwrap();

    std::env::set_var("SURFSYNC_AUDIO_DELAY_MS", "120");
    std::env::set_var("SURFSYNC_RING_CAPACITY", "16");
    std::env::set_var("SURFSYNC_PULLDOWN_60HZ", "true");
    std::env::set_var("SURFSYNC_LOG_LEVEL", "debug");
    let loaded = Config::load_from(&path);
    clear_env();

    let loaded = loaded.unwrap();
    assert_eq!(loaded.sync.audio_delay_ms, 120);
    assert_eq!(loaded.sync.audio_delay_ticks(), 120 * 90);
    assert_eq!(loaded.video.ring_capacity, 16);
    assert!(loaded.sync.pulldown_60hz);
    assert_eq!(loaded.general.log_level, "debug");
}

#[test]
#[serial]
fn test_unparsable_environment_is_an_error() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write_config(&Config::default()).unwrap();

    std::env::set_var("SURFSYNC_RING_CAPACITY", "lots");
    let result = Config::load_from(&path);
    clear_env();

    assert!(matches!(result, Err(SyncError::Config(_))));
}

#[test]
#[serial]
fn test_ring_too_small_for_interlaced_is_rejected() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .write("small.toml", "[video]\nring_capacity = 3\n")
        .unwrap();

    assert!(matches!(Config::load_from(&path), Err(SyncError::Config(_))));
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    let path = fixture.write("broken.toml", "[sync\naudio_delay_ms = ").unwrap();

    assert!(matches!(Config::load_from(&path), Err(SyncError::Config(_))));
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    clear_env();
    let fixture = TestFixture::new().unwrap();
    assert!(Config::load_from(&fixture.path("absent.toml")).is_err());
}
