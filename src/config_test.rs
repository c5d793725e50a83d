use super::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Serializes env mutation across the tests in this file.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_guard()`.
unsafe fn clear_where_env() {
    unsafe {
        std::env::remove_var("PORT");
        std::env::remove_var("WHERE_DEFAULT_ZOOM");
        std::env::remove_var("WHERE_ZOOM_FLOOR");
        std::env::remove_var("WHERE_PROBE_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("WHERE_PROBE_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("WHERE_AGENT_KEY");
        std::env::remove_var("WHERE_NICKNAME");
        std::env::remove_var("WHERE_AVATAR_URL");
    }
}

#[test]
fn from_env_uses_defaults() {
    let _guard = env_guard();
    unsafe { clear_where_env() };

    let cfg = WhereConfig::from_env().unwrap();
    assert_eq!(cfg, WhereConfig::default());
    assert_eq!(cfg.avatar_url, DEFAULT_AVATAR_URL);
    assert_eq!(
        cfg.probe_timeouts,
        ProbeTimeouts {
            request_secs: DEFAULT_PROBE_REQUEST_TIMEOUT_SECS,
            connect_secs: DEFAULT_PROBE_CONNECT_TIMEOUT_SECS
        }
    );
}

#[test]
fn from_env_parses_overrides() {
    let _guard = env_guard();
    unsafe {
        clear_where_env();
        std::env::set_var("PORT", "8088");
        std::env::set_var("WHERE_DEFAULT_ZOOM", "0.5");
        std::env::set_var("WHERE_ZOOM_FLOOR", "0.1");
        std::env::set_var("WHERE_PROBE_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("WHERE_PROBE_CONNECT_TIMEOUT_SECS", "not-a-number");
        std::env::set_var("WHERE_AGENT_KEY", "agent-x");
        std::env::set_var("WHERE_NICKNAME", "Xavi");
    }

    let cfg = WhereConfig::from_env().unwrap();
    assert_eq!(cfg.port, 8088);
    assert!((cfg.default_zoom - 0.5).abs() < f64::EPSILON);
    assert!((cfg.zoom_floor - 0.1).abs() < f64::EPSILON);
    assert_eq!(cfg.probe_timeouts, ProbeTimeouts { request_secs: 42, connect_secs: DEFAULT_PROBE_CONNECT_TIMEOUT_SECS });
    assert_eq!(cfg.agent_key, "agent-x");
    assert_eq!(cfg.nickname, "Xavi");

    unsafe { clear_where_env() };
}

#[test]
fn from_env_rejects_non_positive_zoom() {
    let _guard = env_guard();
    unsafe {
        clear_where_env();
        std::env::set_var("WHERE_DEFAULT_ZOOM", "0");
    }

    let err = WhereConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("WHERE_DEFAULT_ZOOM must be a positive number"));

    unsafe { clear_where_env() };
}

#[test]
fn from_env_rejects_floor_above_default() {
    let _guard = env_guard();
    unsafe {
        clear_where_env();
        std::env::set_var("WHERE_ZOOM_FLOOR", "2.0");
    }

    let err = WhereConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("exceeds WHERE_DEFAULT_ZOOM"));

    unsafe { clear_where_env() };
}

#[test]
fn from_env_rejects_bad_port() {
    let _guard = env_guard();
    unsafe {
        clear_where_env();
        std::env::set_var("PORT", "99999");
    }

    let err = WhereConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("invalid PORT"));

    unsafe { clear_where_env() };
}
