//! `grounded check`: configuration and collaborator diagnostics.
//!
//! Verifies the configuration, the external player, the still-frame source,
//! the prerecorded clips and the backend's `/health` endpoint.

use crate::audio::ClipLibrary;
use crate::config::Config;
use std::path::{Path, PathBuf};

/// Result of a single check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Present and working
    Ok,
    /// Not configured or not found
    NotFound,
    /// Present but with issues
    Warning(String),
}

/// Find `program` on `PATH` (or as a literal path).
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Check the configured player command.
pub fn check_player(command: Option<&str>) -> CheckResult {
    let Some(command) = command else {
        return CheckResult::NotFound;
    };
    match command.split_whitespace().next() {
        None => CheckResult::Warning("player command is empty".to_string()),
        Some(program) => match find_program(program) {
            Some(_) => CheckResult::Ok,
            None => CheckResult::Warning(format!("'{}' not found on PATH", program)),
        },
    }
}

/// Check the still-frame file the camera process refreshes.
pub fn check_frame(path: Option<&Path>) -> CheckResult {
    let Some(path) = path else {
        return CheckResult::NotFound;
    };
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("{} is empty", path.display())),
        Err(e) => CheckResult::Warning(format!("{}: {}", path.display(), e)),
    }
}

/// Count prerecorded clips that load as audio rather than speech.
pub fn check_clips(dir: Option<&Path>, min_bytes: usize) -> CheckResult {
    let Some(dir) = dir else {
        return CheckResult::NotFound;
    };
    let clips = ClipLibrary::load(Some(dir), min_bytes);
    let missing: Vec<&str> = [&clips.opening, &clips.closing, &clips.fallback]
        .into_iter()
        .filter(|clip| !clip.is_encoded())
        .filter_map(|clip| clip.source.as_deref())
        .collect();
    if missing.is_empty() {
        CheckResult::Ok
    } else {
        CheckResult::Warning(format!("spoken instead: {}", missing.join(", ")))
    }
}

/// Query the backend's health endpoint.
#[cfg(feature = "http-backend")]
pub async fn check_backend(config: &Config) -> CheckResult {
    let backend = crate::dispatch::HttpBackend::new(&config.backend);
    match tokio::time::timeout(
        std::time::Duration::from_millis(config.backend.text_timeout_ms),
        backend.check_health(),
    )
    .await
    {
        Ok(Ok(_)) => CheckResult::Ok,
        Ok(Err(e)) => CheckResult::Warning(e.to_string()),
        Err(_) => CheckResult::Warning("health check timed out".to_string()),
    }
}

fn report(label: &str, result: &CheckResult, ok: &str, not_found: &str) -> bool {
    match result {
        CheckResult::Ok => {
            println!("{}: ✓ {}", label, ok);
            true
        }
        CheckResult::NotFound => {
            println!("{}: - {}", label, not_found);
            true
        }
        CheckResult::Warning(msg) => {
            println!("{}: ⚠ {}", label, msg);
            false
        }
    }
}

/// Run every check and print results. Returns `true` when nothing warned.
pub async fn run_checks(config: &Config) -> bool {
    println!("Checking grounded setup...\n");
    let mut healthy = true;

    let config_result = match config.validate() {
        Ok(()) => CheckResult::Ok,
        Err(e) => CheckResult::Warning(e.to_string()),
    };
    healthy &= report("configuration", &config_result, "valid", "");

    healthy &= report(
        "player",
        &check_player(config.audio.player_command.as_deref()),
        "found",
        "none configured (simulated playback)",
    );
    healthy &= report(
        "camera frame",
        &check_frame(config.detection.frame_path.as_deref()),
        "readable",
        "none configured (visual loops skip every cycle)",
    );
    healthy &= report(
        "clips",
        &check_clips(config.audio.clip_dir.as_deref(), config.audio.min_audio_bytes),
        "all prerecorded",
        "none configured (texts are spoken)",
    );

    #[cfg(feature = "http-backend")]
    {
        let backend = check_backend(config).await;
        healthy &= report(
            &format!("backend {}", config.backend.url),
            &backend,
            "healthy",
            "",
        );
    }

    println!();
    if healthy {
        println!("All checks passed.");
    } else {
        println!("Some checks reported warnings.");
    }
    healthy
}
