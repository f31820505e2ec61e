//! Per-machine seed for the config encryption key.
//!
//! Uses the OS machine identifier when one is readable by a normal user process, otherwise the
//! home directory path. The seed only ties the stored API key to this machine/account; it is
//! not a secret.

use tracing::debug;

/// Returns the seed material used to derive the config key.
pub fn key_seed() -> String {
    if let Some(id) = machine_id() {
        return id;
    }
    debug!("No machine id available, deriving config key from home directory");
    dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snip2excel".to_string())
}

/// Returns the OS machine ID if available.
pub fn machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    return read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id"));

    #[cfg(target_os = "windows")]
    return machine_guid_windows();

    #[cfg(target_os = "macos")]
    return platform_uuid_macos();

    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    None
}

#[cfg(target_os = "linux")]
fn read_trimmed(path: &str) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "windows")]
fn machine_guid_windows() -> Option<String> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let key = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey(r"SOFTWARE\Microsoft\Cryptography")
        .ok()?;
    let guid: String = key.get_value("MachineGuid").ok()?;
    Some(guid.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
fn platform_uuid_macos() -> Option<String> {
    let out = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    parse_ioreg_uuid(&String::from_utf8_lossy(&out.stdout))
}

/// Extracts the value from a line like `"IOPlatformUUID" = "XXXXXXXX-XXXX-..."`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_ioreg_uuid(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('"').nth(3))
        .map(str::trim)
        .filter(|value| value.contains('-'))
        .map(str::to_string)
}
