use std::env;
use std::process::Command;

/// Used when no detector applies or the host does not report an L1d size.
const DEFAULT_L1D_CACHE_BYTES: usize = 32 * 1024;

const OVERRIDE_VAR: &str = "SYMTRANS_L1D_CACHE_BYTES";

// Cache size detection trait to keep per-platform probes separate
trait CacheSizeDetector {
    fn l1d_cache_bytes(&self) -> Option<usize>;
    fn is_applicable(&self) -> bool;
}

// Linux: walk the sysfs cache descriptors of cpu0 and pick the level 1 data cache
struct LinuxDetector;
impl CacheSizeDetector for LinuxDetector {
    fn l1d_cache_bytes(&self) -> Option<usize> {
        let base = "/sys/devices/system/cpu/cpu0/cache";
        for index in 0..8 {
            let dir = format!("{base}/index{index}");
            let level = std::fs::read_to_string(format!("{dir}/level")).ok()?;
            let kind = std::fs::read_to_string(format!("{dir}/type")).ok()?;
            if level.trim() != "1" || kind.trim() != "Data" {
                continue;
            }
            let size = std::fs::read_to_string(format!("{dir}/size")).ok()?;
            return parse_size(size.trim());
        }
        None
    }

    fn is_applicable(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

// macOS: sysctl reports the L1d size in bytes
struct MacOSDetector;
impl CacheSizeDetector for MacOSDetector {
    fn l1d_cache_bytes(&self) -> Option<usize> {
        let output = Command::new("sysctl")
            .args(["-n", "hw.l1dcachesize"])
            .output()
            .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    fn is_applicable(&self) -> bool {
        cfg!(target_os = "macos")
    }
}

/// Parses sysfs sizes such as `32K`, `1024K` or `2M`.
fn parse_size(raw: &str) -> Option<usize> {
    let (digits, multiplier) = match raw.chars().last()? {
        'K' | 'k' => (&raw[..raw.len() - 1], 1024),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        _ => (raw, 1),
    };
    digits.parse::<usize>().ok().map(|value| value * multiplier)
}

struct PlatformDetector;
impl PlatformDetector {
    fn detectors() -> Vec<Box<dyn CacheSizeDetector>> {
        vec![Box::new(LinuxDetector), Box::new(MacOSDetector)]
    }

    fn detect() -> Option<usize> {
        Self::detectors()
            .into_iter()
            .find(|detector| detector.is_applicable())
            .and_then(|detector| detector.l1d_cache_bytes())
            .filter(|bytes| *bytes > 0)
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed={OVERRIDE_VAR}");
    println!("cargo:rerun-if-changed=build.rs");

    // Explicit override wins over detection
    let from_env = env::var(OVERRIDE_VAR)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|bytes| *bytes > 0);

    // Host probing only makes sense when the build runs on the target
    let host = env::var("HOST").unwrap_or_default();
    let target = env::var("TARGET").unwrap_or_default();
    let is_native_build = host == target;

    let l1d = from_env
        .or_else(|| is_native_build.then(PlatformDetector::detect).flatten())
        .unwrap_or(DEFAULT_L1D_CACHE_BYTES);

    println!("cargo:rustc-env={OVERRIDE_VAR}={l1d}");
}
