/// Monitor brightness control over DDC/CI, using the `ddcutil` command line tool.
use crate::config::MonitorId;

use regex::Regex;
use std::fmt;
use std::process::{Command, Output};
use std::sync::LazyLock;

/// VCP feature code for luminance
pub const VCP_BRIGHTNESS: u8 = 0x10;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("could not understand ddcutil output: {0}")]
    Unparseable(String),
    #[error("no display matches {0:?} ({1} detected)")]
    NotFound(MonitorId, usize),
}

/// A display detected by ddcutil.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayInfo {
    /// ddcutil display number, starting at 1
    pub display_no: u32,
    pub bus: Option<u32>,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

impl fmt::Display for DisplayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Display {0}: {1} {2} {3}",
            self.display_no, self.manufacturer, self.model, self.serial_number
        )?;
        if let Some(bus) = self.bus {
            write!(f, " (i2c-{bus})")?;
        }
        Ok(())
    }
}

/// Continuous VCP value: current setting and the maximum the monitor accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VcpValue {
    pub current: u16,
    pub max: u16,
}

pub trait MonitorControl {
    fn enumerate(&self) -> Result<Vec<DisplayInfo>, MonitorError>;
    fn get_brightness(&self, display: &DisplayInfo) -> Result<VcpValue, MonitorError>;
    fn set_brightness(&self, display: &DisplayInfo, pct: u16) -> Result<(), MonitorError>;
}

/// Pick the display the configuration refers to.
pub fn select_display<'d>(
    displays: &'d [DisplayInfo],
    id: &MonitorId,
) -> Result<&'d DisplayInfo, MonitorError> {
    let found = match id {
        MonitorId::Index(idx) => displays.get(*idx),
        MonitorId::Bus(bus) => displays.iter().find(|d| d.bus == Some(*bus)),
        MonitorId::Model(manufacturer, model) => displays
            .iter()
            .find(|d| &d.manufacturer == manufacturer && &d.model == model),
        MonitorId::Serial(serial) => displays.iter().find(|d| &d.serial_number == serial),
    };

    found.ok_or_else(|| MonitorError::NotFound(id.clone(), displays.len()))
}

#[derive(Debug, Clone)]
pub struct Ddcutil {
    program: String,
}

impl Ddcutil {
    pub fn new(program: impl Into<String>) -> Self {
        Ddcutil {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String, MonitorError> {
        tracing::debug!("running {} {}", self.program, args.join(" "));
        let Output {
            status,
            stdout,
            stderr,
        } = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| MonitorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(MonitorError::Failed {
                command: format!("{} {}", self.program, args.join(" ")),
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Arguments that address one display: by bus when known since display numbers can shift.
    fn target_args(display: &DisplayInfo) -> [String; 2] {
        match display.bus {
            Some(bus) => ["--bus".to_string(), bus.to_string()],
            None => ["--display".to_string(), display.display_no.to_string()],
        }
    }
}

impl MonitorControl for Ddcutil {
    fn enumerate(&self) -> Result<Vec<DisplayInfo>, MonitorError> {
        let out = self.run(&["detect".to_string(), "--terse".to_string()])?;
        Ok(parse_detect(&out))
    }

    fn get_brightness(&self, display: &DisplayInfo) -> Result<VcpValue, MonitorError> {
        let mut args = vec!["getvcp".to_string(), format!("{VCP_BRIGHTNESS:#04x}")];
        args.extend(Self::target_args(display));

        let out = self.run(&args)?;
        parse_getvcp(&out).ok_or_else(|| MonitorError::Unparseable(out.trim().to_string()))
    }

    fn set_brightness(&self, display: &DisplayInfo, pct: u16) -> Result<(), MonitorError> {
        let mut args = vec![
            "setvcp".to_string(),
            format!("{VCP_BRIGHTNESS:#04x}"),
            pct.to_string(),
        ];
        args.extend(Self::target_args(display));

        self.run(&args)?;
        Ok(())
    }
}

static RE_DISPLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Display\s+(\d+)").expect("valid regex"));
static RE_BUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"I2C bus:\s*/dev/i2c-(\d+)").expect("valid regex"));
static RE_MONITOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Monitor:\s*(.*)$").expect("valid regex"));
static RE_VCP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"current value\s*=\s*(\d+),\s*max value\s*=\s*(\d+)").expect("valid regex")
});

/// Parse the output of `ddcutil detect --terse`.
///
/// Only "Display N" entries are kept. Any other top-level header ("Invalid display",
/// "Phantom display", ...) closes the current entry and its indented lines are skipped.
pub fn parse_detect(out: &str) -> Vec<DisplayInfo> {
    let mut res = Vec::new();
    let mut cur: Option<DisplayInfo> = None;

    for line in out.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            res.extend(cur.take());
            cur = RE_DISPLAY
                .captures(line)
                .and_then(|c| c[1].parse().ok())
                .map(|display_no| DisplayInfo {
                    display_no,
                    ..Default::default()
                });
            continue;
        }

        let Some(d) = cur.as_mut() else { continue };
        if let Some(c) = RE_BUS.captures(line) {
            d.bus = c[1].parse().ok();
        } else if let Some(c) = RE_MONITOR.captures(line) {
            // MFG:MODEL:SERIAL, where the model may itself contain colons
            let ident = c[1].trim();
            let (mfg, rest) = ident.split_once(':').unwrap_or((ident, ""));
            let (model, serial) = rest.rsplit_once(':').unwrap_or((rest, ""));
            d.manufacturer = mfg.trim().to_string();
            d.model = model.trim().to_string();
            d.serial_number = serial.trim().to_string();
        }
    }
    res.extend(cur);
    res
}

/// Parse the output of `ddcutil getvcp 0x10`.
pub fn parse_getvcp(out: &str) -> Option<VcpValue> {
    let c = RE_VCP.captures(out)?;
    Some(VcpValue {
        current: c[1].parse().ok()?,
        max: c[2].parse().ok()?,
    })
}
