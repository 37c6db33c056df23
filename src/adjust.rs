/// One adjustment pass: read the monitor, read the sensor, and write a new brightness if needed.
use crate::brightness_table::BrightnessTable;
use crate::config::{ErrorPolicy, MonitorId};
use crate::monitor::{MonitorControl, VcpValue, select_display};
use crate::sensor::{SensorReading, SensorSource};

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The monitor was already at the target
    Unchanged { brightness: u16 },
    Updated { from: u16, to: u16 },
    /// Dry run: a write would have happened
    WouldUpdate { from: u16, to: u16 },
    /// The write failed and the error policy said to carry on
    WriteFailed { from: u16, to: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct Adjuster {
    pub monitor: MonitorId,
    pub table: BrightnessTable,
    pub on_error: ErrorPolicy,
    pub dry_run: bool,
}

impl Adjuster {
    /// Apply the error policy to a failed step: either log it and use `default`, or fail.
    fn recover<T, E>(&self, res: Result<T, E>, default: T, what: &'static str) -> anyhow::Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match res {
            Ok(v) => Ok(v),
            Err(e) => match self.on_error {
                ErrorPolicy::Continue => {
                    tracing::error!("{what}: {e}");
                    Ok(default)
                }
                ErrorPolicy::Abort => Err(anyhow::Error::new(e).context(what)),
            },
        }
    }

    pub fn run<S: SensorSource, M: MonitorControl>(
        &self,
        sensor: &S,
        monitors: &M,
    ) -> anyhow::Result<Outcome> {
        // There is nothing to fall back to without a display
        let displays = monitors
            .enumerate()
            .with_context(|| "Error getting monitors")?;
        let selected = select_display(&displays, &self.monitor)?;
        tracing::debug!("using {selected}");

        let current = self.recover(
            monitors.get_brightness(selected),
            VcpValue::default(),
            "Error getting monitor brightness",
        )?;
        tracing::info!("current brightness: {}", current.current);

        let reading = self.recover(
            sensor.fetch(),
            SensorReading::default(),
            "Error getting sensor state",
        )?;
        tracing::info!("sensor value: {}", reading.state);
        tracing::debug!("sensor last updated {}", reading.last_updated);

        let lux = self.recover(reading.lux(), 0, "Error parsing sensor value")?;
        let target = self.table.percentage_for(lux);
        tracing::debug!("lux={lux}, target={target}");

        if target == current.current {
            tracing::warn!("brightness is already at {target}%, skipping...");
            return Ok(Outcome::Unchanged { brightness: target });
        }

        if current.max > 0 && target > current.max {
            tracing::warn!(
                "target {target}% is above the monitor's maximum of {}",
                current.max
            );
        }

        let (from, to) = (current.current, target);
        if self.dry_run {
            tracing::info!("dry run: would set monitor brightness to {to}%");
            return Ok(Outcome::WouldUpdate { from, to });
        }

        tracing::info!("setting monitor brightness to {to}%");
        match monitors.set_brightness(selected, to) {
            Ok(()) => Ok(Outcome::Updated { from, to }),
            Err(e) => {
                self.recover(Err(e), (), "Error setting monitor brightness")?;
                Ok(Outcome::WriteFailed { from, to })
            }
        }
    }
}
