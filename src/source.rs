//! Sensor capabilities sampled by the agent, and synthetic implementations.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::telemetry::{ThermalImage, ThermalSummary, VehicleState};

/// Source of vehicle state snapshots (flight controller link).
pub trait VehicleSource: Send + 'static {
    /// Read the current state. Missing sensors are reported as `None` fields.
    fn read_vehicle_state(&mut self) -> VehicleState;
}

/// Source of thermal camera data.
pub trait ThermalSource: Send + 'static {
    /// Read a summary of the current frame.
    fn read_thermal(&mut self) -> ThermalSummary;

    /// Read a full image, if one is available.
    fn read_thermal_image(&mut self) -> Option<ThermalImage>;
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Synthetic vehicle flying a slow circle, for demos and tests.
#[derive(Debug, Clone)]
pub struct SyntheticVehicle {
    tick: u64,
    home_lat: f64,
    home_lon: f64,
    battery_mv: u32,
}

impl SyntheticVehicle {
    /// Vehicle circling around a home position.
    pub fn new(home_lat: f64, home_lon: f64) -> Self {
        Self {
            tick: 0,
            home_lat,
            home_lon,
            battery_mv: 12_600,
        }
    }
}

impl Default for SyntheticVehicle {
    fn default() -> Self {
        Self::new(47.397_742, 8.545_594)
    }
}

impl VehicleSource for SyntheticVehicle {
    fn read_vehicle_state(&mut self) -> VehicleState {
        let angle = (self.tick % 360) as f64;
        let radians = angle.to_radians();
        self.tick += 1;
        self.battery_mv = self.battery_mv.saturating_sub(1).max(10_500);

        VehicleState {
            timestamp_ms: unix_millis(),
            lat: Some(self.home_lat + 0.0005 * radians.sin()),
            lon: Some(self.home_lon + 0.0005 * radians.cos()),
            alt: Some(50.0),
            heading: ((angle + 90.0) % 360.0) as f32,
            groundspeed: 5.0,
            battery_mv: Some(self.battery_mv),
        }
    }
}

/// Synthetic thermal camera with a fixed summary and a gradient image.
#[derive(Debug, Clone)]
pub struct SyntheticThermal {
    width: u16,
    height: u16,
    frame: u8,
}

impl SyntheticThermal {
    /// Camera producing `width` x `height` 8-bit images.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }
}

impl Default for SyntheticThermal {
    fn default() -> Self {
        Self::new(32, 24)
    }
}

impl ThermalSource for SyntheticThermal {
    fn read_thermal(&mut self) -> ThermalSummary {
        ThermalSummary {
            min: 20.0,
            max: 40.5,
            mean: 28.1,
        }
    }

    fn read_thermal_image(&mut self) -> Option<ThermalImage> {
        let (w, h) = (self.width as usize, self.height as usize);
        let offset = self.frame;
        self.frame = self.frame.wrapping_add(1);

        let pixels = (0..w * h)
            .map(|i| ((i % w + i / w) as u8).wrapping_add(offset))
            .collect();

        Some(ThermalImage {
            timestamp_ms: unix_millis(),
            width: self.width,
            height: self.height,
            pixels,
        })
    }
}
