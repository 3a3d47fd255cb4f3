//! Vehicle energy profile consumed by the planner.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub battery_kwh: f64,
    pub consumption_kwh_per_km: f64,
    /// State of charge at departure, in percent.
    pub initial_soc_percent: f64,
    pub avg_speed_kmph: f64,
}

impl VehicleProfile {
    pub fn new(
        battery_kwh: f64,
        consumption_kwh_per_km: f64,
        initial_soc_percent: f64,
        avg_speed_kmph: f64,
    ) -> Self {
        Self {
            battery_kwh,
            consumption_kwh_per_km,
            initial_soc_percent,
            avg_speed_kmph,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("battery_kwh", self.battery_kwh),
            ("consumption_kwh_per_km", self.consumption_kwh_per_km),
            ("avg_speed_kmph", self.avg_speed_kmph),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidVehicle {
                    message: format!("{field} must be positive, got {value}"),
                });
            }
        }
        if !(0.0..=100.0).contains(&self.initial_soc_percent) {
            return Err(Error::InvalidVehicle {
                message: format!(
                    "initial_soc_percent must be within 0-100, got {}",
                    self.initial_soc_percent
                ),
            });
        }
        Ok(())
    }

    /// Distance a full battery covers.
    pub fn max_range_km(&self) -> f64 {
        self.battery_kwh / self.consumption_kwh_per_km
    }

    /// Share of the battery consumed by driving `distance_km`, in percent.
    pub fn energy_percent(&self, distance_km: f64) -> f64 {
        distance_km * self.consumption_kwh_per_km / self.battery_kwh * 100.0
    }

    pub fn drive_minutes(&self, distance_km: f64) -> f64 {
        distance_km / self.avg_speed_kmph * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_energy() {
        let vehicle = VehicleProfile::new(60.0, 0.18, 70.0, 80.0);
        assert!((vehicle.max_range_km() - 333.333).abs() < 0.001);
        assert!((vehicle.energy_percent(120.0) - 36.0).abs() < 1e-9);
        assert!((vehicle.drive_minutes(120.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_profiles() {
        assert!(VehicleProfile::new(60.0, 0.18, 70.0, 80.0).validate().is_ok());
        assert!(VehicleProfile::new(0.0, 0.18, 70.0, 80.0).validate().is_err());
        assert!(VehicleProfile::new(60.0, -1.0, 70.0, 80.0).validate().is_err());
        assert!(VehicleProfile::new(60.0, 0.18, 120.0, 80.0).validate().is_err());
        assert!(VehicleProfile::new(60.0, 0.18, 70.0, f64::NAN).validate().is_err());
    }
}
