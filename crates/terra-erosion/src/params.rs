//! Erosion parameters shared by every simulator.

use crate::error::ConfigurationError;

/// Tunable inputs of the hydraulic, thermal, water and blur passes.
///
/// Simulators only ever read these; the orchestrator owns the single mutable
/// copy and changes it through [`ErosionParameter`] setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErosionParameters {
    /// Fraction of the previous direction kept on each droplet step.
    pub inertia: f32,
    pub gravity: f32,
    pub sediment_capacity_factor: f32,
    /// Capacity floor so droplets on flat ground still carry something.
    pub min_sediment_capacity: f32,
    pub deposit_speed: f32,
    pub erode_speed: f32,
    pub evaporate_speed: f32,
    pub start_speed: f32,
    pub start_water: f32,
    /// Brush radius in texels.
    pub brush_radius: u32,
    /// Flip the speed update to `speed^2 - dh * g` so droplets gain speed
    /// going downhill. Off by default.
    pub downhill_acceleration: bool,
    /// Maximum number of steps per droplet.
    pub max_lifetime: u32,
    /// Droplet dispatches per hydraulic run.
    pub erosion_iterations: u32,

    pub thermal_amplitude: f32,
    /// Talus slope (tangent of the angle of repose).
    pub thermal_tan_threshold: f32,
    /// Distance from the edge below which thermal flow is suppressed.
    pub thermal_border_min: f32,
    /// Width of the linear fade-in band after `thermal_border_min`.
    pub thermal_border_range: f32,
    pub thermal_iterations: u32,

    pub water_iterations: u32,
    pub blur_iterations: u32,
}

impl Default for ErosionParameters {
    fn default() -> Self {
        Self {
            inertia: 0.05,
            gravity: 4.0,
            sediment_capacity_factor: 4.0,
            min_sediment_capacity: 0.01,
            deposit_speed: 0.3,
            erode_speed: 0.3,
            evaporate_speed: 0.01,
            start_speed: 1.0,
            start_water: 1.0,
            brush_radius: 3,
            downhill_acceleration: false,
            max_lifetime: 30,
            erosion_iterations: 16,
            thermal_amplitude: 0.5,
            thermal_tan_threshold: 0.6,
            thermal_border_min: 2.0,
            thermal_border_range: 8.0,
            thermal_iterations: 32,
            water_iterations: 16,
            blur_iterations: 1,
        }
    }
}

/// A single parameter assignment, as issued by an edit control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErosionParameter {
    Inertia(f32),
    Gravity(f32),
    SedimentCapacityFactor(f32),
    MinSedimentCapacity(f32),
    DepositSpeed(f32),
    ErodeSpeed(f32),
    EvaporateSpeed(f32),
    StartSpeed(f32),
    StartWater(f32),
    BrushRadius(u32),
    DownhillAcceleration(bool),
    MaxLifetime(u32),
    ErosionIterations(u32),
    ThermalAmplitude(f32),
    ThermalTanThreshold(f32),
    ThermalBorderMin(f32),
    ThermalBorderRange(f32),
    ThermalIterations(u32),
    WaterIterations(u32),
    BlurIterations(u32),
}

impl ErosionParameters {
    /// Apply one assignment.
    pub fn set(&mut self, parameter: ErosionParameter) {
        use ErosionParameter::*;
        match parameter {
            Inertia(v) => self.inertia = v,
            Gravity(v) => self.gravity = v,
            SedimentCapacityFactor(v) => self.sediment_capacity_factor = v,
            MinSedimentCapacity(v) => self.min_sediment_capacity = v,
            DepositSpeed(v) => self.deposit_speed = v,
            ErodeSpeed(v) => self.erode_speed = v,
            EvaporateSpeed(v) => self.evaporate_speed = v,
            StartSpeed(v) => self.start_speed = v,
            StartWater(v) => self.start_water = v,
            BrushRadius(v) => self.brush_radius = v,
            DownhillAcceleration(v) => self.downhill_acceleration = v,
            MaxLifetime(v) => self.max_lifetime = v,
            ErosionIterations(v) => self.erosion_iterations = v,
            ThermalAmplitude(v) => self.thermal_amplitude = v,
            ThermalTanThreshold(v) => self.thermal_tan_threshold = v,
            ThermalBorderMin(v) => self.thermal_border_min = v,
            ThermalBorderRange(v) => self.thermal_border_range = v,
            ThermalIterations(v) => self.thermal_iterations = v,
            WaterIterations(v) => self.water_iterations = v,
            BlurIterations(v) => self.blur_iterations = v,
        }
    }

    /// Return a copy with `parameter` applied, rejecting out-of-range values.
    pub fn with(mut self, parameter: ErosionParameter) -> Result<Self, ConfigurationError> {
        self.set(parameter);
        self.validate()?;
        Ok(self)
    }

    /// Check every float parameter against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let unit = [
            ("inertia", self.inertia),
            ("deposit_speed", self.deposit_speed),
            ("erode_speed", self.erode_speed),
            ("evaporate_speed", self.evaporate_speed),
            ("thermal_amplitude", self.thermal_amplitude),
        ];
        for (name, value) in unit {
            check(name, value, "[0, 1]", (0.0..=1.0).contains(&value))?;
        }

        let non_negative = [
            ("gravity", self.gravity),
            ("sediment_capacity_factor", self.sediment_capacity_factor),
            ("min_sediment_capacity", self.min_sediment_capacity),
            ("start_speed", self.start_speed),
            ("thermal_tan_threshold", self.thermal_tan_threshold),
            ("thermal_border_min", self.thermal_border_min),
            ("thermal_border_range", self.thermal_border_range),
        ];
        for (name, value) in non_negative {
            check(name, value, "[0, inf)", value >= 0.0)?;
        }

        check(
            "start_water",
            self.start_water,
            "(0, inf)",
            self.start_water > 0.0,
        )?;
        check(
            "max_lifetime",
            self.max_lifetime as f32,
            "[1, inf)",
            self.max_lifetime >= 1,
        )
    }
}

fn check(
    name: &'static str,
    value: f32,
    range: &'static str,
    ok: bool,
) -> Result<(), ConfigurationError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter { name, value, range })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ErosionParameters::default().validate().is_ok());
    }

    #[test]
    fn test_set_updates_single_field() {
        let mut params = ErosionParameters::default();
        params.set(ErosionParameter::ErodeSpeed(0.7));
        params.set(ErosionParameter::ThermalIterations(5));
        assert_eq!(params.erode_speed, 0.7);
        assert_eq!(params.thermal_iterations, 5);
        assert_eq!(params.deposit_speed, ErosionParameters::default().deposit_speed);
    }

    #[test]
    fn test_speed_update_defaults_to_height_gain() {
        let mut params = ErosionParameters::default();
        assert!(!params.downhill_acceleration);
        params.set(ErosionParameter::DownhillAcceleration(true));
        assert!(params.downhill_acceleration);
    }

    #[test]
    fn test_with_rejects_out_of_range() {
        let params = ErosionParameters::default();
        let err = params.with(ErosionParameter::Inertia(1.5)).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidParameter { name: "inertia", .. }
        ));
    }

    #[test]
    fn test_nan_is_rejected() {
        let params = ErosionParameters {
            gravity: f32::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let params = ErosionParameters::default();
        assert!(params.with(ErosionParameter::MaxLifetime(0)).is_err());
        assert!(params.with(ErosionParameter::MaxLifetime(1)).is_ok());
    }
}
