use log::info;

use crate::{
    drivers::SensorDriver,
    error::SensorFault,
    types::SensorReading,
};

const HUMIDITY_WEIGHT: f64 = 0.04;

/// Gas quality index from raw gas resistance and relative humidity.
///
/// Evaluated literally as `ln(g) + 0.04 * ln(g) / h * h`, which equals
/// `1.04 * ln(g)` for any non-zero `h` up to rounding. Do not simplify:
/// deployed nodes report the unsimplified value.
pub fn gas_index(gas_resistance_ohm: f64, humidity_pct: f64) -> Result<f64, SensorFault> {
    if !gas_resistance_ohm.is_finite() || gas_resistance_ohm <= 0.0 {
        return Err(SensorFault::InvalidGasResistance(gas_resistance_ohm));
    }
    if !humidity_pct.is_finite() {
        return Err(SensorFault::NonFinite("humidity"));
    }
    if humidity_pct == 0.0 {
        return Err(SensorFault::DegenerateHumidity);
    }

    let ln_gas = gas_resistance_ohm.ln();
    Ok(ln_gas + HUMIDITY_WEIGHT * ln_gas / humidity_pct * humidity_pct)
}

/// Barometric altitude in metres for a pressure reading.
pub fn altitude_m(pressure_hpa: f64, sea_level_hpa: f64) -> f64 {
    44_330.0 * (1.0 - (pressure_hpa / sea_level_hpa).powf(1.0 / 5.255))
}

pub struct SensorReader<S> {
    driver: S,
}

impl<S: SensorDriver> SensorReader<S> {
    pub fn new(driver: S) -> Self {
        Self { driver }
    }

    pub fn read(&mut self) -> Result<SensorReading, SensorFault> {
        let raw = self.driver.read().map_err(SensorFault::Driver)?;

        if !raw.temperature_c.is_finite() {
            return Err(SensorFault::NonFinite("temperature"));
        }
        if !raw.pressure_hpa.is_finite() {
            return Err(SensorFault::NonFinite("pressure"));
        }

        let reading = SensorReading {
            temperature_c: raw.temperature_c,
            humidity_pct: raw.humidity_pct,
            pressure_hpa: raw.pressure_hpa,
            gas_index: gas_index(raw.gas_resistance_ohm, raw.humidity_pct)?,
        };

        info!(
            "[BME680] {:.1}°C {:.0}% {:.2}hPa gas index {:.1}",
            reading.temperature_c, reading.humidity_pct, reading.pressure_hpa, reading.gas_index
        );
        Ok(reading)
    }

    pub fn driver(&self) -> &S {
        &self.driver
    }
}
