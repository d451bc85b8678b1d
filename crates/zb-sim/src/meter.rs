//! Simulated electrical meter telemetry
//!
//! Every field except apparent power follows a bounded random walk and is
//! clamped to a fixed physical range after each step. Apparent power is never
//! stored: it is derived from active and reactive power on every read.

use std::ops::RangeInclusive;

use rand::Rng;
use zb_protocol::MeterReading;

/// Walk step and allowed range of one telemetry field
#[derive(Debug, Clone)]
pub struct FieldBounds {
    /// Largest change applied by a single step, in either direction
    pub step: f64,
    /// Range the value is clamped into after every step
    pub range: RangeInclusive<f64>,
}

impl FieldBounds {
    const fn new(step: f64, min: f64, max: f64) -> Self {
        Self {
            step,
            range: min..=max,
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    fn walk<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        self.clamp(value + rng.gen_range(-self.step..=self.step))
    }

    /// Check that a value lies within the range
    pub fn contains(&self, value: f64) -> bool {
        self.range.contains(&value)
    }
}

pub const VOLTAGE: FieldBounds = FieldBounds::new(1.0, 210.0, 240.0);
pub const CURRENT: FieldBounds = FieldBounds::new(0.5, 0.0, 50.0);
pub const ACTIVE_POWER: FieldBounds = FieldBounds::new(50.0, 0.0, 10_000.0);
pub const REACTIVE_POWER: FieldBounds = FieldBounds::new(25.0, 0.0, 5_000.0);
pub const POWER_FACTOR: FieldBounds = FieldBounds::new(0.02, 0.5, 1.0);
pub const FREQUENCY: FieldBounds = FieldBounds::new(0.05, 49.5, 50.5);
pub const NEUTRAL_CURRENT: FieldBounds = FieldBounds::new(0.1, 0.0, 5.0);

/// Telemetry record attached to metering-capable nodes
#[derive(Debug, Clone, PartialEq)]
pub struct MeterTelemetry {
    voltage: f64,
    current: f64,
    active_power: f64,
    reactive_power: f64,
    power_factor: f64,
    frequency: f64,
    neutral_current: f64,
}

impl MeterTelemetry {
    /// Fresh reading with the power-up spread of a real meter
    pub fn initial<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut meter = Self {
            voltage: 220.0 + rng.gen_range(0.0..=10.0),
            current: 5.0 + rng.gen_range(0.0..=20.0),
            active_power: 1000.0 + rng.gen_range(0.0..=5000.0),
            reactive_power: 500.0 + rng.gen_range(0.0..=1000.0),
            power_factor: 0.85 + rng.gen_range(0.0..=0.15),
            frequency: 49.8 + rng.gen_range(0.0..=0.4),
            neutral_current: rng.gen_range(0.0..=2.0),
        };
        meter.clamp();
        meter
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn active_power(&self) -> f64 {
        self.active_power
    }

    pub fn reactive_power(&self) -> f64 {
        self.reactive_power
    }

    /// Derived as `sqrt(active² + reactive²)`
    pub fn apparent_power(&self) -> f64 {
        (self.active_power * self.active_power + self.reactive_power * self.reactive_power).sqrt()
    }

    pub fn power_factor(&self) -> f64 {
        self.power_factor
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn neutral_current(&self) -> f64 {
        self.neutral_current
    }

    /// Apply one bounded random-walk step to every field
    pub fn random_walk<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.voltage = VOLTAGE.walk(self.voltage, rng);
        self.current = CURRENT.walk(self.current, rng);
        self.active_power = ACTIVE_POWER.walk(self.active_power, rng);
        self.reactive_power = REACTIVE_POWER.walk(self.reactive_power, rng);
        self.power_factor = POWER_FACTOR.walk(self.power_factor, rng);
        self.frequency = FREQUENCY.walk(self.frequency, rng);
        self.neutral_current = NEUTRAL_CURRENT.walk(self.neutral_current, rng);
    }

    /// Pull every field back into its declared range
    pub fn clamp(&mut self) {
        self.voltage = VOLTAGE.clamp(self.voltage);
        self.current = CURRENT.clamp(self.current);
        self.active_power = ACTIVE_POWER.clamp(self.active_power);
        self.reactive_power = REACTIVE_POWER.clamp(self.reactive_power);
        self.power_factor = POWER_FACTOR.clamp(self.power_factor);
        self.frequency = FREQUENCY.clamp(self.frequency);
        self.neutral_current = NEUTRAL_CURRENT.clamp(self.neutral_current);
    }

    /// Reading of a meter that lost mains supply
    ///
    /// Current and active power drop to zero and voltage rests at the bottom
    /// of its range, so the reading never leaves the declared bounds.
    pub fn de_energize(&mut self) {
        self.voltage = *VOLTAGE.range.start();
        self.current = *CURRENT.range.start();
        self.active_power = *ACTIVE_POWER.range.start();
    }

    /// True when every field lies within its declared range
    pub fn in_range(&self) -> bool {
        VOLTAGE.contains(self.voltage)
            && CURRENT.contains(self.current)
            && ACTIVE_POWER.contains(self.active_power)
            && REACTIVE_POWER.contains(self.reactive_power)
            && POWER_FACTOR.contains(self.power_factor)
            && FREQUENCY.contains(self.frequency)
            && NEUTRAL_CURRENT.contains(self.neutral_current)
    }

    /// Snapshot in wire order
    pub fn reading(&self) -> MeterReading {
        MeterReading {
            voltage: self.voltage,
            current: self.current,
            active_power: self.active_power,
            reactive_power: self.reactive_power,
            apparent_power: self.apparent_power(),
            power_factor: self.power_factor,
            frequency: self.frequency,
            neutral_current: self.neutral_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_initial_reading_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(MeterTelemetry::initial(&mut rng).in_range());
        }
    }

    #[test]
    fn test_apparent_power_is_derived() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut meter = MeterTelemetry::initial(&mut rng);
        meter.active_power = 3000.0;
        meter.reactive_power = 4000.0;
        assert_eq!(meter.apparent_power(), 5000.0);
        assert_eq!(meter.reading().apparent_power, 5000.0);
    }

    #[test]
    fn test_de_energize_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut meter = MeterTelemetry::initial(&mut rng);
        let reactive = meter.reactive_power();

        meter.de_energize();
        assert_eq!(meter.voltage(), 210.0);
        assert_eq!(meter.current(), 0.0);
        assert_eq!(meter.active_power(), 0.0);
        assert_eq!(meter.reactive_power(), reactive);
        assert!(meter.in_range());
        assert!(meter.reading().voltage >= 210.0);
    }

    proptest! {
        #[test]
        fn walk_stays_in_range(seed: u64, steps in 1usize..500) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut meter = MeterTelemetry::initial(&mut rng);

            for _ in 0..steps {
                meter.random_walk(&mut rng);
                prop_assert!(meter.in_range());
                let (p, q) = (meter.active_power(), meter.reactive_power());
                prop_assert_eq!(meter.reading().apparent_power, (p * p + q * q).sqrt());
            }
        }
    }
}
