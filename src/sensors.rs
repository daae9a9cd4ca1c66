//! Temperature from an averaged ADC channel.

use crate::net::TemperatureSensor;

pub const TEMP_SAMPLE_COUNT: u16 = 512;

/// One raw conversion from an ADC channel.
pub trait AdcSampler {
    fn sample(&mut self) -> u16;
}

/// Linear sensor transfer: `celsius = ref_c - (volts - ref_volts) / slope`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearCalibration {
    pub full_scale_volts: f32,
    pub full_scale_counts: u16,
    pub ref_celsius: f32,
    pub ref_volts: f32,
    /// Volts per degree; negative for sensors whose output rises with heat.
    pub slope: f32,
}

impl LinearCalibration {
    /// On-die diode of the RP2040 on a 12-bit, 3.3 V converter.
    pub const RP2040_DIE: Self = Self {
        full_scale_volts: 3.3,
        full_scale_counts: 4096,
        ref_celsius: 27.0,
        ref_volts: 0.706,
        slope: 0.001721,
    };

    /// TMP36 analog sensor (750 mV at 25 °C, 10 mV/°C) on the ESP32 12-bit
    /// converter at 11 dB attenuation.
    pub const TMP36_ESP32: Self = Self {
        full_scale_volts: 3.1,
        full_scale_counts: 4096,
        ref_celsius: 25.0,
        ref_volts: 0.75,
        slope: -0.01,
    };

    pub fn volts(&self, counts: f32) -> f32 {
        counts * self.full_scale_volts / self.full_scale_counts as f32
    }

    pub fn celsius(&self, counts: f32) -> f32 {
        self.ref_celsius - (self.volts(counts) - self.ref_volts) / self.slope
    }
}

pub struct AdcThermometer<A> {
    sampler: A,
    calibration: LinearCalibration,
    samples: u16,
}

impl<A: AdcSampler> AdcThermometer<A> {
    pub fn new(sampler: A, calibration: LinearCalibration) -> Self {
        Self {
            sampler,
            calibration,
            samples: TEMP_SAMPLE_COUNT,
        }
    }

    pub fn with_samples(mut self, samples: u16) -> Self {
        self.samples = samples.max(1);
        self
    }

    fn average_counts(&mut self) -> f32 {
        let mut sum = 0u32;
        for _ in 0..self.samples {
            sum += self.sampler.sample() as u32;
        }
        sum as f32 / self.samples as f32
    }
}

impl<A: AdcSampler> TemperatureSensor for AdcThermometer<A> {
    fn read_celsius(&mut self) -> f32 {
        let counts = self.average_counts();
        let celsius = self.calibration.celsius(counts);
        log::debug!("sensor: adc_avg={} temp={}", counts, celsius);
        celsius
    }
}
