use esp_hal::{
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    peripherals::{ADC1, GPIO34},
    Blocking,
};

use crate::sensors::{AdcSampler, AdcThermometer, LinearCalibration};

/// TMP36 output wired to GPIO34 (ADC1 channel 6).
pub struct Tmp36Channel {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO34<'static>, ADC1<'static>>,
}

impl AdcSampler for Tmp36Channel {
    fn sample(&mut self) -> u16 {
        self.adc.read_blocking(&mut self.pin)
    }
}

pub type Thermometer = AdcThermometer<Tmp36Channel>;

pub fn thermometer(adc1: ADC1<'static>, pin: GPIO34<'static>) -> Thermometer {
    let mut config = AdcConfig::new();
    let pin = config.enable_pin(pin, Attenuation::_11dB);
    let adc = Adc::new(adc1, config);
    AdcThermometer::new(Tmp36Channel { adc, pin }, LinearCalibration::TMP36_ESP32)
}
