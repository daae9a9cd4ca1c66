use esp_println::println;

use crate::net::DeviceControl;

#[derive(Clone, Copy, Debug, Default)]
pub struct EspDevice;

impl DeviceControl for EspDevice {
    fn reset(&mut self) {
        println!("meter: software reset");
        esp_hal::system::software_reset();
    }
}
