//! ESP32 bring-up: peripherals, radio, network stack and the tasks that run
//! the measurement loop on top of them.

mod clock;
mod device;
mod icmp;
mod sensors;
mod tcp;
mod wifi;

use embassy_net::{Runner, Stack, StackResources};
use esp_hal::{rng::Rng, timer::timg::TimerGroup};
use esp_println::println;
use esp_radio::wifi::{InternalWifiError, WifiController, WifiDevice, WifiError};
use static_cell::StaticCell;

use crate::config::{wifi_credentials, MeterConfig};
use crate::net::DeviceControl;
use crate::orchestrator::{Meter, MeterIo};

pub use self::clock::EmbassyClock;
pub use self::device::EspDevice;
pub use self::icmp::{EspIcmpStack, IcmpBuffers};
pub use self::sensors::{thermometer, Thermometer};
pub use self::tcp::{EspTcpStack, TcpBuffers};
pub use self::wifi::EspLink;

const HEAP_BYTES: usize = 72 * 1024;
const SOCKET_SLOTS: usize = 4;

struct NetRuntime {
    controller: WifiController<'static>,
    runner: Runner<'static, WifiDevice<'static>>,
    stack: Stack<'static>,
}

fn setup_network(wifi: esp_hal::peripherals::WIFI<'static>) -> Result<NetRuntime, &'static str> {
    static RADIO_CTRL: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static STACK_RESOURCES: StaticCell<StackResources<SOCKET_SLOTS>> = StaticCell::new();

    let radio_ctrl = esp_radio::init().map_err(|err| {
        println!("net: esp_radio::init err={:?}", err);
        "net: esp_radio::init failed"
    })?;
    let radio_ctrl = RADIO_CTRL.init(radio_ctrl);
    let (controller, ifaces) = esp_radio::wifi::new(radio_ctrl, wifi, wifi::wifi_runtime_config())
        .map_err(|err| match err {
            WifiError::InvalidArguments => "net: wifi init failed invalid_args",
            WifiError::Unsupported => "net: wifi init failed unsupported",
            WifiError::NotInitialized => "net: wifi init failed not_initialized",
            WifiError::InternalError(InternalWifiError::NoMem) => "net: wifi init failed no_mem",
            _ => "net: wifi init failed other",
        })?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::<SOCKET_SLOTS>::new()),
        seed,
    );

    Ok(NetRuntime {
        controller,
        runner,
        stack,
    })
}

pub fn run() -> ! {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());
    esp_alloc::heap_allocator!(size: HEAP_BYTES);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let config = MeterConfig::from_env();
    println!(
        "meter: boot gateway={} influx={}:{} host={}",
        config.gateway_ip, config.influx_ip, config.influx_port, config.host_tag
    );

    let net = match setup_network(peripherals.WIFI) {
        Ok(net) => net,
        Err(reason) => {
            println!("{}", reason);
            EspDevice.reset();
            halt_forever();
        }
    };
    let sensor = thermometer(peripherals.ADC1, peripherals.GPIO34);

    static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(move |spawner| {
        spawner.must_spawn(net_task(net.runner));
        spawner.must_spawn(wifi_connection_task(net.controller, wifi_credentials()));
        spawner.must_spawn(meter_task(net.stack, sensor, config));
    });
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
async fn wifi_connection_task(
    controller: WifiController<'static>,
    credentials: Option<(&'static str, &'static str)>,
) {
    wifi::run_wifi_connection_task(controller, credentials).await;
}

#[embassy_executor::task]
async fn meter_task(stack: Stack<'static>, sensor: Thermometer, config: MeterConfig) {
    static ICMP_BUFFERS: StaticCell<IcmpBuffers> = StaticCell::new();
    static TCP_BUFFERS: StaticCell<TcpBuffers> = StaticCell::new();

    stack.wait_config_up().await;
    if let Some(v4) = stack.config_v4() {
        println!("net: dhcp address={}", v4.address);
    }

    let io = MeterIo {
        icmp: EspIcmpStack::new(stack, ICMP_BUFFERS.init(IcmpBuffers::new())),
        stream: EspTcpStack::new(stack, TCP_BUFFERS.init(TcpBuffers::new())),
        sensor,
        link: EspLink::new(stack),
        device: EspDevice,
        clock: EmbassyClock,
    };
    let mut meter = Meter::new(config, io);
    meter.run().await;

    // `run` only returns once the device reset has been requested.
    EspDevice.reset();
}

fn halt_forever() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
