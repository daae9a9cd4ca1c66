//! Station-mode Wi-Fi: the connection task owns the controller; the measurement
//! task drives it through [`EspLink`] and a pair of command/result channels.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{with_timeout, Duration, Instant, Timer};
use esp_println::println;
use esp_radio::wifi::{
    AuthMethod, ClientConfig, Config as WifiRuntimeConfig, ModeConfig, ScanMethod,
    WifiController, WifiEvent,
};

use crate::net::LinkControl;

const WIFI_RX_QUEUE_SIZE: usize = 3;
const WIFI_TX_QUEUE_SIZE: usize = 2;
const WIFI_STATIC_RX_BUF_NUM: u8 = 4;
const WIFI_DYNAMIC_RX_BUF_NUM: u16 = 8;
const WIFI_DYNAMIC_TX_BUF_NUM: u16 = 8;
const WIFI_CONNECT_TIMEOUT_MS: u64 = 15_000;
const WIFI_DHCP_TIMEOUT_MS: u64 = 10_000;
const WIFI_BOOT_RETRY_MS: u64 = 3_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkCommand {
    Down,
    Up,
}

static LINK_COMMANDS: Channel<CriticalSectionRawMutex, LinkCommand, 1> = Channel::new();
static LINK_RESULTS: Channel<CriticalSectionRawMutex, bool, 1> = Channel::new();
static ADMIN_UP: AtomicBool = AtomicBool::new(false);
static ASSOCIATED: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NetState {
    Idle,
    Starting,
    Associating,
    Ready,
    Down,
    Failed,
}

impl NetState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Associating => "Associating",
            Self::Ready => "Ready",
            Self::Down => "Down",
            Self::Failed => "Failed",
        }
    }
}

struct NetTrace {
    state: NetState,
    started_at: Instant,
}

impl NetTrace {
    fn new() -> Self {
        Self {
            state: NetState::Idle,
            started_at: Instant::now(),
        }
    }

    fn enter(&mut self, to: NetState, trigger: &str) {
        if self.state == to {
            return;
        }
        let at_ms = self.started_at.elapsed().as_millis() as u32;
        println!(
            "NET_EVENT {{\"from\":\"{}\",\"to\":\"{}\",\"trigger\":\"{}\",\"at_ms\":{}}}",
            self.state.as_str(),
            to.as_str(),
            trigger,
            at_ms
        );
        self.state = to;
    }
}

pub(super) fn wifi_runtime_config() -> WifiRuntimeConfig {
    WifiRuntimeConfig::default()
        .with_rx_queue_size(WIFI_RX_QUEUE_SIZE)
        .with_tx_queue_size(WIFI_TX_QUEUE_SIZE)
        .with_static_rx_buf_num(WIFI_STATIC_RX_BUF_NUM)
        .with_dynamic_rx_buf_num(WIFI_DYNAMIC_RX_BUF_NUM)
        .with_dynamic_tx_buf_num(WIFI_DYNAMIC_TX_BUF_NUM)
}

fn mode_config(ssid: &str, password: &str) -> ModeConfig {
    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::Wpa2Personal
    };
    ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into())
            .with_auth_method(auth_method)
            .with_scan_method(ScanMethod::AllChannels),
    )
}

/// Brings the station up once at boot (retrying until associated), then
/// reports disconnects and serves link commands. Reconnection after boot is
/// left to the measurement loop's link supervision.
pub(super) async fn run_wifi_connection_task(
    mut controller: WifiController<'static>,
    credentials: Option<(&'static str, &'static str)>,
) {
    let mut trace = NetTrace::new();

    let Some((ssid, password)) = credentials else {
        println!("wifi: no credentials compiled in (set METER_WIFI_SSID)");
        trace.enter(NetState::Failed, "no_credentials");
        loop {
            let _ = LINK_COMMANDS.receive().await;
            LINK_RESULTS.send(false).await;
        }
    };

    if let Err(err) = controller.set_config(&mode_config(ssid, password)) {
        println!("wifi: station config err={:?}", err);
        trace.enter(NetState::Failed, "config_rejected");
        loop {
            let _ = LINK_COMMANDS.receive().await;
            LINK_RESULTS.send(false).await;
        }
    }
    println!("wifi: station config applied ssid={}", ssid);

    while !bring_up(&mut controller, &mut trace).await {
        Timer::after(Duration::from_millis(WIFI_BOOT_RETRY_MS)).await;
    }

    loop {
        let command = if ASSOCIATED.load(Ordering::Relaxed) {
            match select(
                controller.wait_for_event(WifiEvent::StaDisconnected),
                LINK_COMMANDS.receive(),
            )
            .await
            {
                Either::First(_) => {
                    ASSOCIATED.store(false, Ordering::Relaxed);
                    println!("wifi: disconnected");
                    trace.enter(NetState::Down, "sta_disconnected");
                    continue;
                }
                Either::Second(command) => command,
            }
        } else {
            LINK_COMMANDS.receive().await
        };

        let ok = match command {
            LinkCommand::Down => {
                bring_down(&mut controller, &mut trace).await;
                true
            }
            LinkCommand::Up => bring_up(&mut controller, &mut trace).await,
        };
        LINK_RESULTS.send(ok).await;
    }
}

async fn bring_up(controller: &mut WifiController<'static>, trace: &mut NetTrace) -> bool {
    match controller.is_started() {
        Ok(true) => {}
        Ok(false) => {
            trace.enter(NetState::Starting, "bring_up");
            if let Err(err) = controller.start_async().await {
                println!("wifi: start err={:?}", err);
                trace.enter(NetState::Down, "start_failed");
                return false;
            }
        }
        Err(err) => {
            println!("wifi: status err={:?}", err);
            return false;
        }
    }
    ADMIN_UP.store(true, Ordering::Relaxed);

    trace.enter(NetState::Associating, "started");
    match with_timeout(
        Duration::from_millis(WIFI_CONNECT_TIMEOUT_MS),
        controller.connect_async(),
    )
    .await
    {
        Ok(Ok(())) => {
            ASSOCIATED.store(true, Ordering::Relaxed);
            println!("wifi: connected");
            trace.enter(NetState::Ready, "connected");
            true
        }
        Ok(Err(err)) => {
            println!("wifi: connect err={:?}", err);
            let _ = controller.disconnect_async().await;
            trace.enter(NetState::Down, "connect_failed");
            false
        }
        Err(_) => {
            println!("wifi: connect timeout");
            let _ = controller.disconnect_async().await;
            trace.enter(NetState::Down, "connect_timeout");
            false
        }
    }
}

async fn bring_down(controller: &mut WifiController<'static>, trace: &mut NetTrace) {
    let _ = controller.disconnect_async().await;
    let _ = controller.stop_async().await;
    ASSOCIATED.store(false, Ordering::Relaxed);
    ADMIN_UP.store(false, Ordering::Relaxed);
    trace.enter(NetState::Idle, "bring_down");
}

/// Link flags and re-bring-up as seen from the measurement task.
pub struct EspLink {
    stack: Stack<'static>,
}

impl EspLink {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl LinkControl for EspLink {
    fn is_admin_up(&self) -> bool {
        ADMIN_UP.load(Ordering::Relaxed)
    }

    fn is_link_up(&self) -> bool {
        ASSOCIATED.load(Ordering::Relaxed) && self.stack.is_config_up()
    }

    async fn bring_down(&mut self) {
        LINK_COMMANDS.send(LinkCommand::Down).await;
        let _ = LINK_RESULTS.receive().await;
    }

    async fn bring_up(&mut self) -> bool {
        LINK_COMMANDS.send(LinkCommand::Up).await;
        if !LINK_RESULTS.receive().await {
            return false;
        }
        with_timeout(
            Duration::from_millis(WIFI_DHCP_TIMEOUT_MS),
            self.stack.wait_config_up(),
        )
        .await
        .is_ok()
    }
}
