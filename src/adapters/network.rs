//! Network adapter: WiFi station plus the report webhook.
//!
//! Implements [`NetworkPort`].  "Cellular registered" maps to the radio
//! being associated with an access point; "cloud up" maps to the station
//! interface holding an address, at which point the webhook endpoint is
//! assumed reachable.
//!
//! ## cfg gating
//!
//! - **`espidf` feature**: real ESP-IDF WiFi driver plus an HTTP POST per
//!   report.
//! - **all other targets**: scripted simulation; connect latency and
//!   acknowledgements are driven by the host demo loop and tests.

use log::info;
#[cfg(feature = "espidf")]
use log::warn;

use crate::app::events::ReportPayload;
use crate::app::ports::NetworkPort;
use crate::error::CommsError;

#[cfg(feature = "espidf")]
const REPORT_URL: &str = "https://hooks.binwatch.example/v1/report";

pub struct NetworkAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,

    #[cfg(feature = "espidf")]
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    #[cfg(feature = "espidf")]
    ack_pending: bool,

    #[cfg(not(feature = "espidf"))]
    sim: SimNet,
}

#[cfg(not(feature = "espidf"))]
struct SimNet {
    started: bool,
    /// `cloud_up` polls remaining before the session counts as up.
    pending_polls: core::cell::Cell<u32>,
    latency_polls: u32,
    signal_pct: u8,
    auto_ack: bool,
    ack_pending: bool,
    published: Vec<ReportPayload>,
}

impl NetworkAdapter {
    #[cfg(feature = "espidf")]
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        ssid: &str,
        password: &str,
    ) -> anyhow::Result<Self> {
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;
        use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};

        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;
        let mut wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|()| anyhow::anyhow!("ssid too long"))?,
            password: password
                .try_into()
                .map_err(|()| anyhow::anyhow!("password too long"))?,
            ..Default::default()
        }))?;
        Ok(Self {
            ssid: ssid.try_into().unwrap_or_default(),
            password: password.try_into().unwrap_or_default(),
            wifi,
            ack_pending: false,
        })
    }

    #[cfg(not(feature = "espidf"))]
    pub fn new(ssid: &str, password: &str) -> anyhow::Result<Self> {
        Ok(Self {
            ssid: ssid.try_into().unwrap_or_default(),
            password: password.try_into().unwrap_or_default(),
            sim: SimNet {
                started: false,
                pending_polls: core::cell::Cell::new(0),
                latency_polls: 3,
                signal_pct: 70,
                auto_ack: true,
                ack_pending: false,
                published: Vec::new(),
            },
        })
    }

    // ── Simulation controls (host only) ───────────────────────

    /// How many `cloud_up` polls a connect attempt takes.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_latency(&mut self, polls: u32) {
        self.sim.latency_polls = polls;
    }

    /// Whether publishes acknowledge themselves.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_auto_ack(&mut self, on: bool) {
        self.sim.auto_ack = on;
    }

    /// Signal quality the radio reports while associated.
    #[cfg(not(feature = "espidf"))]
    pub fn sim_set_signal(&mut self, pct: u8) {
        self.sim.signal_pct = pct;
    }

    #[cfg(not(feature = "espidf"))]
    pub fn sim_published(&self) -> &[ReportPayload] {
        &self.sim.published
    }

    #[cfg(feature = "espidf")]
    fn post_report(&mut self, report: &ReportPayload) -> anyhow::Result<u16> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
        use esp_idf_svc::io::Write;

        let body = serde_json::to_vec(report)?;
        let mut conn = EspHttpConnection::new(&Configuration {
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })?;
        conn.initiate_request(
            Method::Post,
            REPORT_URL,
            &[("Content-Type", "application/json")],
        )?;
        conn.write_all(&body)?;
        conn.initiate_response()?;
        Ok(conn.status())
    }
}

impl NetworkPort for NetworkAdapter {
    #[cfg(feature = "espidf")]
    fn connect(&mut self) {
        info!("wifi: connecting to '{}'", self.ssid);
        if let Err(e) = self.wifi.start() {
            warn!("wifi start failed: {e}");
            return;
        }
        if let Err(e) = self.wifi.connect() {
            warn!("wifi connect failed: {e}");
        }
    }

    #[cfg(not(feature = "espidf"))]
    fn connect(&mut self) {
        info!("wifi(sim): connecting to '{}'", self.ssid);
        let _ = &self.password;
        self.sim.started = true;
        self.sim.pending_polls.set(self.sim.latency_polls);
    }

    #[cfg(feature = "espidf")]
    fn disconnect(&mut self) -> Result<(), CommsError> {
        self.wifi
            .disconnect()
            .map_err(|_| CommsError::DisconnectFailed)?;
        self.wifi.stop().map_err(|_| CommsError::DisconnectFailed)
    }

    #[cfg(not(feature = "espidf"))]
    fn disconnect(&mut self) -> Result<(), CommsError> {
        self.sim.started = false;
        Ok(())
    }

    #[cfg(feature = "espidf")]
    fn cloud_up(&self) -> bool {
        self.wifi
            .sta_netif()
            .is_up()
            .unwrap_or(false)
    }

    #[cfg(not(feature = "espidf"))]
    fn cloud_up(&self) -> bool {
        if !self.sim.started {
            return false;
        }
        let left = self.sim.pending_polls.get();
        if left > 0 {
            self.sim.pending_polls.set(left - 1);
            return false;
        }
        true
    }

    #[cfg(feature = "espidf")]
    fn cellular_registered(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(feature = "espidf"))]
    fn cellular_registered(&self) -> bool {
        self.sim.started
    }

    #[cfg(feature = "espidf")]
    fn signal_quality(&mut self) -> Option<u8> {
        use esp_idf_svc::sys::{esp_wifi_sta_get_ap_info, wifi_ap_record_t, ESP_OK};

        let mut ap: wifi_ap_record_t = Default::default();
        // SAFETY: `ap` is a valid out-pointer for the driver to fill.
        if unsafe { esp_wifi_sta_get_ap_info(&mut ap) } != ESP_OK {
            return None;
        }
        // RSSI lands around -100..-50 dBm; map it onto 0..=100 percent.
        let pct = (i16::from(ap.rssi) + 100) * 2;
        Some(pct.clamp(0, 100) as u8)
    }

    #[cfg(not(feature = "espidf"))]
    fn signal_quality(&mut self) -> Option<u8> {
        self.sim.started.then_some(self.sim.signal_pct)
    }

    #[cfg(feature = "espidf")]
    fn publish(&mut self, report: &ReportPayload) -> Result<(), CommsError> {
        match self.post_report(report) {
            Ok(status) if (200..300).contains(&status) => {
                self.ack_pending = true;
                Ok(())
            }
            Ok(status) => {
                warn!("report rejected with HTTP {status}");
                Err(CommsError::PublishFailed)
            }
            Err(e) => {
                warn!("report POST failed: {e}");
                Err(CommsError::PublishFailed)
            }
        }
    }

    #[cfg(not(feature = "espidf"))]
    fn publish(&mut self, report: &ReportPayload) -> Result<(), CommsError> {
        info!("publish(sim): {} full", report.percent_full);
        self.sim.published.push(report.clone());
        if self.sim.auto_ack {
            self.sim.ack_pending = true;
        }
        Ok(())
    }

    #[cfg(feature = "espidf")]
    fn take_response(&mut self) -> bool {
        core::mem::take(&mut self.ack_pending)
    }

    #[cfg(not(feature = "espidf"))]
    fn take_response(&mut self) -> bool {
        core::mem::take(&mut self.sim.ack_pending)
    }
}

#[cfg(all(test, not(feature = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn sim_connect_comes_up_after_latency() {
        let mut net = NetworkAdapter::new("bins", "secret123").unwrap();
        net.sim_set_latency(2);
        assert!(!net.cloud_up());
        net.connect();
        assert!(net.cellular_registered());
        assert!(!net.cloud_up());
        assert!(!net.cloud_up());
        assert!(net.cloud_up());
        net.disconnect().unwrap();
        assert!(!net.cloud_up());
    }

    #[test]
    fn sim_signal_reported_only_while_associated() {
        let mut net = NetworkAdapter::new("bins", "secret123").unwrap();
        assert_eq!(net.signal_quality(), None);
        net.connect();
        assert_eq!(net.signal_quality(), Some(70));
        net.sim_set_signal(35);
        assert_eq!(net.signal_quality(), Some(35));
        net.disconnect().unwrap();
        assert_eq!(net.signal_quality(), None);
    }
}
