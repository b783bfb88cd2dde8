// GyroWatch — Network Data Export
//
// Best-effort streaming of the raw angle signal and the latest spectrum
// over HTTP. `feed` and `deliver_fft` are called from the main loop every
// frame and must never wait on the network: they only touch in-memory
// buffers under short locks. A capped raw buffer (~5 s of samples) absorbs
// the gap between frames and HTTP polls; once full, new samples are dropped
// until the next drain.
//
// GET /     → raw samples since the last poll, little-endian f32, drained
// GET /fft  → latest exported spectrum, interleaved re/im pairs

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use esp_idf_svc::mdns::EspMdns;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration as WifiConfig, EspWifi};

use crate::config::*;

const WIFI_SSID: Option<&str> = option_env!("GYROWATCH_WIFI_SSID");
const WIFI_PASS: Option<&str> = option_env!("GYROWATCH_WIFI_PASS");

pub struct DataStreamer {
    raw: Arc<Mutex<Vec<f32>>>,
    spectrum: Arc<Mutex<Vec<f32>>>,
    dropped: AtomicU32,
}

impl DataStreamer {
    /// Create the export buffers and bring up Wi-Fi, mDNS and the HTTP
    /// server on a background task. Feeding works immediately; until the
    /// server is reachable the buffers simply fill up to their cap.
    pub fn start(modem: Modem) -> Arc<Self> {
        let streamer = Arc::new(Self {
            raw: Arc::new(Mutex::new(Vec::with_capacity(STREAM_BUFFER_CAPACITY))),
            spectrum: Arc::new(Mutex::new(Vec::new())),
            dropped: AtomicU32::new(0),
        });

        let raw = Arc::clone(&streamer.raw);
        let spectrum = Arc::clone(&streamer.spectrum);
        let spawned = thread::Builder::new()
            .name("streamer".into())
            .stack_size(STACK_STREAMER)
            .spawn(move || {
                if let Err(e) = serve(modem, raw, spectrum) {
                    log::error!("Streamer failed: {e:#}");
                }
            });
        if let Err(e) = spawned {
            log::error!("Could not spawn streamer task: {e}");
        }

        streamer
    }

    /// Append one raw sample. Dropped silently once the buffer is full;
    /// drop totals surface as an occasional log line only.
    pub fn feed(&self, value: f32) {
        let mut raw = self.raw.lock().unwrap();
        if raw.len() < STREAM_BUFFER_CAPACITY {
            raw.push(value);
        } else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 10_000 == 0 {
                log::debug!("export buffer full — {dropped} samples dropped so far");
            }
        }
    }

    /// Replace the exported spectrum snapshot with the latest values.
    pub fn deliver_fft(&self, values: &[f32]) {
        let mut spectrum = self.spectrum.lock().unwrap();
        spectrum.clear();
        spectrum.extend_from_slice(values);
    }
}

fn serve(
    modem: Modem,
    raw: Arc<Mutex<Vec<f32>>>,
    spectrum: Arc<Mutex<Vec<f32>>>,
) -> anyhow::Result<()> {
    let (Some(ssid), Some(pass)) = (WIFI_SSID, WIFI_PASS) else {
        log::info!("No Wi-Fi credentials configured — network export disabled");
        return Ok(());
    };

    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    wifi.set_configuration(&WifiConfig::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("SSID too long"))?,
        password: pass
            .try_into()
            .map_err(|_| anyhow::anyhow!("password too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;
    log::info!("Wi-Fi up — starting mDNS and HTTP export");

    let mut mdns = EspMdns::take()?;
    mdns.set_hostname(MDNS_HOSTNAME)?;
    mdns.add_service(None, "_http", "_tcp", 80, &[])?;

    let mut server = EspHttpServer::new(&HttpConfig::default())?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |request| {
        // Drain-on-read: each poll gets everything since the previous one.
        let bytes: Vec<u8> = {
            let mut raw = raw.lock().unwrap();
            let bytes = raw.iter().flat_map(|v| v.to_le_bytes()).collect();
            raw.clear();
            bytes
        };
        log::info!("http raw export: {} bytes", bytes.len());
        let mut response = request.into_ok_response()?;
        response.write_all(&bytes)?;
        Ok(())
    })?;

    server.fn_handler::<anyhow::Error, _>("/fft", Method::Get, move |request| {
        let bytes: Vec<u8> = {
            let spectrum = spectrum.lock().unwrap();
            spectrum.iter().flat_map(|v| v.to_le_bytes()).collect()
        };
        let mut response = request.into_ok_response()?;
        response.write_all(&bytes)?;
        Ok(())
    })?;

    log::info!("Streamer listening on http://{MDNS_HOSTNAME}.local/");

    // Wifi, mDNS and the server live as long as this task.
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
