use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tempfile::{tempdir, TempDir};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};

// Import the application modules
use multiplus_emulator::{
    bus::Bus,
    config::EnergyConfig,
    schema::{ENERGY_OUT_TO_INVERTER, UPDATE_INDEX},
    subscribe_upstream, BusValue, EmulatorConfig, EmulatorError, EnergyAccumulator, LedgerStore,
    LocalBus, Publisher,
};

const GRID: &str = "com.victronenergy.grid.mqtt_grid_31";
const BATTERY: &str = "com.victronenergy.battery.mqtt_battery_41";

struct Running {
    bus: LocalBus,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), EmulatorError>>,
    dir: TempDir,
}

impl Running {
    async fn stop(self) -> TempDir {
        self.shutdown.send(()).unwrap();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("publisher did not stop")
            .unwrap()
            .unwrap();
        self.dir
    }
}

fn config_in(dir: &TempDir) -> EmulatorConfig {
    EmulatorConfig {
        energy: EnergyConfig {
            working_file: dir.path().join("volatile/ledger.json"),
            storage_file: dir.path().join("data/ledger.json"),
            ..EnergyConfig::default()
        },
        ..EmulatorConfig::default()
    }
}

/// Wires the emulator the way the binary does and starts the publish loop.
fn start(config: EmulatorConfig, dir: TempDir) -> Running {
    let bus = LocalBus::new();
    let events = subscribe_upstream(&bus);
    let accumulator = EnergyAccumulator::open(&config.energy, Utc::now());
    let publisher = Publisher::new(bus.clone(), Arc::new(config), accumulator).unwrap();

    let (shutdown, signal) = oneshot::channel();
    let handle = tokio::spawn(publisher.run(events, async {
        let _ = signal.await;
    }));
    Running {
        bus,
        shutdown,
        handle,
        dir,
    }
}

fn update_index(bus: &LocalBus) -> i64 {
    match bus.read(UPDATE_INDEX) {
        Some(BusValue::Int(index)) => index,
        other => panic!("unexpected update index {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_grid_only_end_to_end() {
    let dir = tempdir().unwrap();
    let running = start(config_in(&dir), dir);

    running.bus.announce_value(GRID, "/Ac/L1/Power", 1500.0);
    running.bus.announce_value(GRID, "/Ac/L1/Voltage", 230.0);
    sleep(Duration::from_millis(1500)).await;

    let bus = &running.bus;
    assert_eq!(bus.read("/Ac/Out/L1/P"), Some(BusValue::Float(1500.0)));
    assert_eq!(bus.read("/Ac/Out/L1/I"), Some(BusValue::Float(6.52)));
    assert_eq!(bus.read("/Ac/ActiveIn/P"), Some(BusValue::Float(1500.0)));
    assert_eq!(bus.read("/Ac/ActiveIn/L2/P"), Some(BusValue::Float(0.0)));
    assert_eq!(bus.read("/Soc"), Some(BusValue::Null));
    assert_eq!(bus.text("/Ac/Out/L1/P").as_deref(), Some("1500W"));
    assert_eq!(bus.text("/Soc").as_deref(), Some(""));

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_index_advances_every_second() {
    let dir = tempdir().unwrap();
    let running = start(config_in(&dir), dir);

    sleep(Duration::from_millis(1500)).await;
    let first = update_index(&running.bus);
    assert!(first > 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(update_index(&running.bus), (first + 1) % 256);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(update_index(&running.bus), (first + 11) % 256);

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_pinned_battery_service_ignores_others() {
    let dir = tempdir().unwrap();
    let config = EmulatorConfig {
        battery_service: Some(BATTERY.to_string()),
        ..config_in(&dir)
    };
    let running = start(config, dir);

    running
        .bus
        .announce_value("com.victronenergy.battery.other", "/Soc", 12.0);
    running.bus.announce_value(BATTERY, "/Soc", 87.5);
    running
        .bus
        .announce_value(BATTERY, "/Info/ChargeMode", "Absorption");
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(running.bus.read("/Soc"), Some(BusValue::Float(87.5)));
    assert_eq!(running.bus.read("/Leds/Absorption"), Some(BusValue::Int(1)));
    assert_eq!(running.bus.read("/Leds/Bulk"), Some(BusValue::Int(0)));

    running.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_energy_ledger_saved_on_shutdown_and_resumed() {
    let dir = tempdir().unwrap();
    let config = config_in(&dir);
    let running = start(config.clone(), dir);

    running.bus.add_device(BATTERY);
    running.bus.announce_value(BATTERY, "/Dc/0/Power", 3600.0);
    sleep(Duration::from_millis(10_500)).await;

    let published = running.bus.read(ENERGY_OUT_TO_INVERTER).and_then(|v| v.as_f64());
    assert!(published.is_some_and(|kwh| kwh > 0.0), "{published:?}");

    let dir = running.stop().await;
    let store = LedgerStore::new(&config.energy.working_file, &config.energy.storage_file);
    assert!(store.working_path().exists());
    assert!(store.storage_path().exists());
    let saved = store.load(Utc::now());
    assert!(saved.dc.charging > 0.0);
    assert_eq!(saved.dc.discharging, 0.0);

    // A restart picks the counters back up before any new energy flows.
    let resumed = start(config, dir);
    sleep(Duration::from_millis(500)).await;
    let republished = resumed.bus.read(ENERGY_OUT_TO_INVERTER).and_then(|v| v.as_f64());
    assert_eq!(republished, Some(saved.dc.charging / 1000.0));
    resumed.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_grid_value_skips_ticks_but_keeps_running() {
    let dir = tempdir().unwrap();
    let running = start(config_in(&dir), dir);

    sleep(Duration::from_millis(1500)).await;
    let before = update_index(&running.bus);

    running.bus.announce_value(GRID, "/Ac/L1/Power", "unavailable");
    sleep(Duration::from_secs(3)).await;
    assert_eq!(update_index(&running.bus), before);

    running.bus.announce_value(GRID, "/Ac/L1/Power", 42.0);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(update_index(&running.bus), before + 1);
    assert_eq!(running.bus.read("/Ac/Out/L1/P"), Some(BusValue::Float(42.0)));

    running.stop().await;
}
