use crate::bus::{Bus, BusEvent, BusValue, ServiceDescriptor, ServiceItem, TextFormat};
use crate::config::EmulatorConfig;
use crate::derivation::{derive, energy_fields};
use crate::energy_accumulator::EnergyAccumulator;
use crate::error::EmulatorError;
use crate::schema::{self, UPDATE_INDEX};
use crate::value_cache::{DeviceRole, ValueCache};
use std::{future::Future, sync::Arc};
use tokio::sync::mpsc::Receiver;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Rolling tick counter published so consumers can tell the service is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateIndex(u8);

impl UpdateIndex {
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn advance(&mut self) -> u8 {
        *self = self.next();
        self.0
    }
}

fn identity_item(path: &str, value: BusValue, format: TextFormat, writeable: bool) -> ServiceItem {
    ServiceItem {
        path: path.to_string(),
        initial: value,
        format,
        writeable,
    }
}

fn service_descriptor(config: &EmulatorConfig) -> ServiceDescriptor {
    let mut items = vec![
        identity_item(
            "/Mgmt/ProcessName",
            env!("CARGO_PKG_NAME").into(),
            TextFormat::Text,
            false,
        ),
        identity_item(
            "/Mgmt/ProcessVersion",
            env!("CARGO_PKG_VERSION").into(),
            TextFormat::Text,
            false,
        ),
        identity_item(
            "/Mgmt/Connection",
            config.connection.as_str().into(),
            TextFormat::Text,
            false,
        ),
        identity_item(
            "/DeviceInstance",
            i64::from(config.device_instance).into(),
            TextFormat::Integer,
            false,
        ),
        identity_item(
            "/ProductId",
            config.product_id.into(),
            TextFormat::Integer,
            false,
        ),
        identity_item(
            "/ProductName",
            config.product_name.as_str().into(),
            TextFormat::Text,
            false,
        ),
        identity_item("/CustomName", "".into(), TextFormat::Text, true),
        identity_item(
            "/FirmwareVersion",
            config.firmware_version.into(),
            TextFormat::Integer,
            false,
        ),
        identity_item(
            "/HardwareVersion",
            config.hardware_version.as_str().into(),
            TextFormat::Text,
            false,
        ),
        identity_item("/Connected", BusValue::Int(1), TextFormat::Integer, false),
    ];
    items.extend(schema::service_items());

    ServiceDescriptor {
        name: config.service_name.clone(),
        items,
        on_change: Some(Arc::new(|path: &str, value: &BusValue| {
            debug!(%path, %value, "someone else updated a published path");
            true
        })),
    }
}

/// Owns the emulated service: keeps the upstream cache current, derives and
/// publishes the full value set once per tick, and drives the energy ledger.
pub struct Publisher<B: Bus> {
    bus: B,
    config: Arc<EmulatorConfig>,
    cache: ValueCache,
    accumulator: EnergyAccumulator,
    update_index: UpdateIndex,
}

impl<B: Bus> Publisher<B> {
    /// Registers the emulated service on `bus`.
    pub fn new(
        bus: B,
        config: Arc<EmulatorConfig>,
        accumulator: EnergyAccumulator,
    ) -> Result<Self, EmulatorError> {
        bus.register_service(service_descriptor(&config))?;
        info!(
            service = %config.service_name,
            device_instance = config.device_instance,
            phases = config.phases.len(),
            "registered emulated inverter/charger"
        );
        Ok(Self {
            bus,
            cache: ValueCache::from_config(&config),
            config,
            accumulator,
            update_index: UpdateIndex::default(),
        })
    }

    pub fn accumulator(&self) -> &EnergyAccumulator {
        &self.accumulator
    }

    pub fn update_index(&self) -> UpdateIndex {
        self.update_index
    }

    pub fn handle_event(&mut self, event: BusEvent) -> bool {
        self.cache.handle_event(event)
    }

    /// One publish cycle. Energy is counted and flushed even when derivation
    /// fails. On error the fields written so far stay on the bus and the update
    /// index is left alone.
    pub fn tick(&mut self, now: Instant) -> Result<(), EmulatorError> {
        self.account_energy(now);

        let battery = self.cache.snapshot(DeviceRole::Battery);
        let grid = self.cache.snapshot(DeviceRole::Grid);
        let mut snapshot = derive(&battery, &grid, &self.config)?;

        for (path, value) in energy_fields(self.accumulator.totals()) {
            snapshot.insert(path.to_string(), value);
        }

        let fields = snapshot.len();
        for (path, value) in snapshot {
            self.bus.publish(&path, value)?;
        }

        let next = self.update_index.next();
        self.bus
            .publish(UPDATE_INDEX, i64::from(next.value()).into())?;
        self.update_index = next;
        debug!(fields, update_index = next.value(), "published tick");
        Ok(())
    }

    fn account_energy(&mut self, now: Instant) {
        let battery_power = self
            .cache
            .get(DeviceRole::Battery, "/Dc/0/Power")
            .and_then(BusValue::as_f64);
        self.accumulator.accumulate(battery_power, now);
        if let Err(e) = self.accumulator.flush_working(now) {
            warn!("failed to write working energy ledger: {e:#}");
        }
        if let Err(e) = self.accumulator.flush_durable(now) {
            warn!("failed to write energy ledger storage: {e:#}");
        }
    }

    /// Runs until `shutdown` resolves, then writes both ledger tiers.
    pub async fn run(
        mut self,
        mut events: Receiver<BusEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), EmulatorError> {
        let mut interval = time::interval(self.config.publish_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_ms = self.config.publish_interval.as_millis() as u64,
            "starting publish loop"
        );
        let mut events_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                now = interval.tick() => {
                    if let Err(e) = self.tick(now) {
                        error!("tick failed: {e}");
                    }
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => {
                        warn!("upstream subscription closed, publishing cached values only");
                        events_open = false;
                    }
                },
            }
        }

        self.accumulator.flush_all(Instant::now())?;
        let totals = self.accumulator.totals();
        info!(
            charging_wh = totals.charging_wh,
            discharging_wh = totals.discharging_wh,
            "saved energy ledger"
        );
        Ok(())
    }
}
