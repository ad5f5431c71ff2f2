use crate::bus::{BusEvent, BusValue};
use crate::config::EmulatorConfig;
use std::collections::HashMap;
use tracing::{debug, trace};

pub const BATTERY_SERVICE_CLASS: &str = "com.victronenergy.battery";
pub const GRID_SERVICE_CLASS: &str = "com.victronenergy.grid";

/// Which upstream device a cached value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Battery,
    Grid,
}

impl DeviceRole {
    pub fn service_class(self) -> &'static str {
        match self {
            DeviceRole::Battery => BATTERY_SERVICE_CLASS,
            DeviceRole::Grid => GRID_SERVICE_CLASS,
        }
    }
}

/// Last known upstream values, per device role.
///
/// A path that has never been updated is absent, which is not the same as a
/// received zero. A received [`BusValue::Null`] also reads as absent.
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    battery: HashMap<String, BusValue>,
    grid: HashMap<String, BusValue>,
    battery_service: Option<String>,
    grid_service: Option<String>,
}

impl ValueCache {
    pub fn new(battery_service: Option<String>, grid_service: Option<String>) -> Self {
        Self {
            battery_service,
            grid_service,
            ..Self::default()
        }
    }

    pub fn from_config(config: &EmulatorConfig) -> Self {
        Self::new(config.battery_service.clone(), config.grid_service.clone())
    }

    fn values(&self, role: DeviceRole) -> &HashMap<String, BusValue> {
        match role {
            DeviceRole::Battery => &self.battery,
            DeviceRole::Grid => &self.grid,
        }
    }

    fn pinned(&self, role: DeviceRole) -> Option<&str> {
        match role {
            DeviceRole::Battery => self.battery_service.as_deref(),
            DeviceRole::Grid => self.grid_service.as_deref(),
        }
    }

    /// Whether updates from `service` feed the given role: either the exact
    /// pinned service, or any service of the role's class when none is pinned.
    pub fn accepts(&self, role: DeviceRole, service: &str) -> bool {
        match self.pinned(role) {
            Some(pinned) => service == pinned,
            None => service.starts_with(role.service_class()),
        }
    }

    pub fn update(&mut self, role: DeviceRole, path: &str, value: BusValue) {
        let values = match role {
            DeviceRole::Battery => &mut self.battery,
            DeviceRole::Grid => &mut self.grid,
        };
        values.insert(path.to_string(), value);
    }

    /// Applies a bus event. Returns `true` when a cached value changed.
    pub fn handle_event(&mut self, event: BusEvent) -> bool {
        match event {
            BusEvent::ValueChanged {
                service,
                path,
                value,
            } => {
                let mut accepted = false;
                for role in [DeviceRole::Battery, DeviceRole::Grid] {
                    if self.accepts(role, &service) {
                        trace!(?role, %service, %path, %value, "cached upstream value");
                        self.update(role, &path, value.clone());
                        accepted = true;
                    }
                }
                if !accepted {
                    trace!(%service, %path, "ignored value from unselected service");
                }
                accepted
            }
            BusEvent::DeviceAdded { service } => {
                debug!(%service, "device added");
                false
            }
            BusEvent::DeviceRemoved { service } => {
                debug!(%service, "device removed");
                false
            }
        }
    }

    /// Present, non-null value for `path`.
    pub fn get(&self, role: DeviceRole, path: &str) -> Option<&BusValue> {
        self.values(role).get(path).filter(|value| !value.is_null())
    }

    pub fn snapshot(&self, role: DeviceRole) -> HashMap<String, BusValue> {
        self.values(role).clone()
    }
}
