//! Publish/subscribe bus abstraction.
//!
//! The emulator only needs a small slice of what a real device bus offers: a
//! single named service exposing a tree of typed values, a way to watch other
//! services' values, and device lifecycle notifications. [`Bus`] captures that
//! slice and [`LocalBus`] implements it in-process.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{debug, warn};

const SUBSCRIBER_QUEUE: usize = 128;

/// A value as carried by the bus. `Null` is the explicit "no value" marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BusValue {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl BusValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Int(v) => Some(*v as f64),
            BusValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BusValue::Null)
    }
}

impl fmt::Display for BusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusValue::Null => write!(f, "null"),
            BusValue::Int(v) => write!(f, "{v}"),
            BusValue::Float(v) => write!(f, "{v}"),
            BusValue::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for BusValue {
    fn from(value: i64) -> Self {
        BusValue::Int(value)
    }
}

impl From<f64> for BusValue {
    fn from(value: f64) -> Self {
        BusValue::Float(value)
    }
}

impl From<&str> for BusValue {
    fn from(value: &str) -> Self {
        BusValue::Text(value.to_string())
    }
}

impl From<String> for BusValue {
    fn from(value: String) -> Self {
        BusValue::Text(value)
    }
}

impl<T: Into<BusValue>> From<Option<T>> for BusValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BusValue::Null, Into::into)
    }
}

/// How a published value is rendered as text for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    KiloWattHours,
    Amps,
    Watts,
    VoltAmps,
    Volts,
    Hertz,
    Celsius,
    Percent,
    Integer,
    Text,
}

impl TextFormat {
    pub fn render(self, value: &BusValue) -> String {
        let number = match value {
            BusValue::Null => return String::new(),
            BusValue::Text(text) => return text.clone(),
            other => match other.as_f64() {
                Some(number) => number,
                None => return other.to_string(),
            },
        };
        // Integer renderings truncate toward zero.
        let whole = number.trunc() as i64;
        match self {
            TextFormat::KiloWattHours => format!("{number:.2}kWh"),
            TextFormat::Amps => format!("{number:.2}A"),
            TextFormat::Watts => format!("{whole}W"),
            TextFormat::VoltAmps => format!("{whole}VA"),
            TextFormat::Volts => format!("{whole}V"),
            TextFormat::Hertz => format!("{number:.1}Hz"),
            TextFormat::Celsius => format!("{whole}°C"),
            TextFormat::Percent => format!("{number:.1}%"),
            TextFormat::Integer => format!("{whole}"),
            TextFormat::Text => value.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("service `{0}` is already registered on this bus")]
    AlreadyRegistered(String),
    #[error("no service has been registered on this bus")]
    NotRegistered,
    #[error("path `{0}` is not part of the registered service")]
    UnknownPath(String),
    #[error("path `{0}` is not writeable")]
    ReadOnly(String),
}

/// Callback invoked when somebody else writes one of our paths.
/// Returning `false` rejects the write.
pub type WriteCallback = Arc<dyn Fn(&str, &BusValue) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceItem {
    pub path: String,
    pub initial: BusValue,
    pub format: TextFormat,
    pub writeable: bool,
}

/// Everything needed to register a service on the bus.
pub struct ServiceDescriptor {
    pub name: String,
    pub items: Vec<ServiceItem>,
    pub on_change: Option<WriteCallback>,
}

/// Service-class prefix → watched paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTree {
    classes: BTreeMap<String, Vec<String>>,
}

impl SubscriptionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch<I, S>(mut self, service_class: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes
            .entry(service_class.to_string())
            .or_default()
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.classes
            .iter()
            .map(|(class, paths)| (class.as_str(), paths.as_slice()))
    }

    pub fn matches_service(&self, service: &str) -> bool {
        self.classes.keys().any(|class| service.starts_with(class))
    }

    pub fn matches(&self, service: &str, path: &str) -> bool {
        self.classes
            .iter()
            .any(|(class, paths)| service.starts_with(class) && paths.iter().any(|p| p == path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    ValueChanged {
        service: String,
        path: String,
        value: BusValue,
    },
    DeviceAdded {
        service: String,
    },
    DeviceRemoved {
        service: String,
    },
}

/// The bus as seen by the emulator. Publishing never waits for consumers.
pub trait Bus: Send + Sync {
    fn register_service(&self, descriptor: ServiceDescriptor) -> Result<(), BusError>;
    fn publish(&self, path: &str, value: BusValue) -> Result<(), BusError>;
    fn read(&self, path: &str) -> Option<BusValue>;
    fn text(&self, path: &str) -> Option<String>;
    fn subscribe(&self, tree: SubscriptionTree) -> Receiver<BusEvent>;
}

struct PublishedItem {
    value: BusValue,
    format: TextFormat,
    writeable: bool,
}

struct RegisteredService {
    name: String,
    items: HashMap<String, PublishedItem>,
    on_change: Option<WriteCallback>,
}

struct Subscriber {
    tree: SubscriptionTree,
    sender: Sender<BusEvent>,
}

#[derive(Default)]
struct LocalBusState {
    service: Option<RegisteredService>,
    subscribers: Vec<Subscriber>,
}

/// In-process bus. Cloning shares the same underlying state.
#[derive(Clone, Default)]
pub struct LocalBus {
    state: Arc<Mutex<LocalBusState>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LocalBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn service_name(&self) -> Option<String> {
        self.state().service.as_ref().map(|s| s.name.clone())
    }

    /// Simulates another service on the bus changing one of its values.
    pub fn announce_value(&self, service: &str, path: &str, value: impl Into<BusValue>) {
        let event = BusEvent::ValueChanged {
            service: service.to_string(),
            path: path.to_string(),
            value: value.into(),
        };
        self.deliver(event, |tree| tree.matches(service, path));
    }

    pub fn add_device(&self, service: &str) {
        let event = BusEvent::DeviceAdded {
            service: service.to_string(),
        };
        self.deliver(event, |tree| tree.matches_service(service));
    }

    pub fn remove_device(&self, service: &str) {
        let event = BusEvent::DeviceRemoved {
            service: service.to_string(),
        };
        self.deliver(event, |tree| tree.matches_service(service));
    }

    /// A write coming from another bus client. Returns whether it was accepted.
    pub fn write(&self, path: &str, value: BusValue) -> Result<bool, BusError> {
        let callback = {
            let state = self.state();
            let service = state.service.as_ref().ok_or(BusError::NotRegistered)?;
            let item = service
                .items
                .get(path)
                .ok_or_else(|| BusError::UnknownPath(path.to_string()))?;
            if !item.writeable {
                return Err(BusError::ReadOnly(path.to_string()));
            }
            service.on_change.clone()
        };

        // Run the callback without holding the lock so it may touch the bus.
        let accepted = callback.map_or(true, |callback| callback(path, &value));
        if accepted {
            self.publish(path, value)?;
        }
        Ok(accepted)
    }

    fn deliver(&self, event: BusEvent, wants: impl Fn(&SubscriptionTree) -> bool) {
        let mut state = self.state();
        state.subscribers.retain(|subscriber| {
            if !wants(&subscriber.tree) {
                return true;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(dropped)) => {
                    warn!(event = ?dropped, "subscriber queue full, dropping bus event");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("subscriber went away, removing it");
                    false
                }
            }
        });
    }
}

impl Bus for LocalBus {
    fn register_service(&self, descriptor: ServiceDescriptor) -> Result<(), BusError> {
        let mut state = self.state();
        if let Some(existing) = &state.service {
            return Err(BusError::AlreadyRegistered(existing.name.clone()));
        }
        let items = descriptor
            .items
            .into_iter()
            .map(|item| {
                (
                    item.path,
                    PublishedItem {
                        value: item.initial,
                        format: item.format,
                        writeable: item.writeable,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        debug!(service = %descriptor.name, paths = items.len(), "registered service");
        state.service = Some(RegisteredService {
            name: descriptor.name,
            items,
            on_change: descriptor.on_change,
        });
        Ok(())
    }

    fn publish(&self, path: &str, value: BusValue) -> Result<(), BusError> {
        let mut state = self.state();
        let service = state.service.as_mut().ok_or(BusError::NotRegistered)?;
        let item = service
            .items
            .get_mut(path)
            .ok_or_else(|| BusError::UnknownPath(path.to_string()))?;
        item.value = value;
        Ok(())
    }

    fn read(&self, path: &str) -> Option<BusValue> {
        let state = self.state();
        state
            .service
            .as_ref()
            .and_then(|service| service.items.get(path))
            .map(|item| item.value.clone())
    }

    fn text(&self, path: &str) -> Option<String> {
        let state = self.state();
        state
            .service
            .as_ref()
            .and_then(|service| service.items.get(path))
            .map(|item| item.format.render(&item.value))
    }

    fn subscribe(&self, tree: SubscriptionTree) -> Receiver<BusEvent> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.state().subscribers.push(Subscriber { tree, sender });
        receiver
    }
}
