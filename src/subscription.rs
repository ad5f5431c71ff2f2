use crate::bus::{Bus, BusEvent, SubscriptionTree};
use crate::value_cache::{BATTERY_SERVICE_CLASS, GRID_SERVICE_CLASS};
use tokio::sync::mpsc::Receiver;
use tracing::info;

pub const BATTERY_PATHS: [&str; 9] = [
    "/Dc/0/Current",
    "/Dc/0/Power",
    "/Dc/0/Temperature",
    "/Dc/0/Voltage",
    "/Soc",
    "/Info/ChargeMode",
    "/Info/MaxChargeCurrent",
    "/Info/MaxChargeVoltage",
    "/Info/MaxDischargeCurrent",
];

pub const GRID_PATHS: [&str; 12] = [
    "/Ac/L1/Power",
    "/Ac/L2/Power",
    "/Ac/L3/Power",
    "/Ac/L1/Current",
    "/Ac/L2/Current",
    "/Ac/L3/Current",
    "/Ac/L1/Voltage",
    "/Ac/L2/Voltage",
    "/Ac/L3/Voltage",
    "/Ac/Power",
    "/Ac/Current",
    "/Ac/Voltage",
];

/// The upstream paths the emulator watches, keyed by service class.
pub fn subscription_tree() -> SubscriptionTree {
    SubscriptionTree::new()
        .watch(BATTERY_SERVICE_CLASS, BATTERY_PATHS)
        .watch(GRID_SERVICE_CLASS, GRID_PATHS)
}

/// Subscribes to the battery and grid trees and hands back the event stream
/// the publisher feeds into its value cache.
pub fn subscribe_upstream(bus: &impl Bus) -> Receiver<BusEvent> {
    let tree = subscription_tree();
    for (class, paths) in tree.classes() {
        info!(service_class = class, paths = paths.len(), "watching upstream device");
    }
    bus.subscribe(tree)
}
