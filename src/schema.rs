//! The fixed set of paths the emulated inverter/charger exposes.
//!
//! [`PATHS`] declares every path with its value at registration time and its
//! display format. [`TICK_CONSTANTS`] lists the paths that are re-asserted with
//! a fixed value on every publish tick; everything else is either derived each
//! tick or keeps its registration value.

use crate::bus::{BusValue, ServiceItem, TextFormat};

/// A value that can live in a `const` table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seed {
    Null,
    Int(i64),
    Float(f64),
    Text(&'static str),
}

impl Seed {
    pub fn value(self) -> BusValue {
        match self {
            Seed::Null => BusValue::Null,
            Seed::Int(v) => BusValue::Int(v),
            Seed::Float(v) => BusValue::Float(v),
            Seed::Text(v) => BusValue::Text(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSpec {
    pub path: &'static str,
    pub initial: Seed,
    pub format: TextFormat,
}

const fn path(path: &'static str, initial: Seed, format: TextFormat) -> PathSpec {
    PathSpec {
        path,
        initial,
        format,
    }
}

const NULL: Seed = Seed::Null;
const ZERO: Seed = Seed::Int(0);
const ONE: Seed = Seed::Int(1);

const KWH: TextFormat = TextFormat::KiloWattHours;
const A: TextFormat = TextFormat::Amps;
const W: TextFormat = TextFormat::Watts;
const VA: TextFormat = TextFormat::VoltAmps;
const V: TextFormat = TextFormat::Volts;
const HZ: TextFormat = TextFormat::Hertz;
const C: TextFormat = TextFormat::Celsius;
const PCT: TextFormat = TextFormat::Percent;
const N: TextFormat = TextFormat::Integer;
const S: TextFormat = TextFormat::Text;

pub const UPDATE_INDEX: &str = "/UpdateIndex";
pub const ENERGY_OUT_TO_INVERTER: &str = "/Energy/OutToInverter";
pub const ENERGY_INVERTER_TO_AC_OUT: &str = "/Energy/InverterToAcOut";

pub const PATHS: &[PathSpec] = &[
    path("/Ac/ActiveIn/ActiveInput", ZERO, N),
    path("/Ac/ActiveIn/Connected", ONE, N),
    path("/Ac/ActiveIn/CurrentLimit", Seed::Int(16), A),
    path("/Ac/ActiveIn/CurrentLimitIsAdjustable", ONE, N),
    path("/Ac/ActiveIn/L1/F", NULL, HZ),
    path("/Ac/ActiveIn/L1/I", NULL, A),
    path("/Ac/ActiveIn/L1/P", NULL, W),
    path("/Ac/ActiveIn/L1/S", NULL, VA),
    path("/Ac/ActiveIn/L1/V", NULL, V),
    path("/Ac/ActiveIn/L2/F", NULL, HZ),
    path("/Ac/ActiveIn/L2/I", NULL, A),
    path("/Ac/ActiveIn/L2/P", NULL, W),
    path("/Ac/ActiveIn/L2/S", NULL, VA),
    path("/Ac/ActiveIn/L2/V", NULL, V),
    path("/Ac/ActiveIn/L3/F", NULL, HZ),
    path("/Ac/ActiveIn/L3/I", NULL, A),
    path("/Ac/ActiveIn/L3/P", NULL, W),
    path("/Ac/ActiveIn/L3/S", NULL, VA),
    path("/Ac/ActiveIn/L3/V", NULL, V),
    path("/Ac/ActiveIn/P", ZERO, W),
    path("/Ac/ActiveIn/S", ZERO, VA),
    path("/Ac/In/1/CurrentLimit", Seed::Int(16), A),
    path("/Ac/In/1/CurrentLimitIsAdjustable", ONE, N),
    path("/Ac/In/2/CurrentLimit", NULL, A),
    path("/Ac/In/2/CurrentLimitIsAdjustable", NULL, N),
    path("/Ac/NumberOfAcInputs", ONE, N),
    path("/Ac/NumberOfPhases", ONE, N),
    path("/Ac/Out/L1/F", NULL, HZ),
    path("/Ac/Out/L1/I", NULL, A),
    path("/Ac/Out/L1/NominalInverterPower", NULL, W),
    path("/Ac/Out/L1/P", NULL, W),
    path("/Ac/Out/L1/S", NULL, VA),
    path("/Ac/Out/L1/V", NULL, V),
    path("/Ac/Out/L2/F", NULL, HZ),
    path("/Ac/Out/L2/I", NULL, A),
    path("/Ac/Out/L2/NominalInverterPower", NULL, W),
    path("/Ac/Out/L2/P", NULL, W),
    path("/Ac/Out/L2/S", NULL, VA),
    path("/Ac/Out/L2/V", NULL, V),
    path("/Ac/Out/L3/F", NULL, HZ),
    path("/Ac/Out/L3/I", NULL, A),
    path("/Ac/Out/L3/NominalInverterPower", NULL, W),
    path("/Ac/Out/L3/P", NULL, W),
    path("/Ac/Out/L3/S", NULL, VA),
    path("/Ac/Out/L3/V", NULL, V),
    path("/Ac/Out/NominalInverterPower", Seed::Int(4500), W),
    path("/Ac/Out/P", ZERO, W),
    path("/Ac/Out/S", ZERO, VA),
    path("/Ac/PowerMeasurementType", Seed::Int(4), N),
    path("/Ac/State/IgnoreAcIn1", ZERO, N),
    path("/Ac/State/SplitPhaseL2Passthru", NULL, N),
    path("/Alarms/HighDcCurrent", ZERO, N),
    path("/Alarms/HighDcVoltage", ZERO, N),
    path("/Alarms/HighTemperature", ZERO, N),
    path("/Alarms/L1/HighTemperature", ZERO, N),
    path("/Alarms/L1/LowBattery", ZERO, N),
    path("/Alarms/L1/Overload", ZERO, N),
    path("/Alarms/L1/Ripple", ZERO, N),
    path("/Alarms/L2/HighTemperature", ZERO, N),
    path("/Alarms/L2/LowBattery", ZERO, N),
    path("/Alarms/L2/Overload", ZERO, N),
    path("/Alarms/L2/Ripple", ZERO, N),
    path("/Alarms/L3/HighTemperature", ZERO, N),
    path("/Alarms/L3/LowBattery", ZERO, N),
    path("/Alarms/L3/Overload", ZERO, N),
    path("/Alarms/L3/Ripple", ZERO, N),
    path("/Alarms/LowBattery", ZERO, N),
    path("/Alarms/Overload", ZERO, N),
    path("/Alarms/PhaseRotation", ZERO, N),
    path("/Alarms/Ripple", ZERO, N),
    path("/Alarms/TemperatureSensor", ZERO, N),
    path("/Alarms/VoltageSensor", ZERO, N),
    path("/BatteryOperationalLimits/BatteryLowVoltage", NULL, V),
    path("/BatteryOperationalLimits/MaxChargeCurrent", NULL, A),
    path("/BatteryOperationalLimits/MaxChargeVoltage", NULL, V),
    path("/BatteryOperationalLimits/MaxDischargeCurrent", NULL, A),
    path("/BatterySense/Temperature", NULL, C),
    path("/BatterySense/Voltage", NULL, V),
    path("/Bms/AllowToCharge", ONE, N),
    path("/Bms/AllowToChargeRate", ZERO, N),
    path("/Bms/AllowToDischarge", ONE, N),
    path("/Bms/BmsExpected", ZERO, N),
    path("/Bms/BmsType", ZERO, N),
    path("/Bms/Error", ZERO, N),
    path("/Bms/PreAlarm", NULL, N),
    path("/Dc/0/Current", NULL, A),
    path("/Dc/0/MaxChargeCurrent", NULL, A),
    path("/Dc/0/Power", NULL, W),
    path("/Dc/0/Temperature", NULL, C),
    path("/Dc/0/Voltage", NULL, V),
    path("/Devices/0/ExtendStatus/ChargeDisabledDueToLowTemp", ZERO, N),
    path("/Devices/0/ExtendStatus/ChargeIsDisabled", NULL, N),
    path("/Devices/0/ExtendStatus/GridRelayReport/Code", NULL, N),
    path("/Devices/0/ExtendStatus/GridRelayReport/Count", ZERO, N),
    path("/Devices/0/ExtendStatus/GridRelayReport/Reset", ZERO, N),
    path("/Devices/0/ExtendStatus/HighDcCurrent", ZERO, N),
    path("/Devices/0/ExtendStatus/HighDcVoltage", ZERO, N),
    path("/Devices/0/ExtendStatus/IgnoreAcIn1", ZERO, N),
    path("/Devices/0/ExtendStatus/MainsPllLocked", ONE, N),
    path("/Devices/0/ExtendStatus/PcvPotmeterOnZero", ZERO, N),
    path("/Devices/0/ExtendStatus/PowerPackPreOverload", ZERO, N),
    path("/Devices/0/ExtendStatus/SocTooLowToInvert", ZERO, N),
    path("/Devices/0/ExtendStatus/SustainMode", ZERO, N),
    path("/Devices/0/ExtendStatus/SwitchoverInfo/Connecting", ZERO, N),
    path("/Devices/0/ExtendStatus/SwitchoverInfo/Delay", ZERO, N),
    path("/Devices/0/ExtendStatus/SwitchoverInfo/ErrorFlags", ZERO, N),
    path("/Devices/0/ExtendStatus/TemperatureHighForceBypass", ZERO, N),
    path("/Devices/0/ExtendStatus/VeBusNetworkQualityCounter", ZERO, N),
    path("/Devices/0/ExtendStatus/WaitingForRelayTest", ZERO, N),
    path("/Devices/0/InterfaceProtectionLog/0/ErrorFlags", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/0/Time", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/1/ErrorFlags", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/1/Time", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/2/ErrorFlags", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/2/Time", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/3/ErrorFlags", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/3/Time", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/4/ErrorFlags", NULL, N),
    path("/Devices/0/InterfaceProtectionLog/4/Time", NULL, N),
    path("/Devices/0/SerialNumber", Seed::Text("HQ00000AA01"), S),
    path("/Devices/0/Version", Seed::Int(2623497), S),
    path("/Devices/Bms/Version", NULL, S),
    path("/Devices/Dmc/Version", NULL, S),
    path("/Devices/NumberOfMultis", ONE, N),
    path("/Energy/AcIn1ToAcOut", ZERO, N),
    path("/Energy/AcIn1ToInverter", ZERO, N),
    path("/Energy/AcIn2ToAcOut", ZERO, N),
    path("/Energy/AcIn2ToInverter", ZERO, N),
    path("/Energy/AcOutToAcIn1", ZERO, N),
    path("/Energy/AcOutToAcIn2", ZERO, N),
    path("/Energy/InverterToAcIn1", ZERO, N),
    path("/Energy/InverterToAcIn2", ZERO, N),
    path(ENERGY_INVERTER_TO_AC_OUT, ZERO, KWH),
    path(ENERGY_OUT_TO_INVERTER, ZERO, KWH),
    path("/ExtraBatteryCurrent", ZERO, N),
    path("/FirmwareFeatures/BolFrame", ONE, N),
    path("/FirmwareFeatures/BolUBatAndTBatSense", ONE, N),
    path("/FirmwareFeatures/CommandWriteViaId", ONE, N),
    path("/FirmwareFeatures/IBatSOCBroadcast", ONE, N),
    path("/FirmwareFeatures/NewPanelFrame", ONE, N),
    path("/FirmwareFeatures/SetChargeState", ONE, N),
    path("/FirmwareSubVersion", ZERO, N),
    path("/Hub/ChargeVoltage", Seed::Float(55.2), N),
    path("/Hub4/AssistantId", Seed::Int(5), N),
    path("/Hub4/DisableCharge", ZERO, N),
    path("/Hub4/DisableFeedIn", ZERO, N),
    path("/Hub4/DoNotFeedInOvervoltage", ONE, N),
    path("/Hub4/FixSolarOffsetTo100mV", ONE, N),
    path("/Hub4/L1/AcPowerSetpoint", ZERO, N),
    path("/Hub4/L1/CurrentLimitedDueToHighTemp", ZERO, N),
    path("/Hub4/L1/FrequencyVariationOccurred", ZERO, N),
    path("/Hub4/L1/MaxFeedInPower", Seed::Int(32766), N),
    path("/Hub4/L1/OffsetAddedToVoltageSetpoint", ZERO, N),
    path("/Hub4/Sustain", ZERO, N),
    path("/Hub4/TargetPowerIsMaxFeedIn", ZERO, N),
    path("/Leds/Absorption", ZERO, N),
    path("/Leds/Bulk", ZERO, N),
    path("/Leds/Float", ZERO, N),
    path("/Leds/Inverter", ONE, N),
    path("/Leds/LowBattery", ZERO, N),
    path("/Leds/Mains", ONE, N),
    path("/Leds/Overload", ZERO, N),
    path("/Leds/Temperature", ZERO, N),
    path("/Mode", Seed::Int(3), N),
    path("/ModeIsAdjustable", ONE, N),
    path("/PvInverter/Disable", ONE, N),
    path("/Quirks", ZERO, N),
    path("/RedetectSystem", ZERO, N),
    path("/Settings/Alarm/System/GridLost", ONE, N),
    path("/Settings/SystemSetup/AcInput1", ONE, N),
    path("/Settings/SystemSetup/AcInput2", ZERO, N),
    path("/ShortIds", ONE, N),
    path("/Soc", NULL, PCT),
    path("/State", Seed::Int(3), N),
    path("/SystemReset", NULL, N),
    path("/VebusChargeState", ONE, N),
    path("/VebusError", ZERO, N),
    path("/VebusMainState", Seed::Int(9), N),
    path(UPDATE_INDEX, ZERO, N),
];

/// Values written unchanged on every tick.
pub const TICK_CONSTANTS: &[(&str, Seed)] = &[
    ("/Ac/ActiveIn/ActiveInput", ZERO),
    ("/Ac/ActiveIn/Connected", ONE),
    ("/Ac/ActiveIn/CurrentLimit", Seed::Int(16)),
    ("/Ac/ActiveIn/CurrentLimitIsAdjustable", ONE),
    ("/Ac/NumberOfAcInputs", ONE),
    ("/Ac/PowerMeasurementType", Seed::Int(4)),
    ("/Ac/State/IgnoreAcIn1", ZERO),
    ("/Ac/State/SplitPhaseL2Passthru", NULL),
    ("/Alarms/HighDcCurrent", ZERO),
    ("/Alarms/HighDcVoltage", ZERO),
    ("/Alarms/HighTemperature", ZERO),
    ("/Alarms/L1/HighTemperature", ZERO),
    ("/Alarms/L1/LowBattery", ZERO),
    ("/Alarms/L1/Overload", ZERO),
    ("/Alarms/L1/Ripple", ZERO),
    ("/Alarms/L2/HighTemperature", ZERO),
    ("/Alarms/L2/LowBattery", ZERO),
    ("/Alarms/L2/Overload", ZERO),
    ("/Alarms/L2/Ripple", ZERO),
    ("/Alarms/L3/HighTemperature", ZERO),
    ("/Alarms/L3/LowBattery", ZERO),
    ("/Alarms/L3/Overload", ZERO),
    ("/Alarms/L3/Ripple", ZERO),
    ("/Alarms/LowBattery", ZERO),
    ("/Alarms/Overload", ZERO),
    ("/Alarms/PhaseRotation", ZERO),
    ("/Alarms/Ripple", ZERO),
    ("/Alarms/TemperatureSensor", ZERO),
    ("/Alarms/VoltageSensor", ZERO),
    ("/BatteryOperationalLimits/BatteryLowVoltage", NULL),
    ("/BatterySense/Temperature", NULL),
    ("/BatterySense/Voltage", NULL),
    ("/Bms/AllowToCharge", ONE),
    ("/Bms/AllowToChargeRate", ZERO),
    ("/Bms/AllowToDischarge", ONE),
    ("/Bms/BmsExpected", ZERO),
    ("/Bms/BmsType", ZERO),
    ("/Bms/Error", ZERO),
    ("/Bms/PreAlarm", NULL),
    ("/Devices/0/ExtendStatus/ChargeDisabledDueToLowTemp", ZERO),
    ("/Devices/0/ExtendStatus/ChargeIsDisabled", NULL),
    ("/Devices/0/ExtendStatus/GridRelayReport/Code", NULL),
    ("/Devices/0/ExtendStatus/GridRelayReport/Count", ZERO),
    ("/Devices/0/ExtendStatus/GridRelayReport/Reset", ZERO),
    ("/Devices/0/ExtendStatus/HighDcCurrent", ZERO),
    ("/Devices/0/ExtendStatus/HighDcVoltage", ZERO),
    ("/Devices/0/ExtendStatus/IgnoreAcIn1", ZERO),
    ("/Devices/0/ExtendStatus/MainsPllLocked", ONE),
    ("/Devices/0/ExtendStatus/PcvPotmeterOnZero", ZERO),
    ("/Devices/0/ExtendStatus/PowerPackPreOverload", ZERO),
    ("/Devices/0/ExtendStatus/SocTooLowToInvert", ZERO),
    ("/Devices/0/ExtendStatus/SustainMode", ZERO),
    ("/Devices/0/ExtendStatus/SwitchoverInfo/Connecting", ZERO),
    ("/Devices/0/ExtendStatus/SwitchoverInfo/Delay", ZERO),
    ("/Devices/0/ExtendStatus/SwitchoverInfo/ErrorFlags", ZERO),
    ("/Devices/0/ExtendStatus/TemperatureHighForceBypass", ZERO),
    ("/Devices/0/ExtendStatus/VeBusNetworkQualityCounter", ZERO),
    ("/Devices/0/ExtendStatus/WaitingForRelayTest", ZERO),
    ("/Devices/0/InterfaceProtectionLog/0/ErrorFlags", NULL),
    ("/Devices/0/InterfaceProtectionLog/0/Time", NULL),
    ("/Devices/0/InterfaceProtectionLog/1/ErrorFlags", NULL),
    ("/Devices/0/InterfaceProtectionLog/1/Time", NULL),
    ("/Devices/0/InterfaceProtectionLog/2/ErrorFlags", NULL),
    ("/Devices/0/InterfaceProtectionLog/2/Time", NULL),
    ("/Devices/0/InterfaceProtectionLog/3/ErrorFlags", NULL),
    ("/Devices/0/InterfaceProtectionLog/3/Time", NULL),
    ("/Devices/0/InterfaceProtectionLog/4/ErrorFlags", NULL),
    ("/Devices/0/InterfaceProtectionLog/4/Time", NULL),
    ("/Devices/0/SerialNumber", Seed::Text("HQ00000AA01")),
    ("/Devices/0/Version", Seed::Int(2623497)),
    ("/Devices/Bms/Version", NULL),
    ("/Devices/Dmc/Version", NULL),
    ("/Devices/NumberOfMultis", ONE),
    ("/FirmwareFeatures/BolFrame", ONE),
    ("/FirmwareFeatures/BolUBatAndTBatSense", ONE),
    ("/FirmwareFeatures/CommandWriteViaId", ONE),
    ("/FirmwareFeatures/IBatSOCBroadcast", ONE),
    ("/FirmwareFeatures/NewPanelFrame", ONE),
    ("/FirmwareFeatures/SetChargeState", ONE),
    ("/FirmwareSubVersion", ZERO),
    ("/Hub/ChargeVoltage", Seed::Float(55.2)),
    ("/Hub4/AssistantId", Seed::Int(5)),
    ("/Hub4/DisableCharge", ZERO),
    ("/Hub4/DisableFeedIn", ZERO),
    ("/Hub4/DoNotFeedInOvervoltage", ONE),
    ("/Hub4/FixSolarOffsetTo100mV", ONE),
    ("/Hub4/L1/AcPowerSetpoint", ZERO),
    ("/Hub4/L1/CurrentLimitedDueToHighTemp", ZERO),
    ("/Hub4/L1/FrequencyVariationOccurred", ZERO),
    ("/Hub4/L1/MaxFeedInPower", Seed::Int(32766)),
    ("/Hub4/L1/OffsetAddedToVoltageSetpoint", ZERO),
    ("/Hub4/Sustain", ZERO),
    ("/Hub4/TargetPowerIsMaxFeedIn", ZERO),
    ("/Leds/Inverter", ONE),
    ("/Leds/LowBattery", ZERO),
    ("/Leds/Mains", ONE),
    ("/Leds/Overload", ZERO),
    ("/Leds/Temperature", ZERO),
    ("/Mode", Seed::Int(3)),
    ("/ModeIsAdjustable", ONE),
    ("/Quirks", ZERO),
    ("/RedetectSystem", ZERO),
    ("/Settings/Alarm/System/GridLost", ONE),
    ("/Settings/SystemSetup/AcInput1", ONE),
    ("/Settings/SystemSetup/AcInput2", ZERO),
    ("/ShortIds", ONE),
    ("/State", Seed::Int(8)),
    ("/SystemReset", NULL),
    ("/VebusChargeState", ONE),
    ("/VebusError", ZERO),
    ("/VebusMainState", Seed::Int(9)),
];

pub fn lookup(path: &str) -> Option<&'static PathSpec> {
    PATHS.iter().find(|spec| spec.path == path)
}

/// Every schema path as a writeable bus item carrying its initial value.
pub fn service_items() -> Vec<ServiceItem> {
    PATHS
        .iter()
        .map(|spec| ServiceItem {
            path: spec.path.to_string(),
            initial: spec.initial.value(),
            format: spec.format,
            writeable: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_paths_are_unique() {
        let mut seen = HashSet::new();
        for spec in PATHS {
            assert!(seen.insert(spec.path), "duplicate path {}", spec.path);
        }
        assert!(PATHS.len() > 150);
    }

    #[test]
    fn test_tick_constants_are_declared() {
        for (path, _) in TICK_CONSTANTS {
            assert!(lookup(path).is_some(), "{path} is not in the schema");
        }
    }

    #[test]
    fn test_alarms_and_firmware_features() {
        for (path, value) in TICK_CONSTANTS {
            if path.starts_with("/Alarms/") {
                assert_eq!(*value, Seed::Int(0), "{path}");
            }
            if path.starts_with("/FirmwareFeatures/") {
                assert_eq!(*value, Seed::Int(1), "{path}");
            }
        }
    }

    #[test]
    fn test_service_items_carry_initial_values() {
        let items = service_items();
        assert_eq!(items.len(), PATHS.len());

        let serial = items
            .iter()
            .find(|item| item.path == "/Devices/0/SerialNumber")
            .unwrap();
        assert_eq!(serial.initial, BusValue::Text("HQ00000AA01".to_string()));
        assert_eq!(serial.format, TextFormat::Text);

        let soc = lookup("/Soc").unwrap();
        assert_eq!(soc.initial.value(), BusValue::Null);
        assert_eq!(soc.format, TextFormat::Percent);
    }
}
