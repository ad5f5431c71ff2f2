//! Turns cached upstream values into the full set of published values.
//!
//! The emulated unit has no inverter stage of its own: whatever the grid meter
//! sees on a phase is reported both as AC input and as AC output. Battery
//! values are passed through to the DC side.

use crate::bus::BusValue;
use crate::config::{EmulatorConfig, Phase};
use crate::energy_accumulator::EnergyTotals;
use crate::error::EmulatorError;
use crate::schema::{self, TICK_CONSTANTS};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};

/// Path → value for everything written during one tick.
pub type Snapshot = BTreeMap<String, BusValue>;

/// Cached values of one upstream device, as handed out by the value cache.
pub type Values = HashMap<String, BusValue>;

const CHARGE_MODE_LEDS: [(&str, &str); 3] = [
    ("Absorption", "/Leds/Absorption"),
    ("Bulk", "/Leds/Bulk"),
    ("Float", "/Leds/Float"),
];

/// Battery value → published path, copied verbatim.
const BATTERY_PASSTHROUGH: [(&str, &str); 8] = [
    ("/Dc/0/Current", "/Dc/0/Current"),
    ("/Dc/0/Power", "/Dc/0/Power"),
    ("/Dc/0/Temperature", "/Dc/0/Temperature"),
    ("/Soc", "/Soc"),
    ("/Info/MaxChargeCurrent", "/Dc/0/MaxChargeCurrent"),
    ("/Info/MaxChargeCurrent", "/BatteryOperationalLimits/MaxChargeCurrent"),
    ("/Info/MaxChargeVoltage", "/BatteryOperationalLimits/MaxChargeVoltage"),
    ("/Info/MaxDischargeCurrent", "/BatteryOperationalLimits/MaxDischargeCurrent"),
];

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current on a phase, or 0 when there is no positive voltage to divide by.
pub fn phase_current(phase: Phase, power: f64, voltage: f64) -> f64 {
    if voltage > 0.0 {
        return round2(power / voltage);
    }
    if power != 0.0 {
        error!(%phase, power, voltage, "no usable voltage to derive current from, using 0A");
    } else {
        debug!(%phase, "no voltage on phase, current is 0A");
    }
    0.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReading {
    pub phase: Phase,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
}

impl PhaseReading {
    pub fn new(phase: Phase, power: f64, voltage: f64) -> Self {
        Self {
            phase,
            power,
            voltage,
            current: phase_current(phase, power, voltage),
        }
    }

    /// Reads a phase from the grid meter. Missing values count as 0.
    pub fn from_grid(phase: Phase, grid: &Values) -> Result<Self, EmulatorError> {
        let power = number(grid, &format!("/Ac/{phase}/Power"))?.unwrap_or(0.0);
        let voltage = number(grid, &format!("/Ac/{phase}/Voltage"))?.unwrap_or(0.0);
        Ok(Self::new(phase, power, voltage))
    }
}

/// Numeric value at `path`; `None` when absent or null.
fn number(values: &Values, path: &str) -> Result<Option<f64>, EmulatorError> {
    match values.get(path) {
        None | Some(BusValue::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| EmulatorError::NotNumeric {
                path: path.to_string(),
                value: value.clone(),
            }),
    }
}

fn passthrough(values: &Values, path: &str) -> BusValue {
    values.get(path).cloned().unwrap_or_default()
}

/// Battery voltage as reported, else power / current. Unlike phase current,
/// an underivable voltage stays null rather than becoming 0.
pub fn dc_voltage(battery: &Values) -> Result<BusValue, EmulatorError> {
    match battery.get("/Dc/0/Voltage") {
        Some(value) if !value.is_null() => return Ok(value.clone()),
        _ => {}
    }
    let power = number(battery, "/Dc/0/Power")?;
    let current = number(battery, "/Dc/0/Current")?;
    Ok(match (power, current) {
        (Some(power), Some(current)) if current != 0.0 => BusValue::Float(round2(power / current)),
        (Some(_), Some(_)) => {
            debug!("battery current is 0A, leaving DC voltage unset");
            BusValue::Null
        }
        _ => BusValue::Null,
    })
}

/// Absorption/Bulk/Float indicator states for a charge mode string.
pub fn charge_mode_leds(mode: Option<&str>) -> [(&'static str, i64); 3] {
    let mode = mode.unwrap_or_default();
    CHARGE_MODE_LEDS.map(|(prefix, path)| (path, i64::from(mode.starts_with(prefix))))
}

/// Energy counters in kWh.
pub fn energy_fields(totals: EnergyTotals) -> [(&'static str, BusValue); 2] {
    [
        (
            schema::ENERGY_OUT_TO_INVERTER,
            BusValue::Float(totals.charging_wh / 1000.0),
        ),
        (
            schema::ENERGY_INVERTER_TO_AC_OUT,
            BusValue::Float(totals.discharging_wh / 1000.0),
        ),
    ]
}

pub fn derive(
    battery: &Values,
    grid: &Values,
    config: &EmulatorConfig,
) -> Result<Snapshot, EmulatorError> {
    let mut snapshot: Snapshot = TICK_CONSTANTS
        .iter()
        .map(|(path, seed)| (path.to_string(), seed.value()))
        .collect();
    let mut set = |path: String, value: BusValue| {
        snapshot.insert(path, value);
    };

    let frequency = config.grid_frequency;
    let mut total_in = 0.0;
    let mut total_out = 0.0;
    for &phase in &config.phases {
        let ac_in = PhaseReading::from_grid(phase, grid)?;
        // Passthrough: output equals input on every phase.
        let ac_out = ac_in;

        set(format!("/Ac/ActiveIn/{phase}/F"), frequency.into());
        set(format!("/Ac/ActiveIn/{phase}/I"), ac_in.current.into());
        set(format!("/Ac/ActiveIn/{phase}/P"), ac_in.power.into());
        set(format!("/Ac/ActiveIn/{phase}/S"), ac_in.power.into());
        set(format!("/Ac/ActiveIn/{phase}/V"), ac_in.voltage.into());

        set(format!("/Ac/Out/{phase}/F"), frequency.into());
        set(format!("/Ac/Out/{phase}/I"), ac_out.current.into());
        set(
            format!("/Ac/Out/{phase}/NominalInverterPower"),
            config.nominal_inverter_power.into(),
        );
        set(format!("/Ac/Out/{phase}/P"), ac_out.power.into());
        set(format!("/Ac/Out/{phase}/S"), ac_out.power.into());
        set(format!("/Ac/Out/{phase}/V"), ac_out.voltage.into());

        total_in += ac_in.power;
        total_out += ac_out.power;
    }

    set("/Ac/ActiveIn/P".into(), total_in.into());
    set("/Ac/ActiveIn/S".into(), total_in.into());
    set("/Ac/Out/P".into(), total_out.into());
    set("/Ac/Out/S".into(), total_out.into());
    set(
        "/Ac/NumberOfPhases".into(),
        (config.phases.len() as i64).into(),
    );
    set(
        "/Ac/Out/NominalInverterPower".into(),
        config.nominal_inverter_power.into(),
    );

    for (source, target) in BATTERY_PASSTHROUGH {
        set(target.into(), passthrough(battery, source));
    }
    set("/Dc/0/Voltage".into(), dc_voltage(battery)?);

    let mode = battery.get("/Info/ChargeMode").and_then(BusValue::as_str);
    for (path, lit) in charge_mode_leds(mode) {
        set(path.into(), lit.into());
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, BusValue)]) -> Values {
        pairs
            .iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    fn float(snapshot: &Snapshot, path: &str) -> f64 {
        snapshot[path]
            .as_f64()
            .unwrap_or_else(|| panic!("{path} is not numeric"))
    }

    #[test]
    fn test_phase_current_zero_voltage() {
        assert_eq!(phase_current(Phase::L1, 1500.0, 0.0), 0.0);
        assert_eq!(phase_current(Phase::L2, 0.0, 0.0), 0.0);
        assert_eq!(phase_current(Phase::L3, -200.0, -1.0), 0.0);
    }

    #[test]
    fn test_phase_current_rounding() {
        assert_eq!(phase_current(Phase::L1, 1500.0, 230.0), 6.52);
        assert_eq!(phase_current(Phase::L1, -1000.0, 230.0), -4.35);
        assert_eq!(phase_current(Phase::L1, 230.0, 230.0), 1.0);
    }

    #[test]
    fn test_grid_only_scenario() {
        let grid = values(&[
            ("/Ac/L1/Power", BusValue::Float(1500.0)),
            ("/Ac/L1/Voltage", BusValue::Float(230.0)),
        ]);
        let snapshot = derive(&Values::new(), &grid, &EmulatorConfig::default()).unwrap();

        assert_eq!(float(&snapshot, "/Ac/Out/L1/P"), 1500.0);
        assert_eq!(float(&snapshot, "/Ac/Out/L1/I"), 6.52);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/P"), 1500.0);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/L2/P"), 0.0);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/L3/I"), 0.0);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/L1/F"), 50.0);
        assert_eq!(snapshot["/Soc"], BusValue::Null);
        assert_eq!(snapshot["/Dc/0/Voltage"], BusValue::Null);
    }

    #[test]
    fn test_output_mirrors_input_and_totals_sum() {
        let grid = values(&[
            ("/Ac/L1/Power", BusValue::Float(1200.5)),
            ("/Ac/L1/Voltage", BusValue::Float(231.0)),
            ("/Ac/L2/Power", BusValue::Int(-800)),
            ("/Ac/L2/Voltage", BusValue::Float(229.4)),
            ("/Ac/L3/Power", BusValue::Float(15.25)),
            ("/Ac/L3/Voltage", BusValue::Int(0)),
        ]);
        let snapshot = derive(&Values::new(), &grid, &EmulatorConfig::default()).unwrap();

        let mut sum = 0.0;
        for phase in Phase::ALL {
            let in_p = float(&snapshot, &format!("/Ac/ActiveIn/{phase}/P"));
            let in_v = float(&snapshot, &format!("/Ac/ActiveIn/{phase}/V"));
            assert_eq!(float(&snapshot, &format!("/Ac/Out/{phase}/P")), in_p);
            assert_eq!(float(&snapshot, &format!("/Ac/Out/{phase}/V")), in_v);
            assert_eq!(
                float(&snapshot, &format!("/Ac/Out/{phase}/I")),
                float(&snapshot, &format!("/Ac/ActiveIn/{phase}/I"))
            );
            sum += in_p;
        }
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/P"), sum);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/S"), sum);
        assert_eq!(float(&snapshot, "/Ac/Out/P"), sum);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/L3/I"), 0.0);
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/L2/I"), round2(-800.0 / 229.4));
    }

    #[test]
    fn test_only_configured_phases_are_written() {
        let config = EmulatorConfig {
            phases: vec![Phase::L1],
            ..EmulatorConfig::default()
        };
        let grid = values(&[("/Ac/L2/Power", BusValue::Float(300.0))]);
        let snapshot = derive(&Values::new(), &grid, &config).unwrap();

        assert!(snapshot.contains_key("/Ac/Out/L1/P"));
        assert!(!snapshot.contains_key("/Ac/Out/L2/P"));
        assert_eq!(float(&snapshot, "/Ac/ActiveIn/P"), 0.0);
        assert_eq!(snapshot["/Ac/NumberOfPhases"], BusValue::Int(1));
    }

    #[test]
    fn test_charge_mode_leds() {
        let lit = |mode: &str| {
            charge_mode_leds(Some(mode))
                .iter()
                .filter(|(_, on)| *on == 1)
                .map(|(path, _)| *path)
                .collect::<Vec<_>>()
        };
        assert_eq!(lit("Absorption phase 2"), vec!["/Leds/Absorption"]);
        assert_eq!(lit("Bulk"), vec!["/Leds/Bulk"]);
        assert_eq!(lit("Float"), vec!["/Leds/Float"]);
        assert!(lit("Unknown").is_empty());
        assert!(charge_mode_leds(None).iter().all(|(_, on)| *on == 0));
    }

    #[test]
    fn test_battery_passthrough() {
        let battery = values(&[
            ("/Dc/0/Current", BusValue::Float(-10.0)),
            ("/Dc/0/Power", BusValue::Float(-520.0)),
            ("/Soc", BusValue::Float(64.5)),
            ("/Info/MaxChargeCurrent", BusValue::Int(50)),
            ("/Info/ChargeMode", BusValue::Text("Bulk".to_string())),
        ]);
        let snapshot = derive(&battery, &Values::new(), &EmulatorConfig::default()).unwrap();

        assert_eq!(snapshot["/Soc"], BusValue::Float(64.5));
        assert_eq!(snapshot["/Dc/0/MaxChargeCurrent"], BusValue::Int(50));
        assert_eq!(
            snapshot["/BatteryOperationalLimits/MaxChargeCurrent"],
            BusValue::Int(50)
        );
        assert_eq!(
            snapshot["/BatteryOperationalLimits/MaxChargeVoltage"],
            BusValue::Null
        );
        assert_eq!(snapshot["/Dc/0/Voltage"], BusValue::Float(52.0));
        assert_eq!(snapshot["/Leds/Bulk"], BusValue::Int(1));
        assert_eq!(snapshot["/Leds/Float"], BusValue::Int(0));
    }

    #[test]
    fn test_dc_voltage_fallbacks() {
        let reported = values(&[
            ("/Dc/0/Voltage", BusValue::Float(53.1)),
            ("/Dc/0/Power", BusValue::Float(100.0)),
            ("/Dc/0/Current", BusValue::Float(1.0)),
        ]);
        assert_eq!(dc_voltage(&reported).unwrap(), BusValue::Float(53.1));

        let zero_current = values(&[
            ("/Dc/0/Power", BusValue::Float(0.0)),
            ("/Dc/0/Current", BusValue::Float(0.0)),
        ]);
        assert_eq!(dc_voltage(&zero_current).unwrap(), BusValue::Null);

        let power_only = values(&[("/Dc/0/Power", BusValue::Float(10.0))]);
        assert_eq!(dc_voltage(&power_only).unwrap(), BusValue::Null);
    }

    #[test]
    fn test_tick_constants_present() {
        let snapshot = derive(&Values::new(), &Values::new(), &EmulatorConfig::default()).unwrap();
        for (path, seed) in TICK_CONSTANTS {
            assert_eq!(snapshot[*path], seed.value(), "{path}");
        }
        assert_eq!(snapshot["/State"], BusValue::Int(8));
        assert_eq!(snapshot["/Ac/Out/NominalInverterPower"], BusValue::Int(4500));
    }

    #[test]
    fn test_every_derived_path_is_in_schema() {
        let snapshot = derive(&Values::new(), &Values::new(), &EmulatorConfig::default()).unwrap();
        for path in snapshot.keys() {
            assert!(schema::lookup(path).is_some(), "{path} is not in the schema");
        }
    }

    #[test]
    fn test_non_numeric_grid_value_fails_the_tick() {
        let grid = values(&[("/Ac/L1/Power", BusValue::Text("n/a".to_string()))]);
        let result = derive(&Values::new(), &grid, &EmulatorConfig::default());
        assert!(matches!(
            result,
            Err(EmulatorError::NotNumeric { ref path, .. }) if path == "/Ac/L1/Power"
        ));
    }

    #[test]
    fn test_energy_fields_in_kwh() {
        let fields = energy_fields(EnergyTotals {
            charging_wh: 1500.0,
            discharging_wh: 250.0,
        });
        assert_eq!(fields[0], (schema::ENERGY_OUT_TO_INVERTER, BusValue::Float(1.5)));
        assert_eq!(
            fields[1],
            (schema::ENERGY_INVERTER_TO_AC_OUT, BusValue::Float(0.25))
        );
    }
}
