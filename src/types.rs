use std::fmt;

/// Minimum gap the device accepts between heat and cool setpoints.
pub const DEADBAND_F: i32 = 3;

/// Temperature stored as Celsius internally.
/// Handles device rounding: F to whole degrees, C to 0.5 increments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    /// Construct from paired F+C values as sent by the thermostat.
    /// Prefers the C value (avoids rounding loss).
    pub fn from_pair(_f: f64, c: f64) -> Self {
        Self(c)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }

    /// Round to device C precision (0.5 increments).
    pub fn to_device_celsius(&self) -> f64 {
        (self.0 * 2.0).round() / 2.0
    }

    /// Round to device F precision (whole degrees).
    pub fn to_device_fahrenheit(&self) -> i32 {
        self.fahrenheit().round() as i32
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Which member of a setpoint pair the caller just moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointSide {
    Heat,
    Cool,
}

/// A heat/cool setpoint pair in whole degrees Fahrenheit, the unit the
/// schedule-period payloads carry. Celsius only appears at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointPair {
    pub heat: i32,
    pub cool: i32,
}

impl SetpointPair {
    pub fn new(heat: i32, cool: i32) -> Self {
        Self { heat, cool }
    }

    pub fn from_celsius(heat_c: f64, cool_c: f64) -> Self {
        Self {
            heat: Temperature::from_celsius(heat_c).to_device_fahrenheit(),
            cool: Temperature::from_celsius(cool_c).to_device_fahrenheit(),
        }
    }

    /// Device-precision Celsius companion for the heat member.
    pub fn heat_celsius(&self) -> f64 {
        Temperature::from_fahrenheit(self.heat as f64).to_device_celsius()
    }

    /// Device-precision Celsius companion for the cool member.
    pub fn cool_celsius(&self) -> f64 {
        Temperature::from_fahrenheit(self.cool as f64).to_device_celsius()
    }

    pub fn satisfies_deadband(&self) -> bool {
        self.cool - self.heat >= DEADBAND_F
    }

    /// Enforce the deadband, honoring the member the caller just moved and
    /// pushing the other member out of its way.
    pub fn enforced(self, moved: SetpointSide) -> Self {
        if self.satisfies_deadband() {
            return self;
        }
        match moved {
            SetpointSide::Heat => Self {
                heat: self.heat,
                cool: self.heat + DEADBAND_F,
            },
            SetpointSide::Cool => Self {
                heat: self.cool - DEADBAND_F,
                cool: self.cool,
            },
        }
    }

    /// Infer which member moved relative to `reference`. Returns None when
    /// both moved or neither did.
    pub fn moved_side_against(&self, reference: &SetpointPair) -> Option<SetpointSide> {
        match (self.heat != reference.heat, self.cool != reference.cool) {
            (true, false) => Some(SetpointSide::Heat),
            (false, true) => Some(SetpointSide::Cool),
            _ => None,
        }
    }
}

/// Setpoint fields present in one telemetry message. Either member may be
/// absent; absent fields keep their previously cached value on merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedSetpoints {
    pub heat: Option<i32>,
    pub cool: Option<i32>,
}

impl ObservedSetpoints {
    pub fn is_empty(&self) -> bool {
        self.heat.is_none() && self.cool.is_none()
    }

    /// True when every field present in the observation equals `pair`.
    pub fn matches(&self, pair: &SetpointPair) -> bool {
        !self.is_empty()
            && self.heat.is_none_or(|h| h == pair.heat)
            && self.cool.is_none_or(|c| c == pair.cool)
    }

    /// Field-by-field merge of a newer observation into this one.
    pub fn merge(&mut self, other: &ObservedSetpoints) {
        if other.heat.is_some() {
            self.heat = other.heat;
        }
        if other.cool.is_some() {
            self.cool = other.cool;
        }
    }

    pub fn complete_pair(&self) -> Option<SetpointPair> {
        Some(SetpointPair::new(self.heat?, self.cool?))
    }
}

impl From<SetpointPair> for ObservedSetpoints {
    fn from(pair: SetpointPair) -> Self {
        Self {
            heat: Some(pair.heat),
            cool: Some(pair.cool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    EmergencyHeat,
}

impl HvacMode {
    pub fn as_device_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat and cool",
            HvacMode::EmergencyHeat => "emergency heat",
        }
    }

    pub fn from_device_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(HvacMode::Off),
            "heat" => Some(HvacMode::Heat),
            "cool" => Some(HvacMode::Cool),
            "heat and cool" => Some(HvacMode::HeatCool),
            "emergency heat" => Some(HvacMode::EmergencyHeat),
            _ => None,
        }
    }
}

/// Snapshot pushed to the external observer after each telemetry dispatch.
#[derive(Debug, Clone, Default)]
pub struct ZoneStatus {
    pub zone_id: u8,
    pub temperature: Option<Temperature>,
    pub humidity: Option<f64>,
    pub heat_setpoint: Option<Temperature>,
    pub cool_setpoint: Option<Temperature>,
    pub mode: Option<HvacMode>,
    pub hold_active: bool,
}
