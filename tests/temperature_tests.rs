use s30_sync::{SetpointPair, SetpointSide, Temperature};

#[test]
fn from_celsius() {
    let t = Temperature::from_celsius(22.0);
    assert_eq!(t.celsius(), 22.0);
    assert!((t.fahrenheit() - 71.6).abs() < 0.01);
}

#[test]
fn from_fahrenheit() {
    let t = Temperature::from_fahrenheit(72.0);
    assert!((t.celsius() - 22.222).abs() < 0.01);
    assert!((t.fahrenheit() - 72.0).abs() < 0.01);
}

#[test]
fn from_pair_prefers_celsius() {
    let t = Temperature::from_pair(72.0, 22.0);
    assert_eq!(t.celsius(), 22.0);
}

#[test]
fn device_rounding_celsius() {
    let t = Temperature::from_celsius(22.3);
    assert_eq!(t.to_device_celsius(), 22.5);
    let t = Temperature::from_celsius(22.1);
    assert_eq!(t.to_device_celsius(), 22.0);
    let t = Temperature::from_celsius(22.25);
    assert_eq!(t.to_device_celsius(), 22.5);
}

#[test]
fn device_rounding_fahrenheit() {
    let t = Temperature::from_fahrenheit(72.4);
    assert_eq!(t.to_device_fahrenheit(), 72);
    let t = Temperature::from_fahrenheit(72.6);
    assert_eq!(t.to_device_fahrenheit(), 73);
}

#[test]
fn display() {
    let t = Temperature::from_celsius(22.5);
    assert_eq!(format!("{t}"), "22.5\u{00b0}C");
}

#[test]
fn hvac_mode_roundtrip() {
    use s30_sync::HvacMode;
    for mode in [
        HvacMode::Off,
        HvacMode::Heat,
        HvacMode::Cool,
        HvacMode::HeatCool,
        HvacMode::EmergencyHeat,
    ] {
        let s = mode.as_device_str();
        assert_eq!(HvacMode::from_device_str(s), Some(mode));
    }
}

#[test]
fn deadband_holds_for_any_enforced_pair() {
    for heat in 55..85 {
        for cool in 55..85 {
            let candidate = SetpointPair::new(heat, cool);
            let from_heat = candidate.enforced(SetpointSide::Heat);
            let from_cool = candidate.enforced(SetpointSide::Cool);
            assert!(from_heat.satisfies_deadband(), "{candidate:?} via heat");
            assert!(from_cool.satisfies_deadband(), "{candidate:?} via cool");
            // The side the caller moved is never overridden.
            assert_eq!(from_heat.heat, heat);
            assert_eq!(from_cool.cool, cool);
            // Compliant pairs pass through untouched.
            if candidate.satisfies_deadband() {
                assert_eq!(from_heat, candidate);
                assert_eq!(from_cool, candidate);
            }
        }
    }
}
