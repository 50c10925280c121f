use serde_json::{Value, json};
use uuid::Uuid;

use crate::types::SetpointPair;

/// Sender id the device uses for its own telemetry.
pub const TARGET_DEVICE: &str = "LCC";

pub const ZONES_PATH: &str = "/zones";
pub const SCHEDULES_PATH: &str = "/schedules";

/// Resource paths the pump subscribes to at connect time.
pub const SUBSCRIBE_PATHS: &[&str] = &[ZONES_PATH, SCHEDULES_PATH, "/system"];

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Command envelope. `path_hint` routes the payload on the device side.
pub fn command_message(app_id: &str, path_hint: &str, data: Value) -> Value {
    json!({
        "MessageType": "Command",
        "SenderID": app_id,
        "MessageID": new_message_id(),
        "TargetID": TARGET_DEVICE,
        "Data": data,
        "AdditionalParameters": {
            "JSONPath": path_hint
        }
    })
}

/// RequestData envelope. The `1;` prefix is the since-marker: emit current
/// state for everything newer than sequence 1, i.e. everything.
pub fn request_data_message(app_id: &str, paths: &[&str]) -> Value {
    json!({
        "MessageType": "RequestData",
        "SenderID": app_id,
        "MessageID": new_message_id(),
        "TargetID": TARGET_DEVICE,
        "AdditionalParameters": {
            "JSONPath": format!("1;{}", paths.join(";"))
        }
    })
}

/// Replace one period's setpoint fields within one schedule.
pub fn period_write_data(schedule_id: u32, period_id: u32, pair: &SetpointPair) -> Value {
    json!({
        "schedules": [{
            "schedule": {
                "periods": [{
                    "id": period_id,
                    "period": {
                        "hsp": pair.heat,
                        "hspC": pair.heat_celsius(),
                        "csp": pair.cool,
                        "cspC": pair.cool_celsius()
                    }
                }]
            },
            "id": schedule_id
        }]
    })
}

/// Hold-arm variant 1: zone-configuration hold toggle.
pub fn hold_config_data(zone_id: u8, schedule_id: u32) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "config": {
                "scheduleHold": {
                    "scheduleId": schedule_id,
                    "exceptionType": "hold",
                    "enabled": true,
                    "expiresOn": "0",
                    "expirationMode": "nextPeriod"
                }
            }
        }]
    })
}

/// Hold-arm variant 2: zone-command directive carrying the setpoints again.
pub fn hold_command_data(zone_id: u8, schedule_id: u32, pair: &SetpointPair) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "command": {
                "hold": {
                    "scheduleId": schedule_id,
                    "expirationMode": "nextPeriod",
                    "hsp": pair.heat,
                    "hspC": pair.heat_celsius(),
                    "csp": pair.cool,
                    "cspC": pair.cool_celsius()
                }
            }
        }]
    })
}

/// Hold-arm variant 3: zone-status hold directive.
pub fn hold_status_data(zone_id: u8, schedule_id: u32) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "status": {
                "scheduleHold": {
                    "scheduleId": schedule_id,
                    "enabled": true,
                    "expirationMode": "nextPeriod"
                }
            }
        }]
    })
}

/// Reduce a retrieve body to the Data payloads of device-originated messages.
/// Our own published commands echo back through the bus with our SenderID and
/// are dropped here.
pub fn parse_retrieve_response(body: &str) -> Vec<Value> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return vec![],
    };
    let messages = match parsed.get("messages") {
        Some(Value::Array(msgs)) => msgs,
        _ => return vec![],
    };
    messages
        .iter()
        .filter_map(|msg| {
            let sender = msg.get("SenderID").or_else(|| msg.get("SenderId"));
            match sender.and_then(|v| v.as_str()) {
                Some(TARGET_DEVICE) => msg.get("Data").cloned(),
                _ => None,
            }
        })
        .collect()
}
